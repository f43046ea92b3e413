use std::collections::HashMap;
use std::rc::Rc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use token_transform::{
    DefaultRecipe, KeyValue, PassThrough, PipelineConfig, Runtime, TemplateSource, Token,
    template_arg_token, template_token,
};

const SMALL_BLOCKS: usize = 64;
const LARGE_BLOCKS: usize = 10_000;

/// `<p class=box>text {{greet|n}}</p>` per block, template calls optional.
fn make_blocks(blocks: usize, with_templates: bool) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(blocks * 5 + 1);
    for i in 0..blocks {
        tokens.push(Token::open("p").with_attrs(vec![KeyValue::literal("class", "box")]));
        tokens.push(Token::text("text "));
        if with_templates {
            tokens.push(template_token(
                "greet",
                vec![KeyValue::new(Vec::new(), vec![Token::Text(i.to_string())])],
            ));
        }
        tokens.push(Token::close("p"));
        tokens.push(Token::newline());
    }
    tokens.push(Token::EndOfInput);
    tokens
}

fn greet_source() -> Rc<dyn TemplateSource> {
    let mut map = HashMap::new();
    map.insert(
        "greet".to_string(),
        vec![Token::text("hello "), template_arg_token("1", None)],
    );
    Rc::new(map)
}

fn bench_pass_through_large(c: &mut Criterion) {
    let input = make_blocks(LARGE_BLOCKS, false);
    c.bench_function("bench_pass_through_large", |b| {
        b.iter_batched(
            || input.clone(),
            |tokens| {
                let mut runtime = Runtime::new(PipelineConfig::default(), Rc::new(PassThrough));
                let out = runtime.convert(black_box(tokens)).unwrap();
                black_box(out.len());
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_default_recipe_plain(c: &mut Criterion) {
    let input = make_blocks(LARGE_BLOCKS, false);
    let source = greet_source();
    c.bench_function("bench_default_recipe_plain", |b| {
        b.iter_batched(
            || input.clone(),
            |tokens| {
                let recipe = DefaultRecipe::new(Rc::clone(&source));
                let mut runtime = Runtime::new(PipelineConfig::default(), Rc::new(recipe));
                let out = runtime.convert(black_box(tokens)).unwrap();
                black_box(out.len());
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_template_expansion(c: &mut Criterion) {
    let small = make_blocks(SMALL_BLOCKS, true);
    let large = make_blocks(LARGE_BLOCKS / 10, true);
    let source = greet_source();
    for (name, input) in [("bench_templates_small", small), ("bench_templates_large", large)] {
        c.bench_function(name, |b| {
            b.iter_batched(
                || input.clone(),
                |tokens| {
                    let recipe = DefaultRecipe::new(Rc::clone(&source));
                    let mut runtime = Runtime::new(PipelineConfig::default(), Rc::new(recipe));
                    let out = runtime.convert(black_box(tokens)).unwrap();
                    black_box(out.len());
                },
                BatchSize::LargeInput,
            );
        });
    }
}

criterion_group!(
    benches,
    bench_pass_through_large,
    bench_default_recipe_plain,
    bench_template_expansion
);
criterion_main!(benches);
