use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use token_transform::{
    Chunk, ConfigurationError, Continuation, DefaultRecipe, Diagnostic, ExpansionError, KeyValue,
    PipelineConfig, PipelineError, PipelineFactory, PipelineKind, PipelineOptions, PipelineStages,
    Runtime, TemplateSource, Token, TransformError, TransformKind, TransformOutcome, format_tokens,
    template_token, transform_fn,
};
use transform_test_support::coalesce_text;

type Store = Rc<RefCell<Vec<Continuation>>>;

/// Default wiring plus a `hole` tag whose content is supplied from outside.
struct WithHoles {
    recipe: DefaultRecipe,
    store: Store,
}

impl PipelineFactory for WithHoles {
    fn build(
        &self,
        kind: PipelineKind,
        options: &PipelineOptions,
    ) -> Result<PipelineStages, ConfigurationError> {
        let mut stages = self.recipe.build(kind, options)?;
        let store = Rc::clone(&self.store);
        stages.async2.register_transform(
            transform_fn(move |_, cx| {
                let continuation = cx.defer();
                store.borrow_mut().push(continuation);
                Ok(TransformOutcome::Deferred {
                    tokens: Vec::new(),
                    continuation,
                })
            }),
            "hole",
            1.5,
            TransformKind::Tag,
            Some("hole"),
        )?;
        Ok(stages)
    }
}

fn templates(entries: &[(&str, Vec<Token>)]) -> Rc<dyn TemplateSource> {
    let map: HashMap<String, Vec<Token>> = entries
        .iter()
        .map(|(title, body)| (title.to_string(), body.clone()))
        .collect();
    Rc::new(map)
}

fn output_tokens(runtime: &mut Runtime) -> Vec<Token> {
    let tokens = runtime
        .take_output()
        .into_iter()
        .flat_map(|chunk| chunk.tokens)
        .collect();
    coalesce_text(tokens)
}

#[test]
fn templated_attribute_end_to_end() {
    let source = templates(&[("ref", vec![Token::text("url")])]);
    let mut runtime = Runtime::new(PipelineConfig::default(), Rc::new(DefaultRecipe::new(source)));
    let href = KeyValue::new(vec![Token::text("href")], vec![template_token("ref", Vec::new())]);
    let input = vec![
        Token::open("a").with_attrs(vec![href]),
        Token::text("hi"),
        Token::close("a"),
        Token::EndOfInput,
    ];
    let output = runtime.convert(input).unwrap();
    assert_eq!(
        format_tokens(&output),
        vec![
            "START name=a attrs=[\"href\"=\"url\"]",
            "TEXT \"hi\"",
            "END name=a",
            "EOF",
        ]
    );
    assert!(runtime.is_finished());
    assert_eq!(runtime.counters().expansions, 1);
    assert!(runtime.diagnostics().is_empty());
    assert_eq!(runtime.live_pipelines(), 0);
}

#[test]
fn mixed_case_tag_names_still_expand() {
    let source = templates(&[("A", vec![Token::text("body")])]);
    let mut runtime = Runtime::new(PipelineConfig::default(), Rc::new(DefaultRecipe::new(source)));
    let mut call = template_token("A", Vec::new());
    if let Some(tag) = call.tag_mut() {
        tag.name = "Template".to_string();
    }
    let output = runtime.convert(vec![call, Token::EndOfInput]).unwrap();
    assert_eq!(format_tokens(&output), vec!["TEXT \"body\"", "EOF"]);
    assert!(runtime.diagnostics().is_empty());
}

#[test]
fn root_title_takes_part_in_loop_detection() {
    let source = templates(&[("Main", vec![Token::text("a"), Token::text("b")])]);
    let mut runtime = Runtime::new(PipelineConfig::default(), Rc::new(DefaultRecipe::new(source)));
    runtime.start_document(Some("Main")).unwrap();
    runtime
        .feed(Chunk::new(vec![template_token("Main", Vec::new()), Token::EndOfInput]))
        .unwrap();
    runtime.end_input().unwrap();
    runtime.run_until_idle().unwrap();
    assert_eq!(
        runtime.diagnostics(),
        &[Diagnostic::Expansion(ExpansionError::LoopDetected {
            title: "Main".to_string()
        })]
    );
    let output = output_tokens(&mut runtime);
    assert_eq!(output[1], Token::text("Expansion loop detected at Main"));
}

#[test]
fn calls_before_start_are_rejected() {
    let mut runtime =
        Runtime::new(PipelineConfig::default(), Rc::new(token_transform::PassThrough));
    assert_eq!(runtime.feed(Chunk::default()), Err(PipelineError::NotStarted));
    assert_eq!(runtime.end_input(), Err(PipelineError::NotStarted));
}

#[test]
fn handler_error_stops_the_document() {
    struct Failing;
    impl PipelineFactory for Failing {
        fn build(
            &self,
            kind: PipelineKind,
            _options: &PipelineOptions,
        ) -> Result<PipelineStages, ConfigurationError> {
            let mut stages = PipelineStages::empty(kind);
            stages.async2.register_transform(
                transform_fn(|_, _| Err(TransformError::new("Failing", "comment rejected"))),
                "Failing",
                1.5,
                TransformKind::Comment,
                None,
            )?;
            Ok(stages)
        }
    }

    let mut runtime = Runtime::new(PipelineConfig::default(), Rc::new(Failing));
    runtime.start_document(None).unwrap();
    runtime
        .feed(Chunk::new(vec![Token::text("before"), Token::comment("x"), Token::EndOfInput]))
        .unwrap();
    let err = runtime.run_until_idle().unwrap_err();
    assert_eq!(
        err,
        PipelineError::Transform(TransformError::new("Failing", "comment rejected"))
    );
    assert_eq!(runtime.failure(), Some(&err));
    assert!(!runtime.is_finished());
    assert_eq!(runtime.live_pipelines(), 0);

    runtime.end_input().unwrap();
    assert_eq!(runtime.run_until_idle(), Err(PipelineError::Poisoned));

    // A fresh document clears the failure.
    runtime.start_document(None).unwrap();
    runtime.feed(Chunk::new(vec![Token::text("ok"), Token::EndOfInput])).unwrap();
    runtime.end_input().unwrap();
    runtime.run_until_idle().unwrap();
    assert_eq!(output_tokens(&mut runtime), vec![Token::text("ok"), Token::EndOfInput]);
}

#[test]
fn external_resolutions_in_reverse_order() {
    let store = Store::default();
    let factory = WithHoles {
        recipe: DefaultRecipe::new(templates(&[])),
        store: Rc::clone(&store),
    };
    let mut runtime = Runtime::new(PipelineConfig::default(), Rc::new(factory));
    runtime.start_document(None).unwrap();
    runtime
        .feed(Chunk::new(vec![
            Token::comment("a"),
            Token::self_closing("hole"),
            Token::comment("b"),
            Token::self_closing("hole"),
            Token::comment("c"),
            Token::EndOfInput,
        ]))
        .unwrap();
    runtime.end_input().unwrap();
    runtime.run_until_idle().unwrap();
    assert_eq!(runtime.pending_continuations(), 2);
    assert!(!runtime.is_finished());

    let conts = store.borrow().clone();
    runtime.resolve(
        conts[1],
        Chunk::ranked(vec![Token::comment("Y")], token_transform::Rank::PHASE2_END),
    );
    runtime.run_until_idle().unwrap();
    assert_eq!(output_tokens(&mut runtime), vec![Token::comment("a")]);

    runtime.resolve(
        conts[0],
        Chunk::ranked(vec![Token::comment("X")], token_transform::Rank::PHASE2_END),
    );
    runtime.run_until_idle().unwrap();
    assert_eq!(
        output_tokens(&mut runtime),
        vec![
            Token::comment("X"),
            Token::comment("b"),
            Token::comment("Y"),
            Token::comment("c"),
            Token::EndOfInput,
        ]
    );
    assert!(runtime.is_finished());
}

#[test]
fn unranked_resolution_passes_every_transform() {
    let store = Store::default();
    let source = templates(&[("t", vec![Token::text("a"), Token::text("b")])]);
    let factory = WithHoles {
        recipe: DefaultRecipe::new(source),
        store: Rc::clone(&store),
    };
    let mut runtime = Runtime::new(PipelineConfig::default(), Rc::new(factory));
    runtime.start_document(None).unwrap();
    runtime
        .feed(Chunk::new(vec![Token::self_closing("hole"), Token::EndOfInput]))
        .unwrap();
    runtime.end_input().unwrap();
    runtime.run_until_idle().unwrap();

    let continuation = store.borrow()[0];
    runtime.resolve(continuation, Chunk::new(vec![template_token("t", Vec::new())]));
    runtime.run_until_idle().unwrap();
    assert_eq!(
        output_tokens(&mut runtime),
        vec![Token::text("ab"), Token::EndOfInput]
    );
    assert_eq!(runtime.counters().restarts, 1);
    assert!(runtime.is_finished());
}
