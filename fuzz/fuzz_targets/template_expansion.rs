#![no_main]

use std::collections::HashMap;
use std::rc::Rc;

use libfuzzer_sys::fuzz_target;
use token_transform::{
    DefaultRecipe, KeyValue, PipelineConfig, Runtime, Token, template_arg_token, template_token,
};

const TITLES: [&str; 4] = ["a", "b", "c", "d"];

fn token_for(byte: u8) -> Token {
    let title = TITLES[(byte >> 4) as usize % TITLES.len()];
    match byte % 6 {
        0 => Token::text("x"),
        1 => template_token(title, Vec::new()),
        2 => template_token(
            title,
            vec![KeyValue::new(Vec::new(), vec![template_token(title, Vec::new())])],
        ),
        3 => template_arg_token("1", Some(vec![Token::text("d")])),
        4 => Token::open("span").with_attrs(vec![KeyValue::new(
            vec![Token::text("title")],
            vec![template_token(title, Vec::new())],
        )]),
        _ => Token::close("span"),
    }
}

// Templates call each other freely, including themselves. Every run must end
// with exactly one end-of-input token, whatever loops or depth limits it hits.
fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let (bodies, stream) = data.split_at(data.len().min(16));
    let mut templates: HashMap<String, Vec<Token>> = HashMap::new();
    for (i, title) in TITLES.iter().enumerate() {
        let body = bodies
            .iter()
            .skip(i)
            .step_by(TITLES.len())
            .map(|&byte| token_for(byte))
            .collect();
        templates.insert(title.to_string(), body);
    }

    let mut input: Vec<Token> = stream.iter().take(64).map(|&byte| token_for(byte)).collect();
    input.push(Token::EndOfInput);

    let config = PipelineConfig {
        max_depth: 6,
        ..PipelineConfig::default()
    };
    let mut runtime = Runtime::new(config, Rc::new(DefaultRecipe::new(Rc::new(templates))));
    let output = runtime.convert(input).unwrap();
    assert!(runtime.is_finished());
    assert_eq!(output.iter().filter(|token| token.is_eof()).count(), 1);
    assert_eq!(output.last(), Some(&Token::EndOfInput));
    assert_eq!(runtime.live_pipelines(), 0);
});
