#![no_main]

use std::cell::RefCell;
use std::rc::Rc;

use libfuzzer_sys::fuzz_target;
use token_transform::{
    Chunk, ConfigurationError, Continuation, PipelineConfig, PipelineFactory, PipelineKind,
    PipelineOptions, PipelineStages, Rank, Runtime, Token, TransformKind, TransformOutcome,
    transform_fn,
};

const MAX_HOLES: usize = 16;

struct Holes(Rc<RefCell<Vec<Continuation>>>);

impl PipelineFactory for Holes {
    fn build(
        &self,
        kind: PipelineKind,
        _options: &PipelineOptions,
    ) -> Result<PipelineStages, ConfigurationError> {
        let mut stages = PipelineStages::empty(kind);
        let store = Rc::clone(&self.0);
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

// Byte layout: first byte picks the number of holes, the rest drive chunk
// cuts and the resolution order.
fuzz_target!(|data: &[u8]| {
    let Some((&first, rest)) = data.split_first() else {
        return;
    };
    let holes = first as usize % (MAX_HOLES + 1);
    let mut input = Vec::new();
    let mut expected = Vec::new();
    for i in 0..holes {
        input.push(Token::comment(format!("t{i}")));
        input.push(Token::self_closing("hole"));
        expected.push(Token::comment(format!("t{i}")));
        expected.push(Token::comment(format!("r{i}")));
    }
    input.push(Token::EndOfInput);
    expected.push(Token::EndOfInput);

    let store = Rc::new(RefCell::new(Vec::new()));
    let mut runtime = Runtime::new(PipelineConfig::default(), Rc::new(Holes(Rc::clone(&store))));
    runtime.start_document(None).unwrap();

    let mut bytes = rest.iter().copied();
    let mut remaining = input.as_slice();
    while !remaining.is_empty() {
        let size = (bytes.next().unwrap_or(u8::MAX) as usize % 4 + 1).min(remaining.len());
        let (head, tail) = remaining.split_at(size);
        runtime.feed(Chunk::new(head.to_vec())).unwrap();
        runtime.run_until_idle().unwrap();
        remaining = tail;
    }
    runtime.end_input().unwrap();
    runtime.run_until_idle().unwrap();

    let conts = store.borrow().clone();
    assert_eq!(conts.len(), holes);
    let mut order: Vec<usize> = (0..holes).collect();
    for i in (1..order.len()).rev() {
        let j = bytes.next().unwrap_or(0) as usize % (i + 1);
        order.swap(i, j);
    }
    for index in order {
        let chunk = Chunk::ranked(vec![Token::comment(format!("r{index}"))], Rank::PHASE2_END);
        runtime.resolve(conts[index], chunk);
        runtime.run_until_idle().unwrap();
    }

    assert!(runtime.is_finished());
    let output: Vec<Token> = runtime
        .take_output()
        .into_iter()
        .flat_map(|chunk| chunk.tokens)
        .collect();
    assert_eq!(output, expected);
});
