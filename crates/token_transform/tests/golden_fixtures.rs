use std::env;
use std::path::PathBuf;
use std::rc::Rc;

use token_transform::{Chunk, DefaultRecipe, PipelineError, Runtime, TemplateSource, Token};
use transform_test_support::fixture::{FixtureCase, fixture_files, load_fixture};
use transform_test_support::plans::ResolutionPlan;
use transform_test_support::{assert_token_lines, coalesce_text};

struct Outcome {
    tokens: Vec<Token>,
    diagnostics: usize,
    error: Option<PipelineError>,
}

#[test]
fn golden_fixtures_whole_input() {
    let mut ran = 0usize;
    for_each_case(|label, case, source| {
        ran += 1;
        let input = case.input_tokens().unwrap_or_else(|err| panic!("{label}: {err}"));
        let outcome = run(case, source, vec![input]);
        enforce_expected(label, case, outcome);
    });
    assert!(ran > 0, "no fixtures matched filter");
}

#[test]
fn golden_fixtures_chunked_input() {
    let runs = env_u64("WT2HTML_FIXTURE_CHUNK_RUNS", 4);
    let seed = env_u64("WT2HTML_FIXTURE_CHUNK_SEED", 0xC0FFEE);
    for_each_case(|label, case, source| {
        let input = case.input_tokens().unwrap_or_else(|err| panic!("{label}: {err}"));
        for run_idx in 0..runs {
            let plan = ResolutionPlan::random(input.len(), 0, seed.wrapping_add(run_idx));
            let mut chunks = Vec::new();
            let mut rest = input.as_slice();
            for &size in &plan.chunk_sizes {
                let (head, tail) = rest.split_at(size.min(rest.len()));
                chunks.push(head.to_vec());
                rest = tail;
            }
            let outcome = run(case, source, chunks);
            enforce_expected(&format!("{label} [{}]", plan.summary), case, outcome);
        }
    });
}

fn for_each_case(mut f: impl FnMut(&str, &FixtureCase, &Rc<dyn TemplateSource>)) {
    let filter = env::var("WT2HTML_FIXTURE").ok();
    let files = fixture_files(&fixture_dir());
    assert!(!files.is_empty(), "no fixture files in {:?}", fixture_dir());
    for path in files {
        let fixture = load_fixture(&path);
        let templates = fixture
            .templates()
            .unwrap_or_else(|err| panic!("{path:?}: {err}"));
        let source: Rc<dyn TemplateSource> = Rc::new(templates);
        for case in &fixture.cases {
            if filter.as_deref().is_some_and(|f| !case.name.contains(f)) {
                continue;
            }
            let label = format!("{}::{}", path.file_name().unwrap().to_string_lossy(), case.name);
            f(&label, case, &source);
        }
    }
}

fn run(case: &FixtureCase, source: &Rc<dyn TemplateSource>, chunks: Vec<Vec<Token>>) -> Outcome {
    let mut runtime = Runtime::new(case.config(), Rc::new(DefaultRecipe::new(Rc::clone(source))));
    runtime.start_document(None).unwrap();
    let mut error = None;
    for chunk in chunks {
        runtime.feed(Chunk::new(chunk)).unwrap();
        if let Err(err) = runtime.run_until_idle() {
            error = Some(err);
            break;
        }
    }
    if error.is_none() {
        runtime.end_input().unwrap();
        error = runtime.run_until_idle().err();
    }
    if error.is_none() {
        assert!(runtime.is_finished(), "document did not finish");
        assert_eq!(runtime.live_pipelines(), 0, "pipelines left behind");
    }
    let tokens = runtime
        .take_output()
        .into_iter()
        .flat_map(|chunk| chunk.tokens)
        .collect();
    Outcome {
        tokens: coalesce_text(tokens),
        diagnostics: runtime.diagnostics().len(),
        error,
    }
}

fn enforce_expected(label: &str, case: &FixtureCase, outcome: Outcome) {
    match (&case.error, outcome.error) {
        (Some(expected), Some(err)) => {
            assert!(
                err.to_string().starts_with(expected.as_str()),
                "{label}: expected error '{expected}', got '{err}'"
            );
            return;
        }
        (Some(expected), None) => {
            panic!("{label}: expected error '{expected}' but the run succeeded")
        }
        (None, Some(err)) => panic!("{label}: unexpected error: {err}"),
        (None, None) => {}
    }
    assert_token_lines(label, &case.expected, &outcome.tokens);
    if let Some(expected) = case.diagnostics {
        assert_eq!(outcome.diagnostics, expected, "{label}: diagnostic count");
    }
}

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}
