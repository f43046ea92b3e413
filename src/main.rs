//! Runs a token stream through the transform pipeline and prints the result.
//!
//! Usage:
//!   wt2html --input page.json [--config pipeline.toml] [--max-depth N] [--strict] [--json] [-v]
//!
//! The input file holds
//! `{ "title": ..., "templates": { name: [token...] }, "tokens": [token...] }`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use log::{LevelFilter, Log, Metadata, Record};
use mimalloc::MiMalloc;
use serde::Deserialize;
use token_transform::{
    Chunk, DefaultRecipe, IntegrityMode, PipelineConfig, Runtime, TemplateSource, Token,
    format_token,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "wt2html", version, about = "Expand templates in a wikitext token stream")]
struct Cli {
    /// JSON document with templates and input tokens
    #[arg(short, long)]
    input: PathBuf,

    /// TOML pipeline configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the maximum expansion depth
    #[arg(long)]
    max_depth: Option<usize>,

    /// Fail on stream integrity errors instead of repairing them
    #[arg(long)]
    strict: bool,

    /// Leave template calls unexpanded
    #[arg(long)]
    no_templates: bool,

    /// Print output chunks as JSON instead of one token per line
    #[arg(long)]
    json: bool,

    /// Log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InputDocument {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    templates: BTreeMap<String, Vec<Token>>,
    tokens: Vec<Token>,
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig, String> {
    let mut config = match &cli.config {
        Some(path) => {
            let content = read(path)?;
            toml::from_str(&content)
                .map_err(|err| format!("failed to parse config {path:?}: {err}"))?
        }
        None => PipelineConfig::default(),
    };
    if let Some(max_depth) = cli.max_depth {
        config.max_depth = max_depth;
    }
    if cli.strict {
        config.integrity = IntegrityMode::Strict;
    }
    if cli.no_templates {
        config.expand_templates = false;
    }
    Ok(config)
}

fn read(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|err| format!("failed to read {path:?}: {err}"))
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = load_config(cli)?;
    let document: InputDocument = serde_json::from_str(&read(&cli.input)?)
        .map_err(|err| format!("failed to parse input {:?}: {err}", cli.input))?;

    let templates: Rc<dyn TemplateSource> = Rc::new(document.templates);
    let mut runtime = Runtime::new(config, Rc::new(DefaultRecipe::new(templates)));
    runtime
        .start_document(document.title.as_deref())
        .map_err(|err| err.to_string())?;
    runtime
        .feed(Chunk::new(document.tokens))
        .map_err(|err| err.to_string())?;
    runtime.end_input().map_err(|err| err.to_string())?;
    runtime.run_until_idle().map_err(|err| err.to_string())?;

    let output = runtime.take_output();
    if cli.json {
        let json = serde_json::to_string_pretty(&output)
            .map_err(|err| format!("failed to serialize output: {err}"))?;
        println!("{json}");
    } else {
        for token in output.iter().flat_map(|chunk| &chunk.tokens) {
            println!("{}", format_token(token));
        }
    }

    for diagnostic in runtime.diagnostics() {
        log::warn!("{diagnostic}");
    }
    if !runtime.is_finished() {
        return Err(format!(
            "document did not finish: {} continuation(s) unresolved",
            runtime.pending_continuations()
        ));
    }
    let counters = runtime.counters();
    log::debug!(
        "transforms={} deferrals={} restarts={} expansions={} repairs={}",
        counters.transforms_invoked,
        counters.deferrals,
        counters.restarts,
        counters.expansions,
        counters.integrity_repairs
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
