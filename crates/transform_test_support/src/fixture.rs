//! Golden fixture files.
//!
//! A fixture holds a template table and a list of cases, written in token
//! notation. TOML and JSON files share one schema:
//!
//! ```toml
//! [templates]
//! greet = ['TEXT "Hello {{{1|you}}}"']
//!
//! [[case]]
//! name = "default argument"
//! input = ['TEXT "{{greet}}"', "EOF"]
//! expected = ['TEXT "Hello you"', "EOF"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use token_transform::{IntegrityMode, PipelineConfig, Token};

use crate::notation;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureFile {
    #[serde(default)]
    pub templates: BTreeMap<String, Vec<String>>,
    #[serde(default, rename = "case")]
    pub cases: Vec<FixtureCase>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureCase {
    pub name: String,
    pub input: Vec<String>,
    pub expected: Vec<String>,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub expand_templates: Option<bool>,
    /// Number of diagnostics the run must record.
    #[serde(default)]
    pub diagnostics: Option<usize>,
    /// Expected failure message prefix; `expected` is ignored when set.
    #[serde(default)]
    pub error: Option<String>,
}

impl FixtureFile {
    pub fn templates(&self) -> Result<BTreeMap<String, Vec<Token>>, String> {
        self.templates
            .iter()
            .map(|(title, lines)| {
                notation::parse_lines(lines)
                    .map(|tokens| (title.clone(), tokens))
                    .map_err(|err| format!("template '{title}': {err}"))
            })
            .collect()
    }
}

impl FixtureCase {
    pub fn input_tokens(&self) -> Result<Vec<Token>, String> {
        notation::parse_lines(&self.input).map_err(|err| format!("case '{}': {err}", self.name))
    }

    pub fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        if let Some(max_depth) = self.max_depth {
            config.max_depth = max_depth;
        }
        if let Some(expand) = self.expand_templates {
            config.expand_templates = expand;
        }
        if self.strict {
            config.integrity = IntegrityMode::Strict;
        }
        config
    }
}

pub fn load_fixture(path: &Path) -> FixtureFile {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read fixture {path:?}: {err}"));
    let fixture: FixtureFile = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content)
            .unwrap_or_else(|err| panic!("failed to parse fixture TOML {path:?}: {err}")),
        Some("json") => serde_json::from_str(&content)
            .unwrap_or_else(|err| panic!("failed to parse fixture JSON {path:?}: {err}")),
        _ => panic!("unsupported fixture extension for {path:?}"),
    };
    assert!(!fixture.cases.is_empty(), "fixture {path:?} has no cases");
    let mut names: Vec<_> = fixture.cases.iter().map(|c| c.name.as_str()).collect();
    names.sort_unstable();
    if let Some(dup) = names.windows(2).find(|pair| pair[0] == pair[1]) {
        panic!("duplicate case name '{}' in {path:?}", dup[0]);
    }
    fixture
}

/// Fixture files under `dir`, sorted by file name.
pub fn fixture_files(dir: &Path) -> Vec<PathBuf> {
    let entries = fs::read_dir(dir)
        .unwrap_or_else(|err| panic!("failed to list fixtures in {dir:?}: {err}"));
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("toml") | Some("json")
            )
        })
        .collect();
    files.sort();
    files
}
