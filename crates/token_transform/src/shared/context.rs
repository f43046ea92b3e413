//! Per-document state shared by every pipeline of one conversion.

use crate::config::{IntegrityMode, PipelineConfig};

use super::counters::Counters;
use super::error::{Diagnostic, ExpansionError, StreamIntegrityError};

#[derive(Debug, Default)]
pub struct DocumentContext {
    pub config: PipelineConfig,
    pub counters: Counters,
    pub diagnostics: Vec<Diagnostic>,
}

impl DocumentContext {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Records an integrity violation. In repair mode the caller fixes the
    /// stream and continues; in strict mode the error comes back out.
    pub fn report_integrity(
        &mut self,
        err: StreamIntegrityError,
    ) -> Result<(), StreamIntegrityError> {
        log::error!(target: "wt2html.integrity", "{err}");
        self.diagnostics.push(Diagnostic::Integrity(err.clone()));
        match self.config.integrity {
            IntegrityMode::Repair => {
                self.counters.integrity_repairs += 1;
                Ok(())
            }
            IntegrityMode::Strict => Err(err),
        }
    }

    pub fn report_expansion(&mut self, err: &ExpansionError) {
        log::warn!(target: "wt2html.frame", "{err}");
        self.diagnostics.push(Diagnostic::Expansion(err.clone()));
    }
}
