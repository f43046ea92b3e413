//! Pipeline configuration.

/// What to do when a stage sees a broken stream contract.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum IntegrityMode {
    /// Log, record a diagnostic, repair and keep going.
    #[default]
    Repair,
    /// Stop the document with a `PipelineError::Integrity`.
    Strict,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct PipelineConfig {
    /// Deepest frame allowed to expand further.
    pub max_depth: usize,
    pub integrity: IntegrityMode,
    /// Top-level default for template expansion.
    pub expand_templates: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_depth: 40,
            integrity: IntegrityMode::Repair,
            expand_templates: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_depth, 40);
        assert_eq!(config.integrity, IntegrityMode::Repair);
        assert!(config.expand_templates);
    }
}
