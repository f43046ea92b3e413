//! Error types for registration, expansion, stream integrity and handlers.

use std::error::Error;
use std::fmt;

use super::chunk::Rank;
use super::token::{KeyValue, Tag, Token};

/// Rejected transform registration. Fatal at setup time.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigurationError {
    DuplicateTransform {
        name: String,
        rank: Rank,
        key: String,
    },
    InvalidRank {
        value: f64,
    },
    MissingTagName {
        name: String,
    },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::DuplicateTransform { name, rank, key } => write!(
                f,
                "transform `{name}` duplicates rank {rank} for key `{key}`"
            ),
            ConfigurationError::InvalidRank { value } => {
                write!(f, "transform rank {value} is outside [0, 3)")
            }
            ConfigurationError::MissingTagName { name } => {
                write!(f, "tag transform `{name}` needs a tag name")
            }
        }
    }
}

impl Error for ConfigurationError {}

/// Recoverable expansion failure; rendered inline as an error marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpansionError {
    DepthExceeded {
        title: String,
        depth: usize,
        max_depth: usize,
    },
    LoopDetected {
        title: String,
    },
}

impl ExpansionError {
    pub fn title(&self) -> &str {
        match self {
            ExpansionError::DepthExceeded { title, .. }
            | ExpansionError::LoopDetected { title } => title,
        }
    }

    /// Inline tokens that replace the expansion that failed.
    pub fn marker(&self) -> Vec<Token> {
        let class = match self {
            ExpansionError::DepthExceeded { .. } => "depth-exceeded",
            ExpansionError::LoopDetected { .. } => "template-loop",
        };
        let mut open = Tag::new("span").with_attrs(vec![
            KeyValue::literal("class", "error"),
            KeyValue::literal("typeof", "mw:Error"),
        ]);
        open.set_data("error", class);
        vec![
            Token::OpenTag(open),
            Token::Text(self.to_string()),
            Token::close("span"),
        ]
    }
}

impl fmt::Display for ExpansionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpansionError::DepthExceeded {
                title,
                depth,
                max_depth,
            } => write!(
                f,
                "Expansion depth limit exceeded at {title} (depth {depth} > {max_depth})"
            ),
            ExpansionError::LoopDetected { title } => {
                write!(f, "Expansion loop detected at {title}")
            }
        }
    }
}

impl Error for ExpansionError {}

/// Violation of the stream contract between stages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamIntegrityError {
    MissingEndOfInput,
    /// An end-of-input marker arrived with content after it, or twice.
    MisplacedEndOfInput,
    UnstampedRank {
        site: &'static str,
    },
}

impl fmt::Display for StreamIntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamIntegrityError::MissingEndOfInput => {
                f.write_str("top-level stream ended without an end-of-input token")
            }
            StreamIntegrityError::MisplacedEndOfInput => {
                f.write_str("end-of-input token is not the last token of the stream")
            }
            StreamIntegrityError::UnstampedRank { site } => {
                write!(f, "chunk without a rank reached {site}")
            }
        }
    }
}

impl Error for StreamIntegrityError {}

/// Failure raised by a handler. Fatal for the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformError {
    pub transform: String,
    pub message: String,
}

impl TransformError {
    pub fn new(transform: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            transform: transform.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transform `{}` failed: {}", self.transform, self.message)
    }
}

impl Error for TransformError {}

/// Anything that stops a document conversion.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineError {
    Configuration(ConfigurationError),
    Integrity(StreamIntegrityError),
    Transform(TransformError),
    /// The document was already stopped by an earlier fatal error.
    Poisoned,
    NotStarted,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Configuration(err) => write!(f, "configuration error: {err}"),
            PipelineError::Integrity(err) => write!(f, "stream integrity error: {err}"),
            PipelineError::Transform(err) => err.fmt(f),
            PipelineError::Poisoned => f.write_str("document stopped after a fatal error"),
            PipelineError::NotStarted => f.write_str("no document pipeline was started"),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineError::Configuration(err) => Some(err),
            PipelineError::Integrity(err) => Some(err),
            PipelineError::Transform(err) => Some(err),
            PipelineError::Poisoned | PipelineError::NotStarted => None,
        }
    }
}

impl From<ConfigurationError> for PipelineError {
    fn from(err: ConfigurationError) -> Self {
        PipelineError::Configuration(err)
    }
}

impl From<StreamIntegrityError> for PipelineError {
    fn from(err: StreamIntegrityError) -> Self {
        PipelineError::Integrity(err)
    }
}

impl From<TransformError> for PipelineError {
    fn from(err: TransformError) -> Self {
        PipelineError::Transform(err)
    }
}

/// Non-fatal problem recorded while converting a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    Integrity(StreamIntegrityError),
    Expansion(ExpansionError),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Integrity(err) => err.fmt(f),
            Diagnostic::Expansion(err) => err.fmt(f),
        }
    }
}
