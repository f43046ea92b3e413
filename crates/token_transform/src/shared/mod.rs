pub mod chunk;
pub mod context;
pub mod counters;
pub mod error;
pub mod token;

pub use chunk::{Chunk, Rank};
pub use context::DocumentContext;
pub use counters::Counters;
pub use error::{
    ConfigurationError, Diagnostic, ExpansionError, PipelineError, StreamIntegrityError,
    TransformError,
};
pub use token::{
    DataBag, KeyValue, SourceRange, Tag, Token, TokenKind, is_literal_tokens, strip_eof,
    tokens_to_text,
};
