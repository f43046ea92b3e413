//! Token-transformation core of a wikitext-to-tree converter.
//!
//! A token stream passes three phases: an in-order synchronous phase, a
//! ranked phase whose handlers may defer (template and attribute expansion),
//! and a final synchronous phase. Deferred output is spliced back into the
//! stream in original order by an accumulator chain. Recursive expansion runs
//! in child pipelines scoped by [`Frame`]s and driven by the per-document
//! [`Runtime`].

pub mod config;
pub mod frame;
pub mod handlers;
pub mod pipeline;
pub mod runtime;
pub mod scheduler;
pub mod shared;
pub mod sink;
pub mod token_fmt;
pub mod transform;

pub use config::{IntegrityMode, PipelineConfig};
pub use frame::{
    ExpandOptions, Expansion, ExpansionHost, ExpansionRequest, ExpansionWaiter, Frame, Params,
    TemplateBinding,
};
pub use handlers::{
    AttributeExpander, DefaultRecipe, IncludeFilter, TemplateHandler, TemplateSource, TextMerger,
    template_arg_token, template_token,
};
pub use pipeline::{PassThrough, PipelineFactory, PipelineKind, PipelineOptions, PipelineStages};
pub use runtime::Runtime;
pub use scheduler::{Continuation, ExpansionId, PipelineId, Scheduler};
pub use shared::{
    Chunk, ConfigurationError, Counters, DataBag, Diagnostic, DocumentContext, ExpansionError,
    KeyValue, PipelineError, Rank, SourceRange, StreamIntegrityError, Tag, Token, TokenKind,
    TransformError,
};
pub use sink::{StageEvent, TokenSink, VecTokenSink};
pub use token_fmt::{format_token, format_tokens};
pub use transform::{
    AsyncTransform, AsyncTransformManager, AttributeExpansion, AttributeTransformManager,
    SyncCx, SyncTransformManager, SyncTransformer, TransformCx, TransformKind, TransformOutcome,
    TransformRegistry, transform_fn,
};
