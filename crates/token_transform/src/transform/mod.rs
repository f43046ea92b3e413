//! Transform managers and the handler interface they drive.
//!
//! Phase one and three run [`SyncTransformer`]s over whole chunks. Phase two
//! runs ranked [`AsyncTransform`] handlers per token and may suspend on a
//! deferral; see [`AsyncTransformManager`].

pub mod accum;
pub mod async_manager;
pub mod attributes;
pub mod registry;
pub mod sync_manager;

use std::rc::Rc;

use crate::config::PipelineConfig;
use crate::frame::{ExpansionHost, ExpansionRequest, Frame};
use crate::pipeline::PipelineOptions;
use crate::scheduler::{Continuation, ExpansionId, PipelineId, Scheduler};
use crate::shared::{DocumentContext, ExpansionError, Rank, Token, TransformError};

pub use accum::{AccumArena, AccumId, Delivery, Upstream};
pub use async_manager::AsyncTransformManager;
pub use attributes::{AttributeExpansion, AttributeTransformManager};
pub use registry::{Registration, TransformKind, TransformList, TransformRegistry};
pub use sync_manager::{SyncCx, SyncTransformManager, SyncTransformer};

use async_manager::ContinuationTable;

/// What a handler did with a token.
#[derive(Debug, PartialEq)]
pub enum TransformOutcome {
    /// Pass the token on to the next transform.
    Unchanged,
    /// Final for this phase; no further transforms see these tokens.
    Done(Vec<Token>),
    /// Stamped with the handler's rank and fed back to higher-ranked
    /// transforms.
    Partial(Vec<Token>),
    /// Like `Partial` for `tokens`; the rest arrives later through
    /// `continuation`, which must come from [`TransformCx::defer`].
    Deferred {
        tokens: Vec<Token>,
        continuation: Continuation,
    },
}

/// A phase-two handler.
pub trait AsyncTransform {
    fn transform(
        &self,
        token: &Token,
        cx: &mut TransformCx<'_>,
    ) -> Result<TransformOutcome, TransformError>;
}

/// Adapter for closure handlers, mostly used by tests.
pub struct FnTransform<F>(F);

impl<F> AsyncTransform for FnTransform<F>
where
    F: Fn(&Token, &mut TransformCx<'_>) -> Result<TransformOutcome, TransformError>,
{
    fn transform(
        &self,
        token: &Token,
        cx: &mut TransformCx<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        (self.0)(token, cx)
    }
}

pub fn transform_fn<F>(f: F) -> Rc<dyn AsyncTransform>
where
    F: Fn(&Token, &mut TransformCx<'_>) -> Result<TransformOutcome, TransformError> + 'static,
{
    Rc::new(FnTransform(f))
}

/// Everything a phase-two handler may touch while it runs.
pub struct TransformCx<'a> {
    pub(crate) ctx: &'a mut DocumentContext,
    pub(crate) scheduler: &'a mut Scheduler,
    pub(crate) frame: &'a Rc<Frame>,
    pub(crate) options: &'a PipelineOptions,
    pub(crate) pipeline: PipelineId,
    pub(crate) continuations: &'a mut ContinuationTable,
    pub(crate) rank: Rank,
    pub(crate) issued: Option<Continuation>,
}

impl<'a> TransformCx<'a> {
    pub fn frame(&self) -> &Rc<Frame> {
        self.frame
    }

    pub fn options(&self) -> &PipelineOptions {
        self.options
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.ctx.config
    }

    /// Rank of the handler being invoked.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Continuation for a [`TransformOutcome::Deferred`] result. Repeated
    /// calls within one invocation return the same handle. A handle that is
    /// not returned in the outcome is released when the handler returns.
    pub fn defer(&mut self) -> Continuation {
        if let Some(continuation) = self.issued {
            return continuation;
        }
        let continuation = Continuation {
            pipeline: self.pipeline,
            slot: self.continuations.allocate(),
        };
        self.issued = Some(continuation);
        continuation
    }

    pub fn report_expansion(&mut self, err: &ExpansionError) {
        self.ctx.report_expansion(err);
    }

    pub fn scheduler(&mut self) -> &mut Scheduler {
        &mut *self.scheduler
    }
}

impl ExpansionHost for TransformCx<'_> {
    fn request_expansion(&mut self, request: ExpansionRequest) -> ExpansionId {
        self.ctx.counters.expansions += 1;
        self.scheduler.request_expansion(request)
    }
}
