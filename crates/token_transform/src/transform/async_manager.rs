//! Phase two: ranked per-token transforms with deferred completion.
//!
//! Tokens are rewritten with an explicit work stack. Each stack entry is a
//! chunk plus the rank watermark of the transform that produced it, so a
//! rewritten token only ever meets transforms ranked above the one that
//! produced it. A deferral splices an accumulator node into the output: the
//! node collects the deferred tokens (its child) ahead of everything that
//! follows in the stream (its sibling).
//!
//! Invariants:
//! - Output order equals input order, deferred or not.
//! - A token is never resubmitted to a transform ranked at or below its
//!   stamp.
//! - At frame depth 0 the emitted stream ends with exactly one end-of-input
//!   token and carries none before that.

use std::mem;
use std::rc::Rc;

use crate::frame::Frame;
use crate::pipeline::PipelineOptions;
use crate::scheduler::{Continuation, PipelineId, Scheduler};
use crate::shared::{
    Chunk, ConfigurationError, DocumentContext, PipelineError, Rank, StreamIntegrityError, Token,
    TokenKind, TransformError,
};
use crate::sink::TokenSink;

use super::accum::{AccumArena, AccumId, Delivery, Upstream};
use super::registry::{Registration, TransformKind, TransformRegistry};
use super::{AsyncTransform, TransformCx, TransformOutcome};

/// Borrowed runtime state for one call into a stage.
pub(crate) struct StageCx<'a> {
    pub ctx: &'a mut DocumentContext,
    pub scheduler: &'a mut Scheduler,
    pub frame: &'a Rc<Frame>,
    pub options: &'a PipelineOptions,
    pub pipeline: PipelineId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotState {
    Issued,
    Linked(Upstream),
    Released,
}

/// Continuation slots of one manager. Slots are never reused, so a stale
/// handle can only hit a released slot.
#[derive(Debug, Default)]
pub(crate) struct ContinuationTable {
    slots: Vec<SlotState>,
}

impl ContinuationTable {
    pub(crate) fn allocate(&mut self) -> usize {
        self.slots.push(SlotState::Issued);
        self.slots.len() - 1
    }

    fn is_issued(&self, slot: usize) -> bool {
        self.slots.get(slot) == Some(&SlotState::Issued)
    }

    fn link(&mut self, slot: usize, target: Upstream) {
        if let Some(state) = self.slots.get_mut(slot) {
            *state = SlotState::Linked(target);
        }
    }

    fn target(&self, slot: usize) -> Option<Upstream> {
        match self.slots.get(slot) {
            Some(SlotState::Linked(target)) => Some(*target),
            _ => None,
        }
    }

    fn release(&mut self, slot: usize) {
        if let Some(state) = self.slots.get_mut(slot) {
            *state = SlotState::Released;
        }
    }

    fn pending(&self) -> usize {
        self.slots
            .iter()
            .filter(|state| **state != SlotState::Released)
            .count()
    }
}

struct WorkChunk {
    tokens: std::vec::IntoIter<Token>,
    rank: Option<Rank>,
    deferral: Option<Continuation>,
}

impl WorkChunk {
    fn new(tokens: Vec<Token>, rank: Option<Rank>, deferral: Option<Continuation>) -> Self {
        Self {
            tokens: tokens.into_iter(),
            rank,
            deferral,
        }
    }
}

enum Step {
    Keep,
    Resolved(Vec<Token>),
    Push(WorkChunk),
}

/// Result of one work-stack run: the synchronously resolved prefix and the
/// last accumulator node when anything was deferred.
pub(crate) struct Transformed {
    pub tokens: Vec<Token>,
    pub tail: Option<AccumId>,
}

/// End-of-input bookkeeping for depth-0 output.
#[derive(Debug, Default)]
struct EofCheck {
    seen: bool,
    misplaced_reported: bool,
}

impl EofCheck {
    /// Withholds end-of-input markers until the final emission, which gets
    /// exactly one.
    fn filter(
        &mut self,
        tokens: &mut Vec<Token>,
        at_end: bool,
        ctx: &mut DocumentContext,
    ) -> Result<(), StreamIntegrityError> {
        if self.seen || tokens.iter().any(Token::is_eof) {
            let mut misplaced = false;
            let mut kept = Vec::with_capacity(tokens.len());
            for token in tokens.drain(..) {
                if token.is_eof() {
                    misplaced |= self.seen;
                    self.seen = true;
                    continue;
                }
                misplaced |= self.seen;
                kept.push(token);
            }
            *tokens = kept;
            if misplaced && !self.misplaced_reported {
                self.misplaced_reported = true;
                ctx.report_integrity(StreamIntegrityError::MisplacedEndOfInput)?;
            }
        }
        if at_end {
            if !self.seen {
                ctx.report_integrity(StreamIntegrityError::MissingEndOfInput)?;
            }
            tokens.push(Token::EndOfInput);
            *self = EofCheck::default();
        }
        Ok(())
    }
}

pub struct AsyncTransformManager {
    registry: TransformRegistry,
    phase_end: Rank,
    chain: AccumArena,
    continuations: ContinuationTable,
    tail: Option<AccumId>,
    eof: EofCheck,
}

impl AsyncTransformManager {
    pub fn new(phase_end: Rank) -> Self {
        Self {
            registry: TransformRegistry::new(),
            phase_end,
            chain: AccumArena::new(phase_end),
            continuations: ContinuationTable::default(),
            tail: None,
            eof: EofCheck::default(),
        }
    }

    pub fn phase_end(&self) -> Rank {
        self.phase_end
    }

    pub fn registry(&self) -> &TransformRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TransformRegistry {
        &mut self.registry
    }

    pub fn register_transform(
        &mut self,
        handler: Rc<dyn AsyncTransform>,
        name: &str,
        rank: f64,
        kind: TransformKind,
        tag_name: Option<&str>,
    ) -> Result<(), ConfigurationError> {
        if rank <= self.phase_end.value() - 1.0 {
            log::debug!(
                target: "wt2html.async",
                "`{name}` rank={rank} is at or below the phase start; \
                 only unranked input reaches it"
            );
        }
        self.registry.register_transform(handler, name, rank, kind, tag_name)
    }

    pub fn remove_transform(
        &mut self,
        rank: f64,
        kind: TransformKind,
        tag_name: Option<&str>,
    ) -> bool {
        self.registry.remove_transform(rank, kind, tag_name)
    }

    /// Continuations handed out and not yet finally resolved.
    pub fn pending_continuations(&self) -> usize {
        self.continuations.pending()
    }

    pub fn live_nodes(&self) -> usize {
        self.chain.live_nodes()
    }

    pub(crate) fn on_chunk(
        &mut self,
        chunk: Chunk,
        cx: &mut StageCx<'_>,
        sink: &mut dyn TokenSink,
    ) -> Result<(), PipelineError> {
        log::trace!(
            target: "wt2html.async",
            "chunk tokens={} rank={:?} tail={:?}",
            chunk.len(),
            chunk.rank,
            self.tail
        );
        let parent = self.tail.map_or(Upstream::Emit, Upstream::Sibling);
        let result = self.transform_tokens(chunk, parent, cx)?;
        match self.tail {
            Some(tail) => {
                if !result.tokens.is_empty() {
                    let delivery = self
                        .chain
                        .append(tail, Chunk::ranked(result.tokens, self.phase_end));
                    self.deliver(delivery, cx, sink)?;
                }
            }
            None => self.emit(result.tokens, false, cx, sink)?,
        }
        if result.tail.is_some() {
            self.tail = result.tail;
        }
        Ok(())
    }

    pub(crate) fn on_end(
        &mut self,
        cx: &mut StageCx<'_>,
        sink: &mut dyn TokenSink,
    ) -> Result<(), PipelineError> {
        log::trace!(target: "wt2html.async", "end tail={:?}", self.tail);
        match self.tail {
            Some(tail) => self.deliver(AccumArena::sibling_done(tail), cx, sink),
            None => self.emit(Vec::new(), true, cx, sink),
        }
    }

    /// Delivers a (partial) result for `continuation`. Tokens still below
    /// the phase end rank are run through the work stack again first.
    pub(crate) fn resolve(
        &mut self,
        continuation: Continuation,
        chunk: Chunk,
        cx: &mut StageCx<'_>,
        sink: &mut dyn TokenSink,
    ) -> Result<(), PipelineError> {
        let slot = continuation.slot;
        let Some(target) = self.continuations.target(slot) else {
            log::warn!(
                target: "wt2html.async",
                "resolution for unknown or finished continuation {slot}"
            );
            return Ok(());
        };
        let Chunk {
            mut tokens,
            mut rank,
            async_mode: mut more,
        } = chunk;
        if tokens.is_empty() && more {
            log::debug!(
                target: "wt2html.async",
                "empty partial resolution for continuation {slot}"
            );
            return Ok(());
        }
        if !more {
            self.continuations.release(slot);
        }

        let single_text = tokens.len() == 1
            && tokens[0].is_text()
            && !self.registry.has_transforms_for(TokenKind::Text);
        if !tokens.is_empty() && rank.is_none_or(|r| r < self.phase_end) && !single_text {
            cx.ctx.counters.restarts += 1;
            log::debug!(
                target: "wt2html.async",
                "restart continuation {slot} tokens={} rank={rank:?}",
                tokens.len()
            );
            let result = self.transform_tokens(Chunk::new(tokens).with_rank(rank), target, cx)?;
            tokens = result.tokens;
            rank = Some(self.phase_end);
            if let Some(tail) = result.tail {
                if more {
                    // Later results for this continuation follow the new chain.
                    self.continuations.link(slot, Upstream::Sibling(tail));
                } else {
                    self.deliver(AccumArena::sibling_done(tail), cx, sink)?;
                    more = true;
                }
            }
        }

        let chunk = Chunk {
            tokens,
            rank: Some(rank.unwrap_or(self.phase_end)),
            async_mode: more,
        };
        self.deliver(Delivery::new(target, chunk), cx, sink)
    }

    pub(crate) fn transform_tokens(
        &mut self,
        chunk: Chunk,
        parent: Upstream,
        cx: &mut StageCx<'_>,
    ) -> Result<Transformed, PipelineError> {
        let text_fast_path = !self.registry.has_transforms_for(TokenKind::Text);
        let mut first = Vec::with_capacity(chunk.tokens.len());
        let mut current: Option<AccumId> = None;
        let mut pending = Vec::new();
        let mut stack = vec![WorkChunk::new(chunk.tokens, chunk.rank, None)];

        while let Some(work) = stack.last_mut() {
            let Some(token) = work.tokens.next() else {
                if let Some(done) = stack.pop()
                    && let Some(continuation) = done.deferral
                {
                    self.flush_pending(current, &mut pending, cx)?;
                    current = Some(self.link(continuation, parent, current, cx));
                }
                continue;
            };
            let min_rank = work.rank;

            if text_fast_path && token.is_text() {
                write(&mut first, &mut pending, current, token);
                continue;
            }

            let transforms = self.registry.transforms_for(&token, min_rank);
            let mut step = Step::Keep;
            for registration in transforms.iter() {
                match self.invoke(registration, &token, cx)? {
                    TransformOutcome::Unchanged => {}
                    TransformOutcome::Done(tokens) => {
                        step = Step::Resolved(tokens);
                        break;
                    }
                    TransformOutcome::Partial(tokens) => {
                        step = Step::Push(WorkChunk::new(tokens, Some(registration.rank), None));
                        break;
                    }
                    TransformOutcome::Deferred {
                        tokens,
                        continuation,
                    } => {
                        step = Step::Push(WorkChunk::new(
                            tokens,
                            Some(registration.rank),
                            Some(continuation),
                        ));
                        break;
                    }
                }
            }

            match step {
                Step::Keep => write(&mut first, &mut pending, current, token),
                Step::Resolved(tokens) => {
                    for token in tokens {
                        write(&mut first, &mut pending, current, token);
                    }
                }
                Step::Push(next) => stack.push(next),
            }
        }

        self.flush_pending(current, &mut pending, cx)?;
        Ok(Transformed {
            tokens: first,
            tail: current,
        })
    }

    fn invoke(
        &mut self,
        registration: &Registration,
        token: &Token,
        cx: &mut StageCx<'_>,
    ) -> Result<TransformOutcome, PipelineError> {
        cx.ctx.counters.transforms_invoked += 1;
        log::trace!(
            target: "wt2html.async",
            "`{}` rank={} <- {:?}",
            registration.name,
            registration.rank,
            token.kind()
        );
        let mut tcx = TransformCx {
            ctx: &mut *cx.ctx,
            scheduler: &mut *cx.scheduler,
            frame: cx.frame,
            options: cx.options,
            pipeline: cx.pipeline,
            continuations: &mut self.continuations,
            rank: registration.rank,
            issued: None,
        };
        let outcome = registration.handler.transform(token, &mut tcx);
        let issued = tcx.issued;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                log::error!(target: "wt2html.async", "{err}");
                return Err(err.into());
            }
        };

        match (&outcome, issued) {
            (TransformOutcome::Deferred { continuation, .. }, Some(issued))
                if *continuation == issued && self.continuations.is_issued(issued.slot) =>
            {
                cx.ctx.counters.deferrals += 1;
            }
            (TransformOutcome::Deferred { .. }, _) => {
                return Err(TransformError::new(
                    &*registration.name,
                    "deferred with a continuation not issued by this invocation",
                )
                .into());
            }
            (_, Some(unused)) => {
                log::trace!(
                    target: "wt2html.async",
                    "`{}` released unused continuation {}",
                    registration.name,
                    unused.slot
                );
                self.continuations.release(unused.slot);
            }
            (_, None) => {}
        }
        Ok(outcome)
    }

    fn link(
        &mut self,
        continuation: Continuation,
        parent: Upstream,
        current: Option<AccumId>,
        cx: &mut StageCx<'_>,
    ) -> AccumId {
        let upstream = current.map_or(parent, Upstream::Sibling);
        let node = self.chain.add_node(upstream);
        self.continuations.link(continuation.slot, Upstream::Child(node));
        cx.ctx.counters.accum_nodes += 1;
        node
    }

    /// Moves tokens written after a deferral into that deferral's node.
    fn flush_pending(
        &mut self,
        current: Option<AccumId>,
        pending: &mut Vec<Token>,
        cx: &mut StageCx<'_>,
    ) -> Result<(), PipelineError> {
        let Some(node) = current else {
            return Ok(());
        };
        if pending.is_empty() {
            return Ok(());
        }
        let delivery = self
            .chain
            .append(node, Chunk::ranked(mem::take(pending), self.phase_end));
        let mut emitted = Vec::new();
        self.chain.deliver(delivery, cx.ctx, &mut emitted)?;
        // The node still waits for its child, so sibling input only buffers.
        debug_assert!(emitted.is_empty());
        Ok(())
    }

    fn deliver(
        &mut self,
        delivery: Delivery,
        cx: &mut StageCx<'_>,
        sink: &mut dyn TokenSink,
    ) -> Result<(), PipelineError> {
        let mut emitted = Vec::new();
        self.chain.deliver(delivery, cx.ctx, &mut emitted)?;
        for chunk in emitted {
            let at_end = !chunk.async_mode;
            self.emit(chunk.tokens, at_end, cx, sink)?;
        }
        Ok(())
    }

    fn emit(
        &mut self,
        mut tokens: Vec<Token>,
        at_end: bool,
        cx: &mut StageCx<'_>,
        sink: &mut dyn TokenSink,
    ) -> Result<(), PipelineError> {
        if cx.frame.depth() == 0 {
            self.eof.filter(&mut tokens, at_end, cx.ctx)?;
        }
        if !tokens.is_empty() {
            cx.ctx.counters.tokens_transformed += tokens.len() as u64;
            sink.chunk(Chunk::ranked(tokens, self.phase_end));
        }
        if at_end {
            sink.end();
            self.tail = None;
            self.eof = EofCheck::default();
        }
        Ok(())
    }
}

fn write(first: &mut Vec<Token>, pending: &mut Vec<Token>, current: Option<AccumId>, token: Token) {
    match current {
        None => first.push(token),
        Some(_) => pending.push(token),
    }
}
