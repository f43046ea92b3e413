//! Event queue that drives a document conversion.
//!
//! Every suspension point ends up here: expansion requests and continuation
//! resolutions are queued, and the runtime drains the queue one event at a
//! time. Nothing in the transform layer calls back into a pipeline directly.

use std::collections::VecDeque;

use crate::frame::{ExpansionHost, ExpansionRequest};
use crate::shared::Chunk;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub(crate) usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpansionId(pub(crate) u64);

/// One-shot handle for tokens a transform promised to deliver later.
///
/// Resolving with `async_mode = true` delivers a partial result and keeps the
/// handle alive; the final resolution carries `async_mode = false`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Continuation {
    pub(crate) pipeline: PipelineId,
    pub(crate) slot: usize,
}

impl Continuation {
    pub fn pipeline(self) -> PipelineId {
        self.pipeline
    }
}

#[derive(Debug)]
pub(crate) enum Event {
    Feed { pipeline: PipelineId, chunk: Chunk },
    End { pipeline: PipelineId },
    Resolve { continuation: Continuation, chunk: Chunk },
    Expand { id: ExpansionId, request: ExpansionRequest },
}

#[derive(Debug, Default)]
pub struct Scheduler {
    events: VecDeque<Event>,
    next_expansion: u64,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues delivery of `chunk` to whatever the continuation currently
    /// feeds.
    pub fn resolve(&mut self, continuation: Continuation, chunk: Chunk) {
        self.events.push_back(Event::Resolve {
            continuation,
            chunk,
        });
    }

    pub(crate) fn push(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub(crate) fn pop(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }

    pub fn is_idle(&self) -> bool {
        self.events.is_empty()
    }
}

impl ExpansionHost for Scheduler {
    fn request_expansion(&mut self, request: ExpansionRequest) -> ExpansionId {
        let id = ExpansionId(self.next_expansion);
        self.next_expansion += 1;
        log::debug!(
            target: "wt2html.runtime",
            "expansion {} requested depth={} tokens={}",
            id.0,
            request.frame.depth(),
            request.content.len()
        );
        self.events.push_back(Event::Expand { id, request });
        id
    }
}
