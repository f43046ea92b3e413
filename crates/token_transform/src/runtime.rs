//! Per-document driver.
//!
//! The runtime owns every pipeline of one conversion in an arena and drains
//! the scheduler's event queue. Expansions start child pipelines whose output
//! is collected and handed to the expansion's waiter; continuation
//! resolutions re-enter the owning pipeline's asynchronous stage. A fatal
//! error stops the document and drops all queued work.

use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use crate::config::PipelineConfig;
use crate::frame::{ExpansionRequest, ExpansionWaiter, Frame};
use crate::pipeline::{Pipeline, PipelineFactory, PipelineKind, PipelineOptions, PipelineOutput};
use crate::scheduler::{Continuation, Event, ExpansionId, PipelineId, Scheduler};
use crate::shared::{
    Chunk, Counters, Diagnostic, DocumentContext, PipelineError, Rank, Token, strip_eof,
};
use crate::sink::StageEvent;

struct PendingExpansion {
    tokens: Vec<Token>,
    waiter: ExpansionWaiter,
    end_rank: Rank,
}

pub struct Runtime {
    ctx: DocumentContext,
    factory: Rc<dyn PipelineFactory>,
    scheduler: Scheduler,
    pipelines: Vec<Option<Pipeline>>,
    expansions: HashMap<ExpansionId, PendingExpansion>,
    document: Option<PipelineId>,
    output: Vec<Chunk>,
    finished: bool,
    failure: Option<PipelineError>,
}

impl Runtime {
    pub fn new(config: PipelineConfig, factory: Rc<dyn PipelineFactory>) -> Self {
        Self {
            ctx: DocumentContext::new(config),
            factory,
            scheduler: Scheduler::new(),
            pipelines: Vec::new(),
            expansions: HashMap::new(),
            document: None,
            output: Vec::new(),
            finished: false,
            failure: None,
        }
    }

    /// Builds the top-level pipeline. Any earlier document state is dropped.
    pub fn start_document(&mut self, title: Option<&str>) -> Result<PipelineId, PipelineError> {
        self.scheduler.clear();
        self.pipelines.clear();
        self.expansions.clear();
        self.output.clear();
        self.finished = false;
        self.failure = None;
        self.ctx = DocumentContext::new(self.ctx.config.clone());

        let options = PipelineOptions {
            is_include: false,
            expand_templates: self.ctx.config.expand_templates,
            in_template: false,
        };
        let stages = self.factory.build(PipelineKind::Document, &options)?;
        let frame = Frame::root(title.map(str::to_string));
        let id = self.add_pipeline(Pipeline::new(
            PipelineKind::Document,
            frame,
            options,
            PipelineOutput::Document,
            stages,
        ));
        log::debug!(target: "wt2html.runtime", "document pipeline {} started", id.0);
        self.document = Some(id);
        Ok(id)
    }

    pub fn feed(&mut self, chunk: Chunk) -> Result<(), PipelineError> {
        let pipeline = self.document.ok_or(PipelineError::NotStarted)?;
        self.scheduler.push(Event::Feed { pipeline, chunk });
        Ok(())
    }

    pub fn end_input(&mut self) -> Result<(), PipelineError> {
        let pipeline = self.document.ok_or(PipelineError::NotStarted)?;
        self.scheduler.push(Event::End { pipeline });
        Ok(())
    }

    /// Queues an out-of-band result for a continuation handed out by a
    /// transform.
    pub fn resolve(&mut self, continuation: Continuation, chunk: Chunk) {
        self.scheduler.resolve(continuation, chunk);
    }

    pub fn run_until_idle(&mut self) -> Result<(), PipelineError> {
        if self.failure.is_some() {
            self.scheduler.clear();
            return Err(PipelineError::Poisoned);
        }
        while let Some(event) = self.scheduler.pop() {
            if let Err(err) = self.dispatch(event) {
                log::error!(target: "wt2html.runtime", "document stopped: {err}");
                self.scheduler.clear();
                self.expansions.clear();
                self.pipelines.clear();
                self.failure = Some(err.clone());
                return Err(err);
            }
        }
        Ok(())
    }

    /// Whole token list in one chunk, run to completion.
    pub fn convert(&mut self, tokens: Vec<Token>) -> Result<Vec<Token>, PipelineError> {
        self.start_document(None)?;
        self.feed(Chunk::new(tokens))?;
        self.end_input()?;
        self.run_until_idle()?;
        Ok(self.take_output().into_iter().flat_map(|c| c.tokens).collect())
    }

    pub fn take_output(&mut self) -> Vec<Chunk> {
        mem::take(&mut self.output)
    }

    /// The document pipeline emitted its end signal.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn failure(&self) -> Option<&PipelineError> {
        self.failure.as_ref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.ctx.diagnostics
    }

    pub fn counters(&self) -> &Counters {
        &self.ctx.counters
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.ctx.config
    }

    pub fn live_pipelines(&self) -> usize {
        self.pipelines.iter().flatten().count()
    }

    /// Continuations of the document pipeline still waiting for a result.
    pub fn pending_continuations(&self) -> usize {
        self.document
            .and_then(|id| self.pipelines.get(id.0))
            .and_then(Option::as_ref)
            .map_or(0, |p| p.async_stage().pending_continuations())
    }

    fn add_pipeline(&mut self, pipeline: Pipeline) -> PipelineId {
        self.pipelines.push(Some(pipeline));
        PipelineId(self.pipelines.len() - 1)
    }

    fn dispatch(&mut self, event: Event) -> Result<(), PipelineError> {
        match event {
            Event::Feed { pipeline, chunk } => {
                let events =
                    self.with_pipeline(pipeline, |p, ctx, s| p.feed(pipeline, chunk, ctx, s))?;
                self.route(pipeline, events)
            }
            Event::End { pipeline } => {
                let events = self.with_pipeline(pipeline, |p, ctx, s| p.end(pipeline, ctx, s))?;
                self.route(pipeline, events)
            }
            Event::Resolve {
                continuation,
                chunk,
            } => {
                let pipeline = continuation.pipeline;
                let events = self.with_pipeline(pipeline, |p, ctx, s| {
                    p.resolve(pipeline, continuation, chunk, ctx, s)
                })?;
                self.route(pipeline, events)
            }
            Event::Expand { id, request } => self.start_expansion(id, request),
        }
    }

    fn with_pipeline<F>(&mut self, id: PipelineId, f: F) -> Result<Vec<StageEvent>, PipelineError>
    where
        F: FnOnce(
            &mut Pipeline,
            &mut DocumentContext,
            &mut Scheduler,
        ) -> Result<Vec<StageEvent>, PipelineError>,
    {
        match self.pipelines.get_mut(id.0).and_then(Option::as_mut) {
            Some(pipeline) => f(pipeline, &mut self.ctx, &mut self.scheduler),
            None => {
                log::warn!(target: "wt2html.runtime", "event for retired pipeline {}", id.0);
                Ok(Vec::new())
            }
        }
    }

    fn start_expansion(
        &mut self,
        id: ExpansionId,
        request: ExpansionRequest,
    ) -> Result<(), PipelineError> {
        let ExpansionRequest {
            frame,
            content,
            options,
            waiter,
        } = request;
        let pipeline_options = PipelineOptions {
            is_include: frame.depth() > 0,
            expand_templates: options.expand_templates,
            in_template: options.in_template,
        };
        let stages = self.factory.build(options.kind, &pipeline_options)?;
        let pipeline = self.add_pipeline(Pipeline::new(
            options.kind,
            frame,
            pipeline_options,
            PipelineOutput::Expansion(id),
            stages,
        ));
        log::debug!(
            target: "wt2html.runtime",
            "expansion {} runs in pipeline {} kind={:?}",
            id.0,
            pipeline.0,
            options.kind
        );
        self.expansions.insert(
            id,
            PendingExpansion {
                tokens: Vec::new(),
                waiter,
                end_rank: options.kind.end_rank(),
            },
        );

        let events =
            self.with_pipeline(pipeline, |p, ctx, s| {
                p.feed(pipeline, Chunk::new(content), ctx, s)
            })?;
        self.route(pipeline, events)?;
        let events = self.with_pipeline(pipeline, |p, ctx, s| p.end(pipeline, ctx, s))?;
        self.route(pipeline, events)
    }

    fn route(&mut self, id: PipelineId, events: Vec<StageEvent>) -> Result<(), PipelineError> {
        let Some(output) = self
            .pipelines
            .get(id.0)
            .and_then(Option::as_ref)
            .map(|p| p.output)
        else {
            return Ok(());
        };
        for event in events {
            match (output, event) {
                (PipelineOutput::Document, StageEvent::Chunk(chunk)) => {
                    if !chunk.is_empty() {
                        self.output.push(chunk);
                    }
                }
                (PipelineOutput::Document, StageEvent::End) => {
                    log::debug!(target: "wt2html.runtime", "document pipeline {} finished", id.0);
                    self.finished = true;
                    self.retire(id);
                }
                (PipelineOutput::Expansion(expansion), StageEvent::Chunk(chunk)) => {
                    if let Some(pending) = self.expansions.get_mut(&expansion) {
                        pending.tokens.extend(strip_eof(chunk.tokens));
                    }
                }
                (PipelineOutput::Expansion(expansion), StageEvent::End) => {
                    self.retire(id);
                    self.complete_expansion(expansion);
                }
            }
        }
        Ok(())
    }

    fn complete_expansion(&mut self, id: ExpansionId) {
        let Some(pending) = self.expansions.remove(&id) else {
            log::warn!(target: "wt2html.runtime", "expansion {} completed twice", id.0);
            return;
        };
        log::debug!(
            target: "wt2html.runtime",
            "expansion {} done tokens={}",
            id.0,
            pending.tokens.len()
        );
        match pending.waiter {
            ExpansionWaiter::Resolve(continuation) => self
                .scheduler
                .resolve(continuation, Chunk::ranked(pending.tokens, pending.end_rank)),
            ExpansionWaiter::Callback(callback) => callback(&mut self.scheduler, pending.tokens),
        }
    }

    fn retire(&mut self, id: PipelineId) {
        if let Some(pipeline) = self.pipelines.get_mut(id.0).and_then(Option::take) {
            log::trace!(
                target: "wt2html.runtime",
                "pipeline {} retired kind={:?}",
                id.0,
                pipeline.kind
            );
        }
    }
}
