//! Pipeline assembly: the three transform stages behind one frame.

use std::rc::Rc;

use crate::frame::Frame;
use crate::scheduler::{Continuation, ExpansionId, PipelineId, Scheduler};
use crate::shared::{Chunk, ConfigurationError, DocumentContext, PipelineError, Rank};
use crate::sink::{StageEvent, VecTokenSink};
use crate::transform::async_manager::StageCx;
use crate::transform::{AsyncTransformManager, SyncCx, SyncTransformManager};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Full document: phases one to three.
    Document,
    /// Expanded token content for templates and attributes: phases one and
    /// two.
    #[default]
    Expanded,
}

impl PipelineKind {
    /// Rank stamped on the pipeline's final output.
    pub fn end_rank(self) -> Rank {
        match self {
            PipelineKind::Document => Rank::PHASE3_END,
            PipelineKind::Expanded => Rank::PHASE2_END,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Content is being transcluded rather than viewed directly.
    pub is_include: bool,
    pub expand_templates: bool,
    pub in_template: bool,
}

/// Stage managers for one pipeline.
pub struct PipelineStages {
    pub sync1: SyncTransformManager,
    pub async2: AsyncTransformManager,
    /// Present for document pipelines only.
    pub sync3: Option<SyncTransformManager>,
}

impl PipelineStages {
    /// Stages with no transforms registered.
    pub fn empty(kind: PipelineKind) -> Self {
        Self {
            sync1: SyncTransformManager::new(Rank::PHASE1_END),
            async2: AsyncTransformManager::new(Rank::PHASE2_END),
            sync3: match kind {
                PipelineKind::Document => Some(SyncTransformManager::new(Rank::PHASE3_END)),
                PipelineKind::Expanded => None,
            },
        }
    }
}

/// Builds the stage managers for a pipeline of the given kind.
pub trait PipelineFactory {
    fn build(
        &self,
        kind: PipelineKind,
        options: &PipelineOptions,
    ) -> Result<PipelineStages, ConfigurationError>;
}

/// Factory producing stages with no transforms at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThrough;

impl PipelineFactory for PassThrough {
    fn build(
        &self,
        kind: PipelineKind,
        _options: &PipelineOptions,
    ) -> Result<PipelineStages, ConfigurationError> {
        Ok(PipelineStages::empty(kind))
    }
}

/// Where a pipeline's final output goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PipelineOutput {
    Document,
    Expansion(ExpansionId),
}

pub(crate) struct Pipeline {
    pub(crate) kind: PipelineKind,
    pub(crate) frame: Rc<Frame>,
    pub(crate) options: PipelineOptions,
    pub(crate) output: PipelineOutput,
    stages: PipelineStages,
}

impl Pipeline {
    pub(crate) fn new(
        kind: PipelineKind,
        frame: Rc<Frame>,
        options: PipelineOptions,
        output: PipelineOutput,
        stages: PipelineStages,
    ) -> Self {
        Self {
            kind,
            frame,
            options,
            output,
            stages,
        }
    }

    pub(crate) fn feed(
        &mut self,
        id: PipelineId,
        chunk: Chunk,
        ctx: &mut DocumentContext,
        scheduler: &mut Scheduler,
    ) -> Result<Vec<StageEvent>, PipelineError> {
        let mut phase1 = Vec::new();
        {
            let mut cx = SyncCx::new(ctx, &self.frame, &self.options);
            self.stages
                .sync1
                .on_chunk(chunk, &mut cx, &mut VecTokenSink(&mut phase1))?;
        }
        self.run_async(id, phase1, ctx, scheduler)
    }

    pub(crate) fn end(
        &mut self,
        id: PipelineId,
        ctx: &mut DocumentContext,
        scheduler: &mut Scheduler,
    ) -> Result<Vec<StageEvent>, PipelineError> {
        let mut phase1 = Vec::new();
        self.stages.sync1.on_end(&mut VecTokenSink(&mut phase1));
        self.run_async(id, phase1, ctx, scheduler)
    }

    pub(crate) fn resolve(
        &mut self,
        id: PipelineId,
        continuation: Continuation,
        chunk: Chunk,
        ctx: &mut DocumentContext,
        scheduler: &mut Scheduler,
    ) -> Result<Vec<StageEvent>, PipelineError> {
        let mut phase2 = Vec::new();
        {
            let mut cx = StageCx {
                ctx: &mut *ctx,
                scheduler,
                frame: &self.frame,
                options: &self.options,
                pipeline: id,
            };
            self.stages
                .async2
                .resolve(continuation, chunk, &mut cx, &mut VecTokenSink(&mut phase2))?;
        }
        self.run_sync3(phase2, ctx)
    }

    fn run_async(
        &mut self,
        id: PipelineId,
        events: Vec<StageEvent>,
        ctx: &mut DocumentContext,
        scheduler: &mut Scheduler,
    ) -> Result<Vec<StageEvent>, PipelineError> {
        let mut phase2 = Vec::new();
        {
            let mut cx = StageCx {
                ctx: &mut *ctx,
                scheduler,
                frame: &self.frame,
                options: &self.options,
                pipeline: id,
            };
            let mut sink = VecTokenSink(&mut phase2);
            for event in events {
                match event {
                    StageEvent::Chunk(chunk) => {
                        self.stages.async2.on_chunk(chunk, &mut cx, &mut sink)?
                    }
                    StageEvent::End => self.stages.async2.on_end(&mut cx, &mut sink)?,
                }
            }
        }
        self.run_sync3(phase2, ctx)
    }

    fn run_sync3(
        &mut self,
        events: Vec<StageEvent>,
        ctx: &mut DocumentContext,
    ) -> Result<Vec<StageEvent>, PipelineError> {
        let Some(sync3) = self.stages.sync3.as_mut() else {
            return Ok(events);
        };
        let mut out = Vec::with_capacity(events.len());
        let mut cx = SyncCx::new(ctx, &self.frame, &self.options);
        let mut sink = VecTokenSink(&mut out);
        for event in events {
            match event {
                StageEvent::Chunk(chunk) => sync3.on_chunk(chunk, &mut cx, &mut sink)?,
                StageEvent::End => sync3.on_end(&mut sink),
            }
        }
        Ok(out)
    }

    pub(crate) fn async_stage(&self) -> &AsyncTransformManager {
        &self.stages.async2
    }
}
