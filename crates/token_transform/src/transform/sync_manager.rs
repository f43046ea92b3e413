//! In-order synchronous phases (one and three).

use std::rc::Rc;

use crate::frame::Frame;
use crate::pipeline::PipelineOptions;
use crate::shared::{Chunk, DocumentContext, Rank, Token, TokenKind, TransformError};
use crate::sink::TokenSink;

/// State a synchronous transformer may read or record into.
pub struct SyncCx<'a> {
    pub(crate) ctx: &'a mut DocumentContext,
    pub(crate) frame: &'a Rc<Frame>,
    pub(crate) options: &'a PipelineOptions,
}

impl<'a> SyncCx<'a> {
    pub fn new(
        ctx: &'a mut DocumentContext,
        frame: &'a Rc<Frame>,
        options: &'a PipelineOptions,
    ) -> Self {
        Self {
            ctx,
            frame,
            options,
        }
    }

    pub fn frame(&self) -> &Rc<Frame> {
        self.frame
    }

    pub fn options(&self) -> &PipelineOptions {
        self.options
    }

    pub fn ctx(&mut self) -> &mut DocumentContext {
        &mut *self.ctx
    }
}

/// A whole-chunk transformer.
///
/// The default driver feeds tokens one at a time to the per-kind hooks,
/// which fall back to `on_any`, which keeps the token. Transformers may keep
/// state across chunks of the same stream.
pub trait SyncTransformer {
    fn name(&self) -> &str;

    fn is_disabled(&self, _cx: &SyncCx<'_>) -> bool {
        false
    }

    fn process_tokens(
        &mut self,
        tokens: Vec<Token>,
        cx: &mut SyncCx<'_>,
    ) -> Result<Vec<Token>, TransformError> {
        let mut out = Vec::with_capacity(tokens.len());
        for token in tokens {
            self.on_token(token, cx, &mut out)?;
        }
        Ok(out)
    }

    fn on_token(
        &mut self,
        token: Token,
        cx: &mut SyncCx<'_>,
        out: &mut Vec<Token>,
    ) -> Result<(), TransformError> {
        match token.kind() {
            TokenKind::Tag => self.on_tag(token, cx, out),
            TokenKind::Text => self.on_text(token, cx, out),
            TokenKind::Newline => self.on_newline(token, cx, out),
            TokenKind::Comment => self.on_comment(token, cx, out),
            TokenKind::End => self.on_end(token, cx, out),
        }
    }

    fn on_tag(
        &mut self,
        token: Token,
        cx: &mut SyncCx<'_>,
        out: &mut Vec<Token>,
    ) -> Result<(), TransformError> {
        self.on_any(token, cx, out)
    }

    fn on_text(
        &mut self,
        token: Token,
        cx: &mut SyncCx<'_>,
        out: &mut Vec<Token>,
    ) -> Result<(), TransformError> {
        self.on_any(token, cx, out)
    }

    fn on_newline(
        &mut self,
        token: Token,
        cx: &mut SyncCx<'_>,
        out: &mut Vec<Token>,
    ) -> Result<(), TransformError> {
        self.on_any(token, cx, out)
    }

    fn on_comment(
        &mut self,
        token: Token,
        cx: &mut SyncCx<'_>,
        out: &mut Vec<Token>,
    ) -> Result<(), TransformError> {
        self.on_any(token, cx, out)
    }

    fn on_end(
        &mut self,
        token: Token,
        cx: &mut SyncCx<'_>,
        out: &mut Vec<Token>,
    ) -> Result<(), TransformError> {
        self.on_any(token, cx, out)
    }

    fn on_any(
        &mut self,
        token: Token,
        _cx: &mut SyncCx<'_>,
        out: &mut Vec<Token>,
    ) -> Result<(), TransformError> {
        out.push(token);
        Ok(())
    }
}

/// Runs its transformers in registration order over each chunk, transformer
/// by transformer, and stamps the result with the phase's end rank.
pub struct SyncTransformManager {
    phase_end: Rank,
    transformers: Vec<Box<dyn SyncTransformer>>,
}

impl SyncTransformManager {
    pub fn new(phase_end: Rank) -> Self {
        Self {
            phase_end,
            transformers: Vec::new(),
        }
    }

    pub fn phase_end(&self) -> Rank {
        self.phase_end
    }

    pub fn add_transformer(&mut self, transformer: impl SyncTransformer + 'static) {
        self.transformers.push(Box::new(transformer));
    }

    pub fn transformer_names(&self) -> Vec<&str> {
        self.transformers.iter().map(|t| t.name()).collect()
    }

    /// One whole chunk followed by the end signal.
    pub fn process(
        &mut self,
        chunk: Chunk,
        cx: &mut SyncCx<'_>,
        sink: &mut dyn TokenSink,
    ) -> Result<(), TransformError> {
        self.on_chunk(chunk, cx, sink)?;
        self.on_end(sink);
        Ok(())
    }

    pub fn on_chunk(
        &mut self,
        chunk: Chunk,
        cx: &mut SyncCx<'_>,
        sink: &mut dyn TokenSink,
    ) -> Result<(), TransformError> {
        if chunk.rank.is_some_and(|rank| rank >= self.phase_end) {
            log::trace!(
                target: "wt2html.sync",
                "phase {} pass-through tokens={}",
                self.phase_end,
                chunk.len()
            );
            sink.chunk(chunk);
            return Ok(());
        }
        let mut tokens = chunk.tokens;
        for transformer in &mut self.transformers {
            if tokens.is_empty() {
                break;
            }
            if transformer.is_disabled(cx) {
                continue;
            }
            log::trace!(
                target: "wt2html.sync",
                "phase {} `{}` tokens={}",
                self.phase_end,
                transformer.name(),
                tokens.len()
            );
            tokens = transformer.process_tokens(tokens, cx)?;
        }
        cx.ctx.counters.tokens_transformed += tokens.len() as u64;
        sink.chunk(Chunk::ranked(tokens, self.phase_end));
        Ok(())
    }

    pub fn on_end(&mut self, sink: &mut dyn TokenSink) {
        log::trace!(target: "wt2html.sync", "phase {} end", self.phase_end);
        sink.end();
    }
}
