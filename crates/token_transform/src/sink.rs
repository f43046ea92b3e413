//! Downstream side of a transform stage.

use crate::shared::Chunk;

/// What a stage hands to the next one.
#[derive(Clone, Debug, PartialEq)]
pub enum StageEvent {
    Chunk(Chunk),
    End,
}

pub trait TokenSink {
    fn chunk(&mut self, chunk: Chunk);
    fn end(&mut self);
}

pub struct VecTokenSink<'a>(pub &'a mut Vec<StageEvent>);

impl TokenSink for VecTokenSink<'_> {
    #[inline]
    fn chunk(&mut self, chunk: Chunk) {
        self.0.push(StageEvent::Chunk(chunk));
    }

    #[inline]
    fn end(&mut self) {
        self.0.push(StageEvent::End);
    }
}
