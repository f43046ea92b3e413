use crate::shared::{Token, TransformError};
use crate::transform::{SyncCx, SyncTransformer};

/// Joins adjacent text tokens of a chunk.
#[derive(Debug, Default)]
pub struct TextMerger;

impl TextMerger {
    pub fn new() -> Self {
        Self
    }
}

impl SyncTransformer for TextMerger {
    fn name(&self) -> &str {
        "TextMerger"
    }

    fn on_text(
        &mut self,
        token: Token,
        _cx: &mut SyncCx<'_>,
        out: &mut Vec<Token>,
    ) -> Result<(), TransformError> {
        match (out.last_mut(), token) {
            (Some(Token::Text(prev)), Token::Text(text)) => prev.push_str(&text),
            (_, token) => out.push(token),
        }
        Ok(())
    }
}
