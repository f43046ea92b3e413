use crate::shared::{Token, TransformError};
use crate::transform::{SyncCx, SyncTransformer};

/// Applies `<noinclude>` and `<includeonly>` sections.
///
/// When the content is transcluded, `noinclude` sections are dropped and
/// `includeonly` markers vanish while their content stays. When viewed
/// directly it is the other way round. The end-of-input token always
/// passes.
#[derive(Debug, Default)]
pub struct IncludeFilter {
    /// Nesting depth of the section currently being dropped.
    skip_depth: usize,
}

impl IncludeFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncTransformer for IncludeFilter {
    fn name(&self) -> &str {
        "IncludeFilter"
    }

    fn on_tag(
        &mut self,
        token: Token,
        cx: &mut SyncCx<'_>,
        out: &mut Vec<Token>,
    ) -> Result<(), TransformError> {
        let (dropped, kept) = if cx.options().is_include {
            ("noinclude", "includeonly")
        } else {
            ("includeonly", "noinclude")
        };
        let (is_dropped, is_kept) = token
            .tag()
            .map_or((false, false), |tag| (tag.is_named(dropped), tag.is_named(kept)));
        if is_dropped {
            match token {
                Token::OpenTag(_) => self.skip_depth += 1,
                Token::EndTag(_) => self.skip_depth = self.skip_depth.saturating_sub(1),
                _ => {}
            }
            return Ok(());
        }
        if !is_kept && self.skip_depth == 0 {
            out.push(token);
        }
        Ok(())
    }

    fn on_end(
        &mut self,
        token: Token,
        _cx: &mut SyncCx<'_>,
        out: &mut Vec<Token>,
    ) -> Result<(), TransformError> {
        if self.skip_depth > 0 {
            log::debug!(target: "wt2html.sync", "unclosed include section at end of input");
            self.skip_depth = 0;
        }
        out.push(token);
        Ok(())
    }

    fn on_any(
        &mut self,
        token: Token,
        _cx: &mut SyncCx<'_>,
        out: &mut Vec<Token>,
    ) -> Result<(), TransformError> {
        if self.skip_depth == 0 {
            out.push(token);
        }
        Ok(())
    }
}
