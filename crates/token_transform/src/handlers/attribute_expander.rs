use std::rc::Rc;

use crate::frame::ExpandOptions;
use crate::shared::{Chunk, ConfigurationError, KeyValue, Token, TransformError};
use crate::transform::{
    AsyncTransform, AsyncTransformManager, AttributeExpansion, AttributeTransformManager,
    TransformCx, TransformKind, TransformOutcome,
};

/// Expands templated attribute keys and values of tag tokens.
///
/// The rewritten tag comes back stamped with this handler's rank, so
/// handlers ranked above it still see the tag while this one does not.
#[derive(Debug, Default)]
pub struct AttributeExpander;

impl AttributeExpander {
    pub fn new() -> Self {
        Self
    }

    pub fn register(
        self,
        manager: &mut AsyncTransformManager,
        rank: f64,
    ) -> Result<(), ConfigurationError> {
        manager.register_transform(
            Rc::new(self),
            "AttributeExpander",
            rank,
            TransformKind::Any,
            None,
        )
    }
}

impl AsyncTransform for AttributeExpander {
    fn transform(
        &self,
        token: &Token,
        cx: &mut TransformCx<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        let Some(tag) = token.tag() else {
            return Ok(TransformOutcome::Unchanged);
        };
        // Template arguments belong to the template handler.
        if tag.is_named("template")
            || tag.is_named("templatearg")
            || tag.attrs.iter().all(KeyValue::is_literal)
        {
            return Ok(TransformOutcome::Unchanged);
        }

        let manager = AttributeTransformManager::new(
            Rc::clone(cx.frame()),
            ExpandOptions {
                expand_templates: cx.options().expand_templates,
                in_template: cx.options().in_template,
                ..ExpandOptions::default()
            },
        );
        let continuation = cx.defer();
        let rank = cx.rank();
        let pending = token.clone();
        let result = manager.process(cx, tag.attrs.clone(), move |scheduler, attrs| {
            let token = pending.with_attrs(attrs);
            scheduler.resolve(continuation, Chunk::ranked(vec![token], rank));
        });
        Ok(match result {
            AttributeExpansion::Sync(attrs) => {
                TransformOutcome::Partial(vec![token.clone().with_attrs(attrs)])
            }
            AttributeExpansion::Async => TransformOutcome::Deferred {
                tokens: Vec::new(),
                continuation,
            },
        })
    }
}
