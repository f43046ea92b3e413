use std::rc::Rc;

use crate::pipeline::{PipelineFactory, PipelineKind, PipelineOptions, PipelineStages};
use crate::shared::ConfigurationError;

use super::{
    ATTRIBUTE_EXPANDER_RANK, AttributeExpander, IncludeFilter, TEMPLATE_RANK, TemplateHandler,
    TemplateSource, TextMerger,
};

/// Standard wiring: include handling in phase one, templates and attribute
/// expansion in phase two, text merging in phase three.
#[derive(Clone)]
pub struct DefaultRecipe {
    templates: Rc<dyn TemplateSource>,
    attribute_rank: f64,
}

impl DefaultRecipe {
    pub fn new(templates: Rc<dyn TemplateSource>) -> Self {
        Self {
            templates,
            attribute_rank: ATTRIBUTE_EXPANDER_RANK,
        }
    }

    pub fn with_attribute_rank(mut self, rank: f64) -> Self {
        self.attribute_rank = rank;
        self
    }
}

impl PipelineFactory for DefaultRecipe {
    fn build(
        &self,
        kind: PipelineKind,
        _options: &PipelineOptions,
    ) -> Result<PipelineStages, ConfigurationError> {
        let mut stages = PipelineStages::empty(kind);
        stages.sync1.add_transformer(IncludeFilter::new());
        TemplateHandler::new(Rc::clone(&self.templates))
            .register(&mut stages.async2, TEMPLATE_RANK)?;
        AttributeExpander::new().register(&mut stages.async2, self.attribute_rank)?;
        if let Some(sync3) = stages.sync3.as_mut() {
            sync3.add_transformer(TextMerger::new());
        }
        Ok(stages)
    }
}
