//! Built-in transforms and the default pipeline recipe.

mod attribute_expander;
mod include_filter;
mod recipe;
mod template;
mod text_merger;

pub use attribute_expander::AttributeExpander;
pub use include_filter::IncludeFilter;
pub use recipe::DefaultRecipe;
pub use template::{TemplateHandler, TemplateSource, template_arg_token, template_token};
pub use text_merger::TextMerger;

/// Rank of the template and argument handler.
pub const TEMPLATE_RANK: f64 = 1.1;
/// Default rank of the attribute expander.
pub const ATTRIBUTE_EXPANDER_RANK: f64 = 1.12;
