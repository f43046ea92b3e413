use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::frame::{ExpandOptions, Expansion, ExpansionWaiter, Frame, TemplateBinding};
use crate::pipeline::PipelineKind;
use crate::shared::{ConfigurationError, KeyValue, Tag, Token, TransformError};
use crate::transform::{
    AsyncTransform, AsyncTransformManager, TransformCx, TransformKind, TransformOutcome,
};

/// Where template bodies come from.
pub trait TemplateSource {
    /// Body tokens of `title`, or `None` when no such template exists.
    fn fetch(&self, title: &str) -> Option<Vec<Token>>;
}

impl TemplateSource for HashMap<String, Vec<Token>> {
    fn fetch(&self, title: &str) -> Option<Vec<Token>> {
        self.get(title).cloned()
    }
}

impl TemplateSource for BTreeMap<String, Vec<Token>> {
    fn fetch(&self, title: &str) -> Option<Vec<Token>> {
        self.get(title).cloned()
    }
}

/// `{{title|args}}`: a self-closing `template` tag whose first attribute
/// key is the title and whose remaining attributes are the arguments.
pub fn template_token(title: &str, args: Vec<KeyValue>) -> Token {
    let mut attrs = Vec::with_capacity(args.len() + 1);
    attrs.push(KeyValue::literal(title, ""));
    attrs.extend(args);
    Token::SelfClosingTag(Tag::new("template").with_attrs(attrs))
}

/// `{{{name|default}}}`.
pub fn template_arg_token(name: &str, default: Option<Vec<Token>>) -> Token {
    let mut attrs = vec![KeyValue::literal(name, "")];
    if let Some(default) = default {
        attrs.push(KeyValue::new(Vec::new(), default));
    }
    Token::SelfClosingTag(Tag::new("templatearg").with_attrs(attrs))
}

/// Expands `template` and `templatearg` tags.
///
/// Template bodies run in a child frame bound to the call's arguments.
/// Argument values are expanded in the calling frame, where they were
/// written; defaults in the template's own frame.
pub struct TemplateHandler {
    source: Rc<dyn TemplateSource>,
}

impl TemplateHandler {
    pub fn new(source: Rc<dyn TemplateSource>) -> Self {
        Self { source }
    }

    /// Registers one shared handler for both tag names.
    pub fn register(
        self,
        manager: &mut AsyncTransformManager,
        rank: f64,
    ) -> Result<(), ConfigurationError> {
        let handler: Rc<dyn AsyncTransform> = Rc::new(self);
        manager.register_transform(
            Rc::clone(&handler),
            "TemplateHandler",
            rank,
            TransformKind::Tag,
            Some("template"),
        )?;
        manager.register_transform(
            handler,
            "TemplateHandler:arg",
            rank,
            TransformKind::Tag,
            Some("templatearg"),
        )
    }

    fn on_template(&self, token: &Token, tag: &Tag, cx: &mut TransformCx<'_>) -> TransformOutcome {
        let Some(title) = tag.attrs.first().and_then(KeyValue::key_text) else {
            return TransformOutcome::Done(vec![Token::text("{{}}")]);
        };
        let title = title.trim().to_string();
        if !cx.options().expand_templates {
            return TransformOutcome::Done(vec![token.clone()]);
        }

        let max_depth = cx.config().max_depth;
        if let Err(err) = cx.frame().loop_and_depth_check(&title, max_depth, false) {
            cx.report_expansion(&err);
            return TransformOutcome::Done(err.marker());
        }

        let Some(body) = self.source.fetch(&title) else {
            log::debug!(target: "wt2html.frame", "missing template {title}");
            return TransformOutcome::Done(missing_template_marker(&title));
        };

        let options = ExpandOptions {
            kind: PipelineKind::Expanded,
            expand_templates: true,
            in_template: true,
            template: Some(TemplateBinding {
                title,
                args: tag.attrs[1..].to_vec(),
            }),
        };
        let frame = Rc::clone(cx.frame());
        expand_deferred(&frame, body, options, cx)
    }

    fn on_template_arg(&self, tag: &Tag, cx: &mut TransformCx<'_>) -> TransformOutcome {
        let Some(name) = tag.attrs.first().and_then(KeyValue::key_text) else {
            return TransformOutcome::Done(vec![Token::text("{{{}}}")]);
        };
        let name = name.trim();
        let options = ExpandOptions {
            expand_templates: cx.options().expand_templates,
            in_template: true,
            ..ExpandOptions::default()
        };

        let frame = Rc::clone(cx.frame());
        if let Some(value) = frame.arg(name) {
            let caller = frame.parent().cloned().unwrap_or_else(|| Rc::clone(&frame));
            return expand_deferred(&caller, value.to_vec(), options, cx);
        }
        if let Some(default) = tag.attrs.get(1) {
            return expand_deferred(&frame, default.v.clone(), options, cx);
        }
        TransformOutcome::Done(vec![Token::Text(format!("{{{{{{{name}}}}}}}"))])
    }
}

impl AsyncTransform for TemplateHandler {
    fn transform(
        &self,
        token: &Token,
        cx: &mut TransformCx<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        let Some(tag) = token.tag() else {
            return Ok(TransformOutcome::Unchanged);
        };
        Ok(if tag.is_named("template") {
            self.on_template(token, tag, cx)
        } else if tag.is_named("templatearg") {
            self.on_template_arg(tag, cx)
        } else {
            TransformOutcome::Unchanged
        })
    }
}

/// Trivial content is returned as is; anything else becomes a deferral
/// resolved by the expansion.
fn expand_deferred(
    frame: &Rc<Frame>,
    tokens: Vec<Token>,
    options: ExpandOptions,
    cx: &mut TransformCx<'_>,
) -> TransformOutcome {
    if Frame::is_trivial(&tokens) {
        return TransformOutcome::Done(tokens);
    }
    let continuation = cx.defer();
    match frame.expand(cx, tokens, options, ExpansionWaiter::Resolve(continuation)) {
        Expansion::Ready(tokens) => TransformOutcome::Done(tokens),
        Expansion::Pending(_) => TransformOutcome::Deferred {
            tokens: Vec::new(),
            continuation,
        },
    }
}

/// Red link standing in for a template that does not exist.
fn missing_template_marker(title: &str) -> Vec<Token> {
    let href = format!("./Template:{}", title.replace(' ', "_"));
    let open = Tag::new("a").with_attrs(vec![
        KeyValue::literal("href", &href),
        KeyValue::literal("class", "new"),
        KeyValue::literal("typeof", "mw:Transclusion"),
    ]);
    vec![
        Token::OpenTag(open),
        Token::Text(format!("Template:{title}")),
        Token::close("a"),
    ]
}
