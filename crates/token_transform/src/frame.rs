//! Lexical scope for recursive expansion.
//!
//! A frame is created per template invocation. It carries the template's
//! title, its argument bindings and a shared reference to the calling frame,
//! which is all loop and depth detection needs.

use std::fmt;
use std::rc::Rc;

use crate::pipeline::PipelineKind;
use crate::scheduler::{Continuation, ExpansionId, Scheduler};
use crate::shared::{ExpansionError, KeyValue, Token};

/// Argument bindings of a frame, in call order.
///
/// Attributes with an empty key are positional and numbered from 1.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params(Vec<KeyValue>);

impl Params {
    pub fn new(args: Vec<KeyValue>) -> Self {
        Self(args)
    }

    /// Value tokens bound to `name`; the last binding wins.
    pub fn get(&self, name: &str) -> Option<&[Token]> {
        let name = name.trim();
        let mut position = 0usize;
        let mut found = None;
        for kv in &self.0 {
            if kv.k.is_empty() {
                position += 1;
                if name.parse::<usize>().is_ok_and(|n| n == position) {
                    found = Some(kv.v.as_slice());
                }
            } else if kv.key_text().is_some_and(|k| k.trim() == name) {
                found = Some(kv.v.as_slice());
            }
        }
        found
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug)]
pub struct Frame {
    title: Option<String>,
    args: Params,
    parent: Option<Rc<Frame>>,
    depth: usize,
}

impl Frame {
    /// Top-level frame of a document.
    pub fn root(title: Option<String>) -> Rc<Frame> {
        Rc::new(Frame {
            title,
            args: Params::default(),
            parent: None,
            depth: 0,
        })
    }

    pub fn new_child(self: &Rc<Self>, title: impl Into<String>, args: Vec<KeyValue>) -> Rc<Frame> {
        Rc::new(Frame {
            title: Some(title.into()),
            args: Params::new(args),
            parent: Some(Rc::clone(self)),
            depth: self.depth + 1,
        })
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn parent(&self) -> Option<&Rc<Frame>> {
        self.parent.as_ref()
    }

    pub fn args(&self) -> &Params {
        &self.args
    }

    pub fn arg(&self, name: &str) -> Option<&[Token]> {
        self.args.get(name)
    }

    /// This frame followed by its ancestors, innermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = &Frame> {
        std::iter::successors(Some(self), |frame| frame.parent.as_deref())
    }

    /// Fails when this frame is already too deep to expand further, or when
    /// `title` is being expanded by this frame or one of its ancestors.
    pub fn loop_and_depth_check(
        &self,
        title: &str,
        max_depth: usize,
        ignore_loop: bool,
    ) -> Result<(), ExpansionError> {
        if self.depth > max_depth {
            return Err(ExpansionError::DepthExceeded {
                title: title.to_string(),
                depth: self.depth,
                max_depth,
            });
        }
        if ignore_loop {
            return Ok(());
        }
        if self.ancestors().any(|frame| frame.title() == Some(title)) {
            return Err(ExpansionError::LoopDetected {
                title: title.to_string(),
            });
        }
        Ok(())
    }

    /// Content that needs no sub-pipeline: nothing, or one text token.
    pub fn is_trivial(chunk: &[Token]) -> bool {
        matches!(chunk, [] | [Token::Text(_)])
    }

    /// Expands `chunk` in this frame, or in a child frame when
    /// `options.template` binds arguments.
    ///
    /// Trivial content comes back as [`Expansion::Ready`] and `waiter` is
    /// dropped unused. Otherwise a sub-pipeline is queued and `waiter` is
    /// invoked exactly once with every content token it produced, with
    /// end-of-input markers removed.
    pub fn expand(
        self: &Rc<Self>,
        host: &mut dyn ExpansionHost,
        mut chunk: Vec<Token>,
        options: ExpandOptions,
        waiter: ExpansionWaiter,
    ) -> Expansion {
        if Frame::is_trivial(&chunk) {
            log::trace!(target: "wt2html.frame", "expand fast path tokens={}", chunk.len());
            return Expansion::Ready(chunk);
        }
        if !chunk.last().is_some_and(Token::is_eof) {
            chunk.push(Token::EndOfInput);
        }
        let frame = match &options.template {
            Some(binding) => self.new_child(binding.title.clone(), binding.args.clone()),
            None => Rc::clone(self),
        };
        Expansion::Pending(host.request_expansion(ExpansionRequest {
            frame,
            content: chunk,
            options,
            waiter,
        }))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateBinding {
    pub title: String,
    pub args: Vec<KeyValue>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Output kind of the sub-pipeline.
    pub kind: PipelineKind,
    pub expand_templates: bool,
    pub in_template: bool,
    /// Run in a child frame bound to these arguments.
    pub template: Option<TemplateBinding>,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            kind: PipelineKind::Expanded,
            expand_templates: true,
            in_template: false,
            template: None,
        }
    }
}

pub type ExpansionCallback = Box<dyn FnOnce(&mut Scheduler, Vec<Token>)>;

/// Who receives the tokens of a finished expansion.
pub enum ExpansionWaiter {
    /// Resolve a transform's continuation with the tokens, as one final
    /// chunk.
    Resolve(Continuation),
    Callback(ExpansionCallback),
}

impl fmt::Debug for ExpansionWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpansionWaiter::Resolve(continuation) => {
                f.debug_tuple("Resolve").field(continuation).finish()
            }
            ExpansionWaiter::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

#[derive(Debug)]
pub enum Expansion {
    Ready(Vec<Token>),
    Pending(ExpansionId),
}

#[derive(Debug)]
pub struct ExpansionRequest {
    pub frame: Rc<Frame>,
    pub content: Vec<Token>,
    pub options: ExpandOptions,
    pub waiter: ExpansionWaiter,
}

/// Accepts sub-pipeline requests on behalf of the runtime.
pub trait ExpansionHost {
    fn request_expansion(&mut self, request: ExpansionRequest) -> ExpansionId;
}

#[cfg(test)]
mod tests;
