//! Attribute expansion.

use std::cell::RefCell;
use std::rc::Rc;

use crate::frame::{ExpandOptions, Expansion, ExpansionHost, ExpansionWaiter, Frame};
use crate::scheduler::Scheduler;
use crate::shared::{KeyValue, Token, is_literal_tokens, strip_eof};

/// How an attribute list came back from [`AttributeTransformManager::process`].
#[derive(Debug, PartialEq)]
pub enum AttributeExpansion {
    /// Nothing had to wait; here is the rebuilt list.
    Sync(Vec<KeyValue>),
    /// At least one expansion is queued; the completion callback gets the
    /// rebuilt list once all of them resolved.
    Async,
}

type DoneCallback = Box<dyn FnOnce(&mut Scheduler, Vec<KeyValue>)>;

#[derive(Clone, Copy)]
enum Side {
    Key,
    Value,
}

/// Join state shared by the expansion callbacks of one `process` call.
struct AttributeJoin {
    attrs: Vec<KeyValue>,
    keys: Vec<Option<Vec<Token>>>,
    values: Vec<Option<Vec<Token>>>,
    outstanding: usize,
    on_done: Option<DoneCallback>,
}

impl AttributeJoin {
    fn record(&mut self, index: usize, side: Side, tokens: Vec<Token>) {
        let slot = match side {
            Side::Key => &mut self.keys[index],
            Side::Value => &mut self.values[index],
        };
        *slot = Some(strip_eof(tokens));
    }

    /// Original list with every expanded side substituted, order preserved.
    fn rebuild(&mut self) -> Vec<KeyValue> {
        let attrs = std::mem::take(&mut self.attrs);
        attrs
            .into_iter()
            .enumerate()
            .map(|(i, kv)| KeyValue {
                k: self.keys[i].take().unwrap_or(kv.k),
                v: self.values[i].take().unwrap_or(kv.v),
                src: kv.src,
            })
            .collect()
    }
}

/// Expands attribute keys and values that contain more than literal text.
pub struct AttributeTransformManager {
    frame: Rc<Frame>,
    options: ExpandOptions,
}

impl AttributeTransformManager {
    pub fn new(frame: Rc<Frame>, options: ExpandOptions) -> Self {
        Self { frame, options }
    }

    pub fn process(
        &self,
        host: &mut dyn ExpansionHost,
        attrs: Vec<KeyValue>,
        on_done: impl FnOnce(&mut Scheduler, Vec<KeyValue>) + 'static,
    ) -> AttributeExpansion {
        if attrs.iter().all(KeyValue::is_literal) {
            return AttributeExpansion::Sync(attrs);
        }

        let len = attrs.len();
        let mut work = Vec::new();
        for (index, kv) in attrs.iter().enumerate() {
            if !is_literal_tokens(&kv.v) {
                work.push((index, Side::Value, kv.v.clone()));
            }
            if !is_literal_tokens(&kv.k) {
                work.push((index, Side::Key, kv.k.clone()));
            }
        }

        let join = Rc::new(RefCell::new(AttributeJoin {
            attrs,
            keys: vec![None; len],
            values: vec![None; len],
            outstanding: 0,
            on_done: Some(Box::new(on_done)),
        }));

        for (index, side, tokens) in work {
            let waiter_join = Rc::clone(&join);
            let waiter = ExpansionWaiter::Callback(Box::new(
                move |scheduler: &mut Scheduler, tokens: Vec<Token>| {
                    let finished = {
                        let mut join = waiter_join.borrow_mut();
                        join.record(index, side, tokens);
                        join.outstanding -= 1;
                        if join.outstanding == 0 {
                            let attrs = join.rebuild();
                            join.on_done.take().map(|done| (done, attrs))
                        } else {
                            None
                        }
                    };
                    if let Some((done, attrs)) = finished {
                        done(scheduler, attrs);
                    }
                },
            ));
            match self.frame.expand(host, tokens, self.options.clone(), waiter) {
                Expansion::Ready(tokens) => join.borrow_mut().record(index, side, tokens),
                Expansion::Pending(id) => {
                    log::trace!(
                        target: "wt2html.frame",
                        "attribute {index} waits on expansion {id:?}"
                    );
                    join.borrow_mut().outstanding += 1;
                }
            }
        }

        let mut join = join.borrow_mut();
        if join.outstanding == 0 {
            AttributeExpansion::Sync(join.rebuild())
        } else {
            AttributeExpansion::Async
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::frame::ExpansionRequest;
    use crate::scheduler::ExpansionId;

    #[derive(Default)]
    struct RecordingHost {
        requests: Vec<ExpansionRequest>,
    }

    impl ExpansionHost for RecordingHost {
        fn request_expansion(&mut self, request: ExpansionRequest) -> ExpansionId {
            self.requests.push(request);
            ExpansionId(self.requests.len() as u64 - 1)
        }
    }

    fn templated(name: &str) -> Vec<Token> {
        vec![Token::text("x"), Token::self_closing(name)]
    }

    fn complete(request: ExpansionRequest, scheduler: &mut Scheduler, tokens: Vec<Token>) {
        match request.waiter {
            ExpansionWaiter::Callback(callback) => callback(scheduler, tokens),
            ExpansionWaiter::Resolve(_) => panic!("attribute expansion uses callbacks"),
        }
    }

    #[test]
    fn literal_attributes_take_fast_path() {
        let manager = AttributeTransformManager::new(Frame::root(None), ExpandOptions::default());
        let mut host = RecordingHost::default();
        let attrs = vec![KeyValue::literal("href", "x"), KeyValue::literal("class", "")];
        let result = manager.process(&mut host, attrs.clone(), |_, _| panic!("no callback"));
        assert_eq!(result, AttributeExpansion::Sync(attrs));
        assert!(host.requests.is_empty());
    }

    #[test]
    fn expanded_parts_are_substituted_in_place() {
        let manager = AttributeTransformManager::new(Frame::root(None), ExpandOptions::default());
        let mut host = RecordingHost::default();
        let attrs = vec![
            KeyValue::literal("id", "a"),
            KeyValue::new(vec![Token::text("href")], templated("link")),
            KeyValue::new(templated("key"), templated("value")),
        ];
        let done = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&done);
        let result = manager.process(&mut host, attrs, move |_, attrs| {
            *sink.borrow_mut() = Some(attrs);
        });
        assert_eq!(result, AttributeExpansion::Async);
        assert_eq!(host.requests.len(), 3);

        let mut scheduler = Scheduler::new();
        let mut requests = host.requests.into_iter();
        let href = requests.next().unwrap();
        let value = requests.next().unwrap();
        let key = requests.next().unwrap();

        // Completion order differs from request order.
        complete(key, &mut scheduler, vec![Token::text("k2"), Token::EndOfInput]);
        complete(value, &mut scheduler, vec![Token::text("v2")]);
        assert!(done.borrow().is_none());
        complete(href, &mut scheduler, vec![Token::text("/wiki/x"), Token::EndOfInput]);

        let attrs = done.borrow_mut().take().unwrap();
        assert_eq!(attrs[0], KeyValue::literal("id", "a"));
        assert_eq!(attrs[1], KeyValue::literal("href", "/wiki/x"));
        assert_eq!(attrs[2], KeyValue::literal("k2", "v2"));
    }
}
