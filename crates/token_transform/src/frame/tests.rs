use super::*;
use crate::scheduler::PipelineId;

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

fn continuation() -> ExpansionWaiter {
    ExpansionWaiter::Resolve(Continuation {
        pipeline: PipelineId(0),
        slot: 0,
    })
}

#[test]
fn depth_follows_parent_chain() {
    let root = Frame::root(Some("Main".into()));
    let a = root.new_child("A", vec![]);
    let b = a.new_child("B", vec![]);
    assert_eq!(root.depth(), 0);
    assert_eq!(b.depth(), 2);
    let titles: Vec<_> = b.ancestors().filter_map(Frame::title).collect();
    assert_eq!(titles, vec!["B", "A", "Main"]);
}

#[test]
fn loop_detected_on_any_ancestor() {
    let root = Frame::root(None);
    let a = root.new_child("A", vec![]);
    let b = a.new_child("B", vec![]);
    assert_eq!(
        b.loop_and_depth_check("A", 40, false),
        Err(ExpansionError::LoopDetected { title: "A".into() })
    );
    assert!(b.loop_and_depth_check("B", 40, false).is_err());
    assert_eq!(b.loop_and_depth_check("C", 40, false), Ok(()));
    assert_eq!(b.loop_and_depth_check("A", 40, true), Ok(()));
}

#[test]
fn depth_limit_is_exclusive() {
    let mut frame = Frame::root(None);
    for i in 0..3 {
        frame = frame.new_child(format!("T{i}"), vec![]);
    }
    assert_eq!(frame.loop_and_depth_check("X", 3, false), Ok(()));
    assert!(matches!(
        frame.loop_and_depth_check("X", 2, true),
        Err(ExpansionError::DepthExceeded {
            depth: 3,
            max_depth: 2,
            ..
        })
    ));
}

#[test]
fn named_and_positional_args() {
    let frame = Frame::root(None).new_child(
        "T",
        vec![
            KeyValue::new(vec![], vec![Token::text("one")]),
            KeyValue::literal("name", "first"),
            KeyValue::new(vec![], vec![Token::text("two")]),
            KeyValue::literal("name", "second"),
        ],
    );
    assert_eq!(frame.arg("1"), Some(&[Token::text("one")][..]));
    assert_eq!(frame.arg("2"), Some(&[Token::text("two")][..]));
    assert_eq!(frame.arg("name"), Some(&[Token::text("second")][..]));
    assert_eq!(frame.arg("3"), None);
}

#[test]
fn trivial_content_expands_immediately() {
    let frame = Frame::root(None);
    let mut host = RecordingHost::default();

    let ready = frame.expand(&mut host, vec![], ExpandOptions::default(), continuation());
    assert!(matches!(ready, Expansion::Ready(ref t) if t.is_empty()));

    let ready = frame.expand(
        &mut host,
        vec![Token::text("plain")],
        ExpandOptions::default(),
        continuation(),
    );
    assert!(matches!(ready, Expansion::Ready(ref t) if t == &vec![Token::text("plain")]));
    assert!(host.requests.is_empty());
}

#[test]
fn expansion_appends_eof_and_reuses_frame() {
    let frame = Frame::root(None);
    let mut host = RecordingHost::default();
    let content = vec![Token::text("a"), Token::self_closing("template")];

    let pending = frame.expand(&mut host, content, ExpandOptions::default(), continuation());
    assert!(matches!(pending, Expansion::Pending(ExpansionId(0))));

    let request = &host.requests[0];
    assert!(Rc::ptr_eq(&request.frame, &frame));
    assert_eq!(request.content.last(), Some(&Token::EndOfInput));
    assert_eq!(request.content.len(), 3);
}

#[test]
fn template_binding_creates_child_frame() {
    let frame = Frame::root(None);
    let mut host = RecordingHost::default();
    let options = ExpandOptions {
        template: Some(TemplateBinding {
            title: "Greeting".into(),
            args: vec![KeyValue::literal("who", "world")],
        }),
        in_template: true,
        ..ExpandOptions::default()
    };
    frame.expand(
        &mut host,
        vec![Token::text("hi "), Token::EndOfInput],
        options,
        continuation(),
    );

    let request = &host.requests[0];
    assert_eq!(request.frame.title(), Some("Greeting"));
    assert_eq!(request.frame.depth(), 1);
    assert_eq!(request.frame.arg("who"), Some(&[Token::text("world")][..]));
    assert_eq!(request.content.len(), 2, "existing end-of-input is kept");
}
