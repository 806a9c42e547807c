//! Request / response protocol across tasks.

use std::sync::Arc;
use std::thread;

use espkit::adapters::time::ManualClock;
use espkit::config::KernelConfig;
use espkit::context::Context;
use espkit::error::Error;
use espkit::events::{Reply, Request, ResponseInbox, verbs};
use serde_json::{Value, json};

use crate::mock_hw::{Fan, Scanner};

fn ctx() -> Context {
    Context::new(Arc::new(ManualClock::new(0)), KernelConfig::default())
}

fn scan(ctx: &Context, seq: i32, reply: &Reply) {
    let data = json!({"timeout": 5});
    Request::new("scan", seq, Some("scanner"), &data, reply).publish(ctx.bus());
}

#[test]
fn async_answer_arrives_through_the_inbox() {
    let ctx = ctx();
    let scanner = Scanner::new(&ctx);
    let inbox = ResponseInbox::new(ctx.bus(), "ws");

    let reply = Reply::with_transport("ws", 7);
    scan(&ctx, 42, &reply);
    assert!(reply.is_empty(), "taken over, not answered inline");
    assert!(scanner.pending.is_pending());

    let worker = {
        let scanner = Arc::clone(&scanner);
        let bus = ctx.bus().clone();
        thread::spawn(move || {
            scanner.report(&bus, 1);
            scanner.report(&bus, 2);
            scanner.finish(&bus, Ok(json!(["aa:bb"])));
        })
    };

    let first = inbox.recv_blocking();
    assert!(first.is_partial());
    assert!(first.matches("ws", "scan", 42));
    assert_eq!(first.client(), 7);
    assert_eq!(first.data(), Some(&json!({"found": 1})));
    assert!(inbox.recv_blocking().is_partial());
    let last = inbox.recv_blocking();
    worker.join().unwrap();

    assert!(!last.is_partial());
    assert_eq!(last.data(), Some(&json!(["aa:bb"])));
    assert_eq!(last.source(), Some("scanner"));
    assert!(!scanner.pending.is_pending());
}

#[test]
fn second_request_while_pending_is_invalid_state() {
    let ctx = ctx();
    let scanner = Scanner::new(&ctx);

    let first = Reply::with_transport("ws", 1);
    scan(&ctx, 1, &first);
    let second = Reply::with_transport("ws", 2);
    scan(&ctx, 2, &second);

    let answer = second.first().unwrap();
    assert!(answer.error);
    assert_eq!(answer.data[0], "invalid-state");
    assert!(scanner.finish(ctx.bus(), Ok(Value::Null)));
}

#[test]
fn transport_without_inbox_cannot_go_async() {
    let ctx = ctx();
    let scanner = Scanner::new(&ctx);
    let reply = Reply::new();
    scan(&ctx, 1, &reply);

    let answer = reply.first().unwrap();
    assert!(answer.error);
    assert_eq!(answer.data[0], "unsupported");
    assert!(!scanner.pending.is_pending());
}

#[test]
fn cancel_reaches_the_worker() {
    let ctx = ctx();
    let scanner = Scanner::new(&ctx);
    let inbox = ResponseInbox::new(ctx.bus(), "ws");
    scan(&ctx, 3, &Reply::with_transport("ws", 1));

    let reply = Reply::new();
    Request::new(verbs::CANCEL, 4, Some("scanner"), &Value::Null, &reply).publish(ctx.bus());
    assert!(!reply.first().unwrap().error);
    assert!(scanner.pending.is_cancelled());

    scanner.finish(ctx.bus(), Err(Error::Invalid("cancelled")));
    let resp = inbox.try_recv().unwrap();
    assert!(resp.is_error());
    assert!(!scanner.pending.is_cancelled());

    // Nothing left to cancel.
    let reply = Reply::new();
    Request::new(verbs::CANCEL, 5, Some("scanner"), &Value::Null, &reply).publish(ctx.bus());
    assert!(reply.first().unwrap().error);
}

#[test]
fn broadcast_get_collects_every_component() {
    let ctx = ctx();
    let _fan = Fan::new(&ctx);
    let _scanner = Scanner::new(&ctx);

    let reply = Reply::new();
    Request::new(verbs::STATE_GET, 1, None, &Value::Null, &reply).publish(ctx.bus());
    let answers = reply.answers();
    // The scanner has no state and stays silent.
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].source.as_deref(), Some("fan"));
    assert_eq!(answers[0].data, json!({"running": false}));
}

#[test]
fn unknown_target_is_unhandled() {
    let ctx = ctx();
    let _fan = Fan::new(&ctx);
    let reply = Reply::new();
    Request::new(verbs::STATE_GET, 1, Some("pump"), &Value::Null, &reply).publish(ctx.bus());
    let answer = reply.first().unwrap();
    assert!(answer.error);
    assert_eq!(answer.data[0], "unhandled");
}
