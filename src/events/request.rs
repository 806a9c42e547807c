//! Requests: named operations published on the bus.
//!
//! A request is addressed to one component (`target`) or to all of them
//! (`target = None`). Whoever handles it answers through the request's
//! [`Responder`], which belongs to the issuing transport. A handler that
//! cannot answer inline promotes the request to a [`Response`] with
//! [`Request::make_response`] and publishes it later from another task.

use core::cell::{Cell, RefCell};

use log::debug;
use serde_json::Value;

use super::{Event, EventBus, Response};
use crate::error::Error;
use crate::json;

/// Answer path of a request, provided by the transport that issued it.
pub trait Responder {
    /// Deliver an inline answer.
    fn respond(&self, request: &Request<'_>, source: Option<&str>, data: &Value, error: bool);

    /// Identity for an asynchronous answer. Transports that are not
    /// subscribed for responses keep the default and cannot go async.
    fn make_response(&self, _request: &Request<'_>) -> Option<Response> {
        None
    }
}

pub struct Request<'a> {
    name: &'a str,
    seq: i32,
    target: Option<&'a str>,
    data: &'a Value,
    origin: Option<&'a str>,
    handled: Cell<bool>,
    responder: &'a dyn Responder,
}

impl<'a> Request<'a> {
    pub fn new(
        name: &'a str,
        seq: i32,
        target: Option<&'a str>,
        data: &'a Value,
        responder: &'a dyn Responder,
    ) -> Self {
        Self {
            name,
            seq,
            target,
            data,
            origin: None,
            handled: Cell::new(false),
            responder,
        }
    }

    /// Tag the request with the remote peer it came from.
    #[must_use]
    pub fn with_origin(mut self, origin: &'a str) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn seq(&self) -> i32 {
        self.seq
    }

    pub fn target(&self) -> Option<&'a str> {
        self.target
    }

    pub fn data(&self) -> &'a Value {
        self.data
    }

    pub fn origin(&self) -> Option<&'a str> {
        self.origin
    }

    /// Issued by the firmware itself rather than a remote peer.
    pub fn is_internal(&self) -> bool {
        self.origin.is_none()
    }

    pub fn is_broadcast(&self) -> bool {
        self.target.is_none()
    }

    /// Whether someone answered or took the request over.
    pub fn is_responded(&self) -> bool {
        self.handled.get()
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Addressed to `target`, or to everyone.
    pub fn is_for(&self, target: &str) -> bool {
        self.target.is_none_or(|t| t == target)
    }

    /// Answer inline. A single-key `{"error": …}` object is an error answer.
    pub fn respond(&self, source: Option<&str>, data: &Value) {
        let error = json::is_error_object(data);
        self.answer(source, data, error);
    }

    pub fn respond_data(&self, source: Option<&str>, data: &Value) {
        self.answer(source, data, false);
    }

    pub fn respond_error(&self, source: Option<&str>, error: &Error) {
        self.answer(source, &error.to_value(), true);
    }

    /// Answer with an empty success.
    pub fn respond_ok(&self, source: Option<&str>) {
        self.answer(source, &Value::Null, false);
    }

    /// Promote to an asynchronous response. Marks the request handled even
    /// when the transport cannot go async.
    pub fn make_response(&self) -> Option<Response> {
        self.handled.set(true);
        self.responder.make_response(self)
    }

    /// Publish on `bus`. Unanswered requests are answered with
    /// [`Error::Unhandled`] once every subscriber has seen them.
    pub fn publish(&self, bus: &EventBus) {
        bus.publish(&Event::Request(self));
        if !self.handled.get() {
            debug!("request '{}' ({:?}) unhandled", self.name, self.target);
            self.respond_error(None, &Error::Unhandled);
        }
    }

    fn answer(&self, source: Option<&str>, data: &Value, error: bool) {
        self.handled.set(true);
        self.responder
            .respond(self, source.or(self.target), data, error);
    }
}

impl core::fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Request")
            .field("name", &self.name)
            .field("seq", &self.seq)
            .field("target", &self.target)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

// ── Inline capture ────────────────────────────────────────────

/// One inline answer captured by [`Reply`].
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub source: Option<String>,
    pub data: Value,
    pub error: bool,
}

/// Responder that keeps inline answers for the caller to read after
/// `publish()` returns. Give it a transport name to allow async answers.
#[derive(Debug, Default)]
pub struct Reply {
    transport: Option<String>,
    client: u32,
    answers: RefCell<Vec<Answer>>,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply for a transport that also listens for asynchronous responses.
    pub fn with_transport(transport: &str, client: u32) -> Self {
        Self {
            transport: Some(transport.to_owned()),
            client,
            answers: RefCell::default(),
        }
    }

    pub fn answers(&self) -> Vec<Answer> {
        self.answers.borrow().clone()
    }

    /// First answer, if any.
    pub fn first(&self) -> Option<Answer> {
        self.answers.borrow().first().cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.borrow().is_empty()
    }
}

impl Responder for Reply {
    fn respond(&self, _request: &Request<'_>, source: Option<&str>, data: &Value, error: bool) {
        self.answers.borrow_mut().push(Answer {
            source: source.map(str::to_owned),
            data: data.clone(),
            error,
        });
    }

    fn make_response(&self, request: &Request<'_>) -> Option<Response> {
        let transport = self.transport.as_deref()?;
        Some(Response::new(transport, request).with_client(self.client))
    }
}
