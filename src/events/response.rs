//! Asynchronous answers and the transport-side inbox that collects them.

use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;
use serde_json::Value;

use super::{Event, EventBus, Request, Subscription};
use crate::error::Error;

/// Responses a transport inbox buffers before dropping new ones.
pub const INBOX_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Data(Value),
    Error(Value),
}

/// Completion of a request whose handler answered from another task.
///
/// Owned by whoever finishes the work. `complete` consumes it, so a
/// response cannot be finished twice.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    transport: String,
    name: String,
    source: Option<String>,
    seq: i32,
    client: u32,
    outcome: Outcome,
    partial: bool,
}

impl Response {
    pub fn new(transport: &str, request: &Request<'_>) -> Self {
        Self {
            transport: transport.to_owned(),
            name: request.name().to_owned(),
            source: request.target().map(str::to_owned),
            seq: request.seq(),
            client: 0,
            outcome: Outcome::Data(Value::Null),
            partial: false,
        }
    }

    /// Connection id within the transport (websocket client, BLE peer).
    #[must_use]
    pub fn with_client(mut self, client: u32) -> Self {
        self.client = client;
        self
    }

    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn seq(&self) -> i32 {
        self.seq
    }

    pub fn client(&self) -> u32 {
        self.client
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn data(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Data(v) => Some(v),
            Outcome::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn set_data(&mut self, data: Value) {
        self.outcome = Outcome::Data(data);
    }

    pub fn set_error(&mut self, error: &Error) {
        self.outcome = Outcome::Error(error.to_value());
    }

    pub fn set_partial(&mut self, partial: bool) {
        self.partial = partial;
    }

    /// Correlation check used by transports.
    pub fn matches(&self, transport: &str, name: &str, seq: i32) -> bool {
        self.transport == transport && self.name == name && self.seq == seq
    }

    pub fn publish(&self, bus: &EventBus) {
        bus.publish(&Event::Response(self));
    }

    /// Publish an intermediate result; the response stays pending.
    pub fn progress(&mut self, bus: &EventBus, data: Value) {
        self.partial = true;
        self.outcome = Outcome::Data(data);
        self.publish(bus);
    }

    /// Publish the final result and give the response up.
    pub fn complete(mut self, bus: &EventBus, result: Result<Value, Error>) {
        self.partial = false;
        self.outcome = match result {
            Ok(data) => Outcome::Data(data),
            Err(e) => Outcome::Error(e.to_value()),
        };
        self.publish(bus);
    }
}

// ── Transport inbox ───────────────────────────────────────────

type InboxChannel = Channel<CriticalSectionRawMutex, Response, INBOX_DEPTH>;

/// Queue of the responses addressed to one transport.
///
/// The bus delivers responses on the worker's task; the inbox hands them
/// over to the transport's own task.
pub struct ResponseInbox {
    channel: Arc<InboxChannel>,
    _subscription: Subscription,
}

impl ResponseInbox {
    pub fn new(bus: &EventBus, transport: &str) -> Self {
        let channel: Arc<InboxChannel> = Arc::new(Channel::new());
        let tx = Arc::clone(&channel);
        let transport = transport.to_owned();
        let subscription = bus.subscribe(move |ev| {
            if let Event::Response(resp) = ev {
                if resp.transport() != transport {
                    return;
                }
                if tx.try_send((*resp).clone()).is_err() {
                    warn!(
                        "{}: inbox full, dropping response '{}' seq {}",
                        transport,
                        resp.name(),
                        resp.seq()
                    );
                }
            }
        });
        Self {
            channel,
            _subscription: subscription,
        }
    }

    pub fn try_recv(&self) -> Option<Response> {
        self.channel.try_receive().ok()
    }

    pub async fn recv(&self) -> Response {
        self.channel.receive().await
    }

    /// Block the calling task until a response arrives. There is no timeout.
    pub fn recv_blocking(&self) -> Response {
        futures_lite::future::block_on(self.recv())
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}
