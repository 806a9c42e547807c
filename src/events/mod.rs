//! Process-wide event bus and the messages carried on it.
//!
//! Events are produced by:
//! - the App (boot levels, shutdown, describe, config debounce)
//! - transports (requests from UI / MQTT / HTTP, and their responses)
//! - components (state and config changes, sensor values)
//! - the sensor scheduler (probe and fire ticks)
//!
//! Every subscriber sees every event, synchronously, on the publishing
//! task. An event only lives for the duration of `publish()`.
//!
//! ```text
//! ┌─────────────┐                    ┌──────────────┐
//! │ Transport   │──Request──┐   ┌───▶│ Component A  │
//! │ App task    │──Init─────┤   │    ├──────────────┤
//! │ Scheduler   │──Poll─────┼──▶│───▶│ Component B  │
//! │ Worker task │──Response─┘   │    ├──────────────┤
//! └─────────────┘           EventBus └───▶│ Transport    │
//!                                         └──────────────┘
//! ```

mod bus;
mod request;
mod response;

pub use bus::{EventBus, Subscription};
pub use request::{Answer, Reply, Request, Responder};
pub use response::{INBOX_DEPTH, Outcome, Response, ResponseInbox};

use core::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use serde_json::Value;

use crate::sensors::Sensor;

/// Request verbs understood by every component.
pub mod verbs {
    pub const CONFIG_GET: &str = "config-get";
    pub const CONFIG_SET: &str = "config-set";
    pub const STATE_GET: &str = "state-get";
    pub const STATE_SET: &str = "state-set";
    pub const CANCEL: &str = "cancel";
    pub const RESTART: &str = "restart";
    pub const RESET: &str = "reset";
}

/// Broadcast name sent to transports after a component's config changed.
pub const CONFIG_CHANGED: &str = "config-changed";

/// Every message that travels on the [`EventBus`].
#[derive(Clone, Copy)]
pub enum Event<'a> {
    // ── Lifecycle ─────────────────────────────────────────
    /// Boot stage `level` (0 first). Components initialise in stages.
    Init(u8),
    /// All init levels have run.
    Inited,
    /// Shutdown notice; delivered with `publish_backwards`.
    Done(DoneReason),
    /// Collect capability descriptors.
    Describe(&'a Describe),

    // ── Request / response protocol ───────────────────────
    Request(&'a Request<'a>),
    Response(&'a Response),
    /// Unsolicited notice for transports.
    Broadcast {
        source: &'a str,
        name: &'a str,
        data: &'a Value,
    },

    // ── Component changes ─────────────────────────────────
    ConfigChanged {
        source: &'a str,
        save_now: bool,
    },
    StateChanged {
        source: &'a str,
    },

    // ── Sensors ───────────────────────────────────────────
    /// Probe phase: devices record their next due time.
    PollSensorsTime(&'a PollProbe),
    /// Fire phase: devices poll if they are due at `now_ms`.
    PollSensors {
        now_ms: u64,
    },
    SensorChanged(&'a Sensor),
    /// A group of sensors was updated together.
    SensorGroupChanged(i32),

    /// Driver-defined events.
    Custom {
        kind: &'a str,
        data: &'a Value,
    },
}

impl Event<'_> {
    /// Tag used in logs and by transports that forward events.
    pub fn kind(&self) -> &str {
        match self {
            Self::Init(_) => "init",
            Self::Inited => "inited",
            Self::Done(_) => "done",
            Self::Describe(_) => "describe",
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::Broadcast { .. } => "broadcast",
            Self::ConfigChanged { .. } => "config-changed",
            Self::StateChanged { .. } => "state-changed",
            Self::PollSensorsTime(_) => "poll-sensors-time",
            Self::PollSensors { .. } => "poll-sensors",
            Self::SensorChanged(_) => "sensor-changed",
            Self::SensorGroupChanged(_) => "sensor-group-changed",
            Self::Custom { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    Shutdown,
    Restart,
    LightSleep,
    DeepSleep,
}

// ── Describe ──────────────────────────────────────────────────

/// Collector filled by components answering [`Event::Describe`].
#[derive(Debug, Default)]
pub struct Describe {
    descriptors: RefCell<BTreeMap<String, Value>>,
}

impl Describe {
    pub fn add(&self, name: &str, descriptor: Value) {
        self.descriptors
            .borrow_mut()
            .insert(name.to_owned(), descriptor);
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.descriptors.into_inner()
    }
}

// ── Poll probe ────────────────────────────────────────────────

/// Running minimum of the devices' next due times.
#[derive(Debug)]
pub struct PollProbe {
    next: Cell<u64>,
}

impl Default for PollProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl PollProbe {
    pub fn new() -> Self {
        Self {
            next: Cell::new(u64::MAX),
        }
    }

    pub fn record(&self, due_at: u64) {
        if due_at < self.next.get() {
            self.next.set(due_at);
        }
    }

    /// Earliest due time seen, or `None` when no device answered.
    pub fn earliest(&self) -> Option<u64> {
        match self.next.get() {
            u64::MAX => None,
            t => Some(t),
        }
    }
}
