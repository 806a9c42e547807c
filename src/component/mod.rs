//! The component contract every driver implements.
//!
//! A component owns one bus subscription. Its callback routes events in a
//! fixed order, first match wins:
//!
//! ```text
//!  Event ──▶ Request for me? ──▶ config verbs ─▶ state verbs ─▶ own verbs
//!        ──▶ Describe?       ──▶ descriptor()
//!        ──▶ otherwise       ──▶ poll ticks (devices) ─▶ handle_event()
//! ```
//!
//! Components use interior mutability: every hook takes `&self`, because
//! events arrive on whichever task published them.

mod pending;

pub use pending::PendingResponse;

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use log::warn;
use serde_json::Value;

use crate::context::Context;
use crate::events::{CONFIG_CHANGED, Event, EventBus, Request, Subscription, verbs};
use crate::json;
use crate::sensors::device::{self, Device};

/// Driver-facing hooks. Only [`core`](Component::core) and
/// [`name`](Component::name) are required.
pub trait Component: Send + Sync + 'static {
    fn core(&self) -> &ObjectCore;

    fn name(&self) -> &str;

    /// Target name requests are matched against.
    fn interactive_name(&self) -> &str {
        self.name()
    }

    /// Key of this component's slice in state documents.
    fn state_name(&self) -> &str {
        self.name()
    }

    /// Key of this component's slice in the persisted config document.
    fn config_name(&self) -> &str {
        self.name()
    }

    /// `None` means nothing to report, unlike an empty object.
    fn get_state(&self, _args: &Value) -> Option<Value> {
        None
    }

    /// Returns whether anything changed.
    fn set_state(&self, _state: &Value) -> bool {
        false
    }

    /// `None` means nothing to persist, unlike an empty object.
    fn get_config(&self, _args: &Value) -> Option<Value> {
        None
    }

    /// Returns whether anything changed. `null` restores defaults.
    fn set_config(&self, _config: &Value) -> bool {
        false
    }

    /// Component-specific verbs. Return `true` when the request was taken.
    fn handle_request(&self, _req: &Request<'_>) -> bool {
        false
    }

    fn handle_event(&self, _ev: &Event<'_>) {}

    /// Capability descriptor contributed to `describe`.
    fn descriptor(&self) -> Option<Value> {
        None
    }

    /// Devices return themselves to take part in sensor polling.
    fn as_device(&self) -> Option<&dyn Device> {
        None
    }
}

/// Bookkeeping shared by every component.
pub struct ObjectCore {
    bus: EventBus,
    configured: AtomicBool,
    subscription: OnceLock<Subscription>,
}

impl ObjectCore {
    pub fn new(ctx: &Context) -> Self {
        Self::with_bus(ctx.bus())
    }

    pub fn with_bus(bus: &EventBus) -> Self {
        Self {
            bus: bus.clone(),
            configured: AtomicBool::new(false),
            subscription: OnceLock::new(),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Whether a config change has ever been applied. Never reverts.
    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Acquire)
    }

    pub fn mark_configured(&self) {
        self.configured.store(true, Ordering::Release);
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.get().is_some()
    }
}

impl core::fmt::Debug for ObjectCore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObjectCore")
            .field("configured", &self.is_configured())
            .field("attached", &self.is_attached())
            .finish_non_exhaustive()
    }
}

/// Put `component` on the bus and return the shared handle.
pub fn install<C: Component>(component: C) -> Arc<C> {
    let component = Arc::new(component);
    attach(&component);
    component
}

/// Subscribe an already shared component. The subscription holds a weak
/// reference; dropping the last `Arc` unsubscribes.
pub fn attach<C: Component>(component: &Arc<C>) {
    let weak = Arc::downgrade(component);
    let subscription = component.core().bus().subscribe(move |ev| {
        if let Some(c) = weak.upgrade() {
            dispatch(&*c, ev);
        }
    });
    if component.core().subscription.set(subscription).is_err() {
        warn!("{}: already attached", component.name());
    }
}

/// Route one event to `c`.
pub fn dispatch(c: &dyn Component, ev: &Event<'_>) {
    match ev {
        Event::Request(req) if req.is_for(c.interactive_name()) => {
            handle_request(c, req);
        }
        Event::Describe(describe) => {
            if let Some(descriptor) = c.descriptor() {
                describe.add(c.name(), descriptor);
            }
        }
        _ => {
            if let Event::ConfigChanged { source, .. } = ev {
                if *source == c.config_name() {
                    c.core().mark_configured();
                }
            }
            if let Some(dev) = c.as_device() {
                if device::handle_poll(dev, ev) {
                    return;
                }
            }
            c.handle_event(ev);
        }
    }
}

/// Run the verb chain. Returns whether any link took the request.
pub fn handle_request(c: &dyn Component, req: &Request<'_>) -> bool {
    CHAIN.iter().any(|link| link.handle(c, req))
}

// ── Verb chain ────────────────────────────────────────────────

trait RequestHandler {
    fn handle(&self, c: &dyn Component, req: &Request<'_>) -> bool;
}

const CHAIN: [&dyn RequestHandler; 3] = [&ConfigVerbs, &StateVerbs, &OwnVerbs];

struct ConfigVerbs;
struct StateVerbs;
struct OwnVerbs;

impl RequestHandler for ConfigVerbs {
    fn handle(&self, c: &dyn Component, req: &Request<'_>) -> bool {
        let name = c.config_name();
        if req.is(verbs::CONFIG_GET) {
            match c.get_config(req.data()) {
                Some(config) => answer(req, name, &config),
                None if !req.is_broadcast() => req.respond_data(Some(name), &Value::Null),
                None => {}
            }
            return true;
        }
        if !req.is(verbs::CONFIG_SET) {
            return false;
        }
        let Some(config) = addressed_slice(req, name) else {
            return true;
        };
        if c.set_config(config) {
            c.core().mark_configured();
            let bus = c.core().bus();
            bus.publish(&Event::ConfigChanged {
                source: name,
                save_now: false,
            });
            bus.publish(&Event::Broadcast {
                source: name,
                name: CONFIG_CHANGED,
                data: &Value::Null,
            });
        }
        if req.is_broadcast() {
            req.respond_ok(Some(name));
        } else {
            let current = c.get_config(&Value::Null).unwrap_or(Value::Null);
            answer(req, name, &current);
        }
        true
    }
}

impl RequestHandler for StateVerbs {
    fn handle(&self, c: &dyn Component, req: &Request<'_>) -> bool {
        let name = c.state_name();
        if req.is(verbs::STATE_GET) {
            match c.get_state(req.data()) {
                Some(state) => answer(req, name, &state),
                None if !req.is_broadcast() => req.respond_data(Some(name), &Value::Null),
                None => {}
            }
            return true;
        }
        if !req.is(verbs::STATE_SET) {
            return false;
        }
        let Some(state) = addressed_slice(req, name) else {
            return true;
        };
        if c.set_state(state) {
            c.core()
                .bus()
                .publish(&Event::StateChanged { source: name });
        }
        if req.is_broadcast() {
            req.respond_ok(Some(name));
        } else {
            let current = c.get_state(&Value::Null).unwrap_or(Value::Null);
            answer(req, name, &current);
        }
        true
    }
}

impl RequestHandler for OwnVerbs {
    fn handle(&self, c: &dyn Component, req: &Request<'_>) -> bool {
        c.handle_request(req)
    }
}

/// Broadcast setters carry a document keyed by component; targeted ones
/// carry the component's value directly.
fn addressed_slice<'r>(req: &Request<'r>, key: &str) -> Option<&'r Value> {
    if req.is_broadcast() {
        json::slice(req.data(), key)
    } else {
        Some(req.data())
    }
}

fn answer(req: &Request<'_>, source: &str, value: &Value) {
    match json::check(value) {
        Ok(_) => req.respond_data(Some(source), value),
        Err(e) => req.respond_error(Some(source), &e),
    }
}
