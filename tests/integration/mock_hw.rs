//! Mock components and store for integration tests.
//!
//! Each mock records what the kernel asked of it so tests can assert on the
//! full interaction without touching flash or peripherals.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use espkit::app::ports::Store;
use espkit::component::{Component, ObjectCore, PendingResponse, install};
use espkit::context::Context;
use espkit::error::{Error, StoreError};
use espkit::events::{EventBus, Request};
use espkit::json;
use espkit::sensors::Sensor;
use espkit::sensors::SensorSpec;
use espkit::sensors::device::{Device, DeviceCore, DeviceFlags};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── MockStore ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct StoreState {
    pub doc: Option<Value>,
    pub writes: usize,
    pub fail_writes: bool,
}

/// In-memory store whose state stays visible to the test after the
/// pipeline took ownership of the store.
#[derive(Clone, Default)]
pub struct MockStore {
    pub state: Arc<Mutex<StoreState>>,
}

#[allow(dead_code)]
impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn doc(&self) -> Option<Value> {
        self.state.lock().unwrap().doc.clone()
    }

    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }
}

impl Store for MockStore {
    fn read(&mut self) -> Result<Option<Value>, StoreError> {
        Ok(self.state.lock().unwrap().doc.clone())
    }

    fn write(&mut self, doc: &Value) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(StoreError::Io);
        }
        state.writes += 1;
        state.doc = Some(doc.clone());
        Ok(())
    }

    fn reset(&mut self) -> Result<(), StoreError> {
        self.state.lock().unwrap().doc = None;
        Ok(())
    }
}

// ── Fan: plain configurable component ─────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanConfig {
    pub on: bool,
    pub speed: f64,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            on: false,
            speed: 0.0,
        }
    }
}

pub struct Fan {
    core: ObjectCore,
    pub config: Mutex<FanConfig>,
}

impl Fan {
    pub fn new(ctx: &Context) -> Arc<Self> {
        install(Self {
            core: ObjectCore::new(ctx),
            config: Mutex::new(FanConfig::default()),
        })
    }
}

impl Component for Fan {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn name(&self) -> &str {
        "fan"
    }

    fn get_config(&self, _args: &Value) -> Option<Value> {
        json::to_value(&*self.config.lock().unwrap())
    }

    fn set_config(&self, config: &Value) -> bool {
        let mut current = self.config.lock().unwrap();
        if config.is_null() {
            let changed = *current != FanConfig::default();
            *current = FanConfig::default();
            return changed;
        }
        let mut changed = false;
        json::compare_set(&mut current.on, config.get("on"), &mut changed);
        json::compare_set(&mut current.speed, config.get("speed"), &mut changed);
        changed
    }

    fn get_state(&self, _args: &Value) -> Option<Value> {
        let config = self.config.lock().unwrap();
        Some(serde_json::json!({ "running": config.on }))
    }
}

// ── Ntc: sensor device with nothing to persist ────────────────

pub struct Ntc {
    core: ObjectCore,
    device: DeviceCore,
    temperature: Arc<Sensor>,
    pub reading: Mutex<f64>,
    pub polls: AtomicUsize,
}

impl Ntc {
    pub fn new(ctx: &Context) -> Arc<Self> {
        let temperature = ctx
            .sensors()
            .register(
                ctx.bus(),
                "ntc",
                SensorSpec::new("temperature", "temperature")
                    .unit("C")
                    .precision(1),
            )
            .unwrap();
        install(Self {
            core: ObjectCore::new(ctx),
            device: DeviceCore::new(ctx, DeviceFlags::HAS_SENSORS),
            temperature,
            reading: Mutex::new(21.04),
            polls: AtomicUsize::new(0),
        })
    }
}

impl Component for Ntc {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn name(&self) -> &str {
        "ntc"
    }

    fn as_device(&self) -> Option<&dyn Device> {
        Some(self)
    }
}

impl Device for Ntc {
    fn device_core(&self) -> &DeviceCore {
        &self.device
    }

    fn poll_sensors(&self) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.temperature.set(*self.reading.lock().unwrap());
        true
    }
}

// ── Scanner: answers `scan` asynchronously ────────────────────

/// Takes a `scan` request over; the test plays the worker task by calling
/// [`Scanner::report`] and [`Scanner::finish`] from another thread.
pub struct Scanner {
    core: ObjectCore,
    pub pending: PendingResponse,
}

#[allow(dead_code)]
impl Scanner {
    pub fn new(ctx: &Context) -> Arc<Self> {
        install(Self {
            core: ObjectCore::new(ctx),
            pending: PendingResponse::new(),
        })
    }

    pub fn report(&self, bus: &EventBus, found: usize) -> bool {
        self.pending.progress(bus, serde_json::json!({ "found": found }))
    }

    pub fn finish(&self, bus: &EventBus, result: Result<Value, Error>) -> bool {
        self.pending.complete(bus, result)
    }
}

impl Component for Scanner {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn name(&self) -> &str {
        "scanner"
    }

    fn handle_request(&self, req: &Request<'_>) -> bool {
        if self.pending.handle_cancel(req) {
            return true;
        }
        if req.is("scan") {
            // begin() answers the caller itself on failure.
            let _ = self.pending.begin(req);
            return true;
        }
        false
    }
}

// ── Probe: device with a fixed interval, counts polls ─────────

pub struct Probe {
    core: ObjectCore,
    device: DeviceCore,
    name: String,
    pub polls: AtomicUsize,
    pub fail_init: AtomicBool,
}

#[allow(dead_code)]
impl Probe {
    pub fn new(ctx: &Context, name: &str, interval_ms: u64) -> Arc<Self> {
        let probe = install(Self {
            core: ObjectCore::new(ctx),
            device: DeviceCore::new(ctx, DeviceFlags::HAS_SENSORS),
            name: name.to_owned(),
            polls: AtomicUsize::new(0),
            fail_init: AtomicBool::new(false),
        });
        probe.device.set_poll_interval(interval_ms);
        probe
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl Component for Probe {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn as_device(&self) -> Option<&dyn Device> {
        Some(self)
    }
}

impl Device for Probe {
    fn device_core(&self) -> &DeviceCore {
        &self.device
    }

    fn init_sensors(&self) -> bool {
        !self.fail_init.load(Ordering::SeqCst)
    }

    fn poll_sensors(&self) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst);
        true
    }
}
