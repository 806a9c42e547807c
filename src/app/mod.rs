//! The App: root component and owner of the boot sequence.
//!
//! ```text
//!  init()  load config ──▶ Init(0..=max) ──▶ Inited
//!  run()   every liveness tick: feed watchdog, flush a settled dirty config
//!  done    Done(reason) delivered newest-subscriber-first
//! ```
//!
//! Config changes are debounced: every `ConfigChanged` restarts the quiet
//! period and the housekeeping tick writes once it has passed, so a burst of
//! field updates costs one flash write. `save_now` bypasses the timer.

pub mod persistence;
pub mod ports;

pub use persistence::ConfigPipeline;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{info, warn};
use serde_json::{Value, json};

use crate::component::{Component, ObjectCore, install};
use crate::context::Context;
use crate::drivers::{system, watchdog::Watchdog};
use crate::error::Result;
use crate::events::{Describe, DoneReason, Event, Request, verbs};
use crate::json;

use ports::Store;

pub struct App {
    core: ObjectCore,
    ctx: Context,
    product: String,
    version: String,
    pipeline: ConfigPipeline,
    /// Customised hostname; `None` until set.
    hostname: Mutex<Option<String>>,
    dirty: Mutex<Dirty>,
    started_at: u64,
}

impl App {
    /// Build the App and put it on the bus.
    pub fn new(ctx: &Context, product: &str, version: &str, store: Box<dyn Store>) -> Arc<Self> {
        install(Self {
            core: ObjectCore::new(ctx),
            ctx: ctx.clone(),
            product: product.to_owned(),
            version: version.to_owned(),
            pipeline: ConfigPipeline::new(ctx.bus(), store),
            hostname: Mutex::new(None),
            dirty: Mutex::new(Dirty::default()),
            started_at: ctx.now_ms(),
        })
    }

    /// Load the stored config and walk every init level. Runs once.
    pub fn init(&self) {
        if self.ctx.is_initialized() {
            return;
        }
        if let Err(e) = self.pipeline.load() {
            warn!("app: config load failed: {e}");
        }
        // What was just loaded is what is stored.
        self.dirty().since = None;

        let bus = self.ctx.bus();
        for level in 0..=self.ctx.settings().max_init_level {
            bus.publish(&Event::Init(level));
        }
        self.ctx.mark_initialized();
        bus.publish(&Event::Inited);
        info!("{} {}: initialized", self.product, self.version);
    }

    pub fn is_initialized(&self) -> bool {
        self.ctx.is_initialized()
    }

    pub fn is_config_dirty(&self) -> bool {
        self.dirty().since.is_some()
    }

    /// Housekeeping: flush the config once it has been quiet long enough.
    /// Returns whether a save happened.
    pub fn tick(&self) -> bool {
        let (since, generation) = {
            let dirty = self.dirty();
            match dirty.since {
                Some(since) => (since, dirty.generation),
                None => return false,
            }
        };
        let debounce = u64::from(self.ctx.settings().config_debounce_ms);
        if self.ctx.now_ms().saturating_sub(since) <= debounce {
            return false;
        }
        if let Err(e) = self.pipeline.save() {
            warn!("app: config flush failed, retrying next tick: {e}");
            return false;
        }
        self.dirty().settle(generation);
        true
    }

    /// App task body.
    pub fn run(&self, watchdog: &Watchdog) -> ! {
        let period = Duration::from_millis(u64::from(self.ctx.settings().liveness_tick_ms));
        info!("app: housekeeping every {period:?}");
        loop {
            watchdog.feed();
            self.tick();
            std::thread::sleep(period);
        }
    }

    /// Capability descriptors of every component, by name.
    pub fn describe(&self) -> BTreeMap<String, Value> {
        let describe = Describe::default();
        self.ctx.bus().publish(&Event::Describe(&describe));
        describe.into_inner()
    }

    /// Announce shutdown, newest subscribers first.
    pub fn shutdown(&self, reason: DoneReason) {
        info!("app: shutting down ({reason:?})");
        self.ctx.bus().publish_backwards(&Event::Done(reason));
    }

    /// Flush pending config, announce the restart and reboot.
    pub fn restart(&self) {
        if self.is_config_dirty() {
            if let Err(e) = self.save_now() {
                warn!("app: config lost on restart: {e}");
            }
        }
        self.shutdown(DoneReason::Restart);
        system::restart();
    }

    /// Write the config immediately.
    pub fn save_now(&self) -> Result<()> {
        let generation = self.dirty().generation;
        let result = self.pipeline.save();
        match result {
            Ok(()) => self.dirty().settle(generation),
            Err(_) => self.dirty().mark(self.ctx.now_ms()),
        }
        result
    }

    pub fn config(&self) -> &ConfigPipeline {
        &self.pipeline
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Network name: the customised one, else the product name.
    pub fn hostname(&self) -> String {
        self.hostname
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.product.clone())
    }

    fn dirty(&self) -> MutexGuard<'_, Dirty> {
        self.dirty.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Unsaved-change bookkeeping. Every change bumps `generation`, so a save
/// only clears what it actually collected.
#[derive(Debug, Default)]
struct Dirty {
    /// When the config last changed without being written.
    since: Option<u64>,
    generation: u64,
}

impl Dirty {
    fn mark(&mut self, now: u64) {
        self.since = Some(now);
        self.generation = self.generation.wrapping_add(1);
    }

    /// A save that started at `generation` succeeded.
    fn settle(&mut self, generation: u64) {
        if self.generation == generation {
            self.since = None;
        }
    }
}

impl Component for App {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn name(&self) -> &str {
        "app"
    }

    fn get_state(&self, _args: &Value) -> Option<Value> {
        let uptime = self.ctx.now_ms().saturating_sub(self.started_at) / 1000;
        Some(json!({
            "name": self.product,
            "version": self.version,
            "uptime": uptime,
            "hostname": self.hostname(),
        }))
    }

    fn get_config(&self, _args: &Value) -> Option<Value> {
        let hostname = self.hostname.lock().unwrap_or_else(PoisonError::into_inner);
        hostname.as_ref().map(|h| json!({ "hostname": h }))
    }

    fn set_config(&self, config: &Value) -> bool {
        let mut hostname = self.hostname.lock().unwrap_or_else(PoisonError::into_inner);
        if config.is_null() {
            return hostname.take().is_some();
        }
        let mut changed = false;
        json::compare_set(&mut *hostname, config.get("hostname"), &mut changed);
        changed
    }

    fn handle_request(&self, req: &Request<'_>) -> bool {
        if req.is(verbs::RESTART) {
            req.respond_ok(Some(self.name()));
            self.restart();
            return true;
        }
        if req.is(verbs::RESET) {
            match self.pipeline.reset() {
                Ok(()) => req.respond_ok(Some(self.name())),
                Err(e) => req.respond_error(Some(self.name()), &e),
            }
            return true;
        }
        false
    }

    fn handle_event(&self, ev: &Event<'_>) {
        let Event::ConfigChanged { source, save_now } = ev else {
            return;
        };
        if *save_now {
            if let Err(e) = self.save_now() {
                warn!("app: immediate save for {source} failed: {e}");
            }
        } else {
            self.dirty().mark(self.ctx.now_ms());
        }
    }

    fn descriptor(&self) -> Option<Value> {
        Some(json!({ "name": self.product, "version": self.version }))
    }
}

impl core::fmt::Debug for App {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("App")
            .field("product", &self.product)
            .field("version", &self.version)
            .field("dirty", &*self.dirty())
            .finish_non_exhaustive()
    }
}
