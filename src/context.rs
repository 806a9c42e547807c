//! The process-wide context handed to every component constructor.
//!
//! Built once at boot. Clones are cheap and share everything.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::app::ports::Clock;
use crate::config::KernelConfig;
use crate::events::EventBus;
use crate::locks::Locks;
use crate::notify::Notify;
use crate::sensors::SensorRegistry;

#[derive(Clone)]
pub struct Context {
    bus: EventBus,
    clock: Arc<dyn Clock>,
    sensors: SensorRegistry,
    locks: Locks,
    poll_wake: Notify,
    settings: Arc<KernelConfig>,
    initialized: Arc<AtomicBool>,
}

impl Context {
    pub fn new(clock: Arc<dyn Clock>, settings: KernelConfig) -> Self {
        Self {
            bus: EventBus::new(),
            clock,
            sensors: SensorRegistry::new(),
            locks: Locks::new(),
            poll_wake: Notify::new(),
            settings: Arc::new(settings),
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn clock(&self) -> &dyn Clock {
        &*self.clock
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn sensors(&self) -> &SensorRegistry {
        &self.sensors
    }

    pub fn locks(&self) -> &Locks {
        &self.locks
    }

    /// Wakes the sensor scheduler.
    pub fn poll_wake(&self) -> &Notify {
        &self.poll_wake
    }

    pub fn settings(&self) -> &KernelConfig {
        &self.settings
    }

    /// Every init level has run.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }
}

impl core::fmt::Debug for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("now_ms", &self.now_ms())
            .field("sensors", &self.sensors.len())
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
