//! Devices: components that own sensors and are polled by the scheduler.
//!
//! Per-device init/backoff state:
//!
//! ```text
//!   NotReady ──init_sensors() ok──▶ Ready
//!   Ready    ──poll_sensors() fails──▶ NotReady
//!   NotReady retries init_sensors() once reinit_delay has passed
//! ```

use core::ops::BitOr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use crate::component::Component;
use crate::context::Context;
use crate::events::Event;
use crate::notify::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFlags(u8);

impl DeviceFlags {
    pub const NONE: Self = Self(0);
    /// Take part in sensor polling.
    pub const HAS_SENSORS: Self = Self(1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DeviceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Polling hooks. The scheduler drives them through the bus.
pub trait Device: Component {
    fn device_core(&self) -> &DeviceCore;

    /// Bring the hardware up. Returns `false` to retry after the re-init delay.
    fn init_sensors(&self) -> bool {
        true
    }

    /// Read the hardware. Returns `false` to drop back to re-initialisation.
    fn poll_sensors(&self) -> bool {
        true
    }

    /// When this device next wants [`poll_sensors`](Self::poll_sensors).
    fn next_due_at(&self) -> u64 {
        self.device_core().next_due_at()
    }

    fn should_poll_now(&self, now_ms: u64) -> bool {
        self.device_core().should_poll(now_ms)
    }
}

#[derive(Debug)]
struct PollState {
    ready: bool,
    init_at: Option<u64>,
    polled_at: u64,
    interval_ms: u64,
    reinit_delay_ms: u64,
}

enum InitGate {
    Ready,
    Wait,
    Attempt,
}

/// Polling bookkeeping embedded in every device.
#[derive(Debug)]
pub struct DeviceCore {
    flags: DeviceFlags,
    state: Mutex<PollState>,
    wake: Notify,
}

impl DeviceCore {
    pub fn new(ctx: &Context, flags: DeviceFlags) -> Self {
        let settings = ctx.settings();
        Self {
            flags,
            state: Mutex::new(PollState {
                ready: false,
                init_at: None,
                polled_at: 0,
                interval_ms: u64::from(settings.default_poll_interval_ms),
                reinit_delay_ms: u64::from(settings.default_reinit_delay_ms),
            }),
            wake: ctx.poll_wake().clone(),
        }
    }

    pub fn flags(&self) -> DeviceFlags {
        self.flags
    }

    pub fn has_sensors(&self) -> bool {
        self.flags.contains(DeviceFlags::HAS_SENSORS)
    }

    pub fn poll_interval(&self) -> u64 {
        self.lock().interval_ms
    }

    /// Change the poll interval and wake the scheduler so a shorter interval
    /// takes effect before the current sleep ends.
    pub fn set_poll_interval(&self, ms: u64) {
        self.lock().interval_ms = ms;
        self.wake.notify();
    }

    pub fn reinit_delay(&self) -> u64 {
        self.lock().reinit_delay_ms
    }

    pub fn set_reinit_delay(&self, ms: u64) {
        self.lock().reinit_delay_ms = ms;
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    /// Force re-initialisation. `immediate` skips the re-init delay.
    pub fn reset_sensors(&self, immediate: bool) {
        let mut state = self.lock();
        state.ready = false;
        if immediate {
            state.init_at = None;
        }
    }

    pub fn polled_at(&self) -> u64 {
        self.lock().polled_at
    }

    pub fn next_due_at(&self) -> u64 {
        let state = self.lock();
        state.polled_at.saturating_add(state.interval_ms)
    }

    pub fn should_poll(&self, now_ms: u64) -> bool {
        now_ms >= self.next_due_at()
    }

    fn mark_polled(&self, now_ms: u64) {
        self.lock().polled_at = now_ms;
    }

    fn init_gate(&self, now_ms: u64) -> InitGate {
        let mut state = self.lock();
        if state.ready {
            return InitGate::Ready;
        }
        if let Some(at) = state.init_at {
            if now_ms < at.saturating_add(state.reinit_delay_ms) {
                return InitGate::Wait;
            }
        }
        state.init_at = Some(now_ms);
        InitGate::Attempt
    }

    fn finish_init(&self, ok: bool) {
        self.lock().ready = ok;
    }

    fn lock(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serve the scheduler's probe and fire events. Returns `true` when `ev`
/// was one of them.
pub fn handle_poll(device: &dyn Device, ev: &Event<'_>) -> bool {
    if !device.device_core().has_sensors() {
        return false;
    }
    match ev {
        Event::PollSensorsTime(probe) => {
            probe.record(device.next_due_at());
            true
        }
        Event::PollSensors { now_ms } => {
            poll(device, *now_ms);
            true
        }
        _ => false,
    }
}

fn poll(device: &dyn Device, now_ms: u64) {
    if !device.should_poll_now(now_ms) {
        return;
    }
    let core = device.device_core();
    if sensors_ready(device, now_ms) && !device.poll_sensors() {
        warn!("{}: poll failed, re-initialising", device.name());
        core.reset_sensors(false);
    }
    core.mark_polled(now_ms);
}

fn sensors_ready(device: &dyn Device, now_ms: u64) -> bool {
    let core = device.device_core();
    match core.init_gate(now_ms) {
        InitGate::Ready => true,
        InitGate::Wait => false,
        InitGate::Attempt => {
            let ok = device.init_sensors();
            core.finish_init(ok);
            if ok {
                info!("{}: sensors initialised", device.name());
            } else {
                warn!(
                    "{}: sensor init failed, retry in {} ms",
                    device.name(),
                    core.reinit_delay()
                );
            }
            ok
        }
    }
}
