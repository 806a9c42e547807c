//! Adaptive sensor-polling scheduler.
//!
//! One shared task services every device flagged `HAS_SENSORS`, whatever
//! their individual poll intervals:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  probe   PollSensorsTime ──▶ devices record next_due_at()    │
//! │             │                                                │
//! │             ▼  min due                                       │
//! │  sleep   clamp(min_due - now, 0, wdt_timeout - margin)       │
//! │             │  (woken early by poll-interval changes / boot) │
//! │             ▼                                                │
//! │  fire    PollSensors{now} under the "ota" lock               │
//! │             └──▶ each device re-checks should_poll_now()     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The sleep cap keeps the task feeding the watchdog even when no device
//! is due for a long time.

use std::time::Duration;

use log::{debug, info};

use crate::context::Context;
use crate::drivers::watchdog::Watchdog;
use crate::events::{Event, PollProbe, Subscription};
use crate::locks;

pub struct SensorScheduler {
    ctx: Context,
    _subscription: Subscription,
}

impl SensorScheduler {
    pub fn new(ctx: &Context) -> Self {
        let wake = ctx.poll_wake().clone();
        let subscription = ctx.bus().subscribe(move |ev| {
            if let Event::Inited = ev {
                wake.notify();
            }
        });
        Self {
            ctx: ctx.clone(),
            _subscription: subscription,
        }
    }

    /// Earliest due time over all devices, `None` when there are none.
    pub fn probe(&self) -> Option<u64> {
        let probe = PollProbe::new();
        self.ctx.bus().publish(&Event::PollSensorsTime(&probe));
        probe.earliest()
    }

    /// How long to sleep at `now_ms` before the device due at `next` fires.
    pub fn sleep_for(&self, next: Option<u64>, now_ms: u64) -> u64 {
        let cap = self.ctx.settings().max_sleep_ms();
        next.map_or(cap, |due| due.saturating_sub(now_ms).min(cap))
    }

    /// Let every due device poll, holding the OTA lock.
    pub fn fire(&self, now_ms: u64) {
        debug!("sensors: fire at {now_ms}");
        self.ctx.locks().with(locks::OTA, || {
            self.ctx
                .bus()
                .publish(&Event::PollSensors { now_ms });
        });
    }

    /// One scheduling round. Returns the number of milliseconds to sleep.
    pub fn step(&self) -> u64 {
        let cap = self.ctx.settings().max_sleep_ms();
        if !self.ctx.is_initialized() {
            return u64::from(self.ctx.settings().sensors_boot_sleep_ms).min(cap);
        }
        let next = self.probe();
        let now = self.ctx.now_ms();
        if next.is_some_and(|due| due <= now) {
            self.fire(now);
            return 0;
        }
        self.sleep_for(next, now)
    }

    /// Task body: feed the watchdog, schedule, sleep until due or woken.
    pub fn run(&self, watchdog: &Watchdog) -> ! {
        info!("sensors: scheduler running");
        loop {
            watchdog.feed();
            let sleep = self.step();
            if sleep > 0 {
                self.ctx.poll_wake().wait(Duration::from_millis(sleep));
            }
        }
    }
}
