//! Forwards sensor values to a sink (MQTT, UI, log) without coupling the
//! sensor drivers to it.
//!
//! Changed values collect in a uid-keyed pending map, so a sensor that
//! changes several times between two emits is sent once with its latest
//! value. The map drains immediately on change (`ON_CHANGE`) and/or as a
//! full dump every period (`PERIODICALLY`).

use core::ops::BitOr;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::info;
use serde_json::Value;

use super::Sensor;
use crate::context::Context;
use crate::drivers::watchdog::Watchdog;
use crate::events::{Event, Subscription};
use crate::notify::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitFlags(u8);

impl EmitFlags {
    pub const ON_CHANGE: Self = Self(1);
    pub const PERIODICALLY: Self = Self(2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for EmitFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub uid: String,
    pub value: Value,
}

/// Destination of sensor values.
pub trait SensorSink: Send + Sync + 'static {
    /// Whether values of `sensor` go to this sink.
    fn accepts(&self, _sensor: &Sensor) -> bool {
        true
    }

    fn emit(&self, readings: &[Reading]);
}

struct Shared<S> {
    ctx: Context,
    sink: S,
    flags: EmitFlags,
    period_ms: u64,
    pending: Mutex<BTreeMap<String, Value>>,
    /// Time of the last periodic dump.
    dumped_at: Mutex<u64>,
    wake: Notify,
}

impl<S: SensorSink> Shared<S> {
    fn queue(&self, sensor: &Sensor) {
        if sensor.is_disabled() || !self.sink.accepts(sensor) {
            return;
        }
        self.pending().insert(sensor.uid().to_owned(), sensor.value());
    }

    fn on_event(&self, ev: &Event<'_>) {
        match ev {
            Event::SensorChanged(sensor) => self.queue(sensor),
            Event::SensorGroupChanged(group) => {
                for sensor in self.ctx.sensors().group(*group) {
                    self.queue(&sensor);
                }
            }
            _ => return,
        }
        if self.flags.contains(EmitFlags::ON_CHANGE) {
            self.wake.notify();
        }
    }

    fn pending(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct StateEmitter<S: SensorSink> {
    shared: Arc<Shared<S>>,
    _subscription: Subscription,
}

impl<S: SensorSink> StateEmitter<S> {
    pub fn new(ctx: &Context, sink: S, flags: EmitFlags, period_ms: u64) -> Self {
        let shared = Arc::new(Shared {
            ctx: ctx.clone(),
            sink,
            flags,
            period_ms: period_ms.max(1),
            pending: Mutex::new(BTreeMap::new()),
            dumped_at: Mutex::new(ctx.now_ms()),
            wake: Notify::new(),
        });
        let weak = Arc::downgrade(&shared);
        let subscription = ctx.bus().subscribe(move |ev| {
            if let Some(shared) = weak.upgrade() {
                shared.on_event(ev);
            }
        });
        Self {
            shared,
            _subscription: subscription,
        }
    }

    pub fn sink(&self) -> &S {
        &self.shared.sink
    }

    pub fn pending_len(&self) -> usize {
        self.shared.pending().len()
    }

    /// Emit what is due now. Returns the number of milliseconds to sleep.
    pub fn step(&self) -> u64 {
        let shared = &*self.shared;
        let now = shared.ctx.now_ms();
        let cap = shared.ctx.settings().max_sleep_ms();
        let periodic = shared.flags.contains(EmitFlags::PERIODICALLY);

        let mut dumped_at = shared.dumped_at.lock().unwrap_or_else(PoisonError::into_inner);
        let dump = periodic && now.saturating_sub(*dumped_at) >= shared.period_ms;
        let readings: Vec<Reading> = if dump {
            *dumped_at = now;
            shared.pending().clear();
            shared
                .ctx
                .sensors()
                .all()
                .iter()
                .filter(|s| !s.is_disabled() && shared.sink.accepts(s))
                .map(|s| Reading {
                    uid: s.uid().to_owned(),
                    value: s.value(),
                })
                .collect()
        } else if shared.flags.contains(EmitFlags::ON_CHANGE) {
            core::mem::take(&mut *shared.pending())
                .into_iter()
                .map(|(uid, value)| Reading { uid, value })
                .collect()
        } else {
            Vec::new()
        };
        let next_dump = dumped_at.saturating_add(shared.period_ms);
        drop(dumped_at);

        if !readings.is_empty() {
            shared.sink.emit(&readings);
        }
        if periodic {
            next_dump.saturating_sub(now).min(cap)
        } else {
            cap
        }
    }

    /// Task body: feed the watchdog, emit, sleep until the next dump or a change.
    pub fn run(&self, watchdog: &Watchdog) -> ! {
        info!("emitter: running");
        loop {
            watchdog.feed();
            let sleep = self.step();
            self.shared.wake.wait(Duration::from_millis(sleep));
        }
    }
}
