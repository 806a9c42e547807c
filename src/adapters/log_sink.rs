//! Log-based sensor sink adapter.
//!
//! Implements [`SensorSink`] by writing sensor readings to the ESP-IDF
//! logger (which goes to UART / USB-CDC in production). An MQTT or UI
//! transport implements the same trait.

use core::sync::atomic::{AtomicU64, Ordering};

use log::info;

use crate::sensors::emitter::{Reading, SensorSink};

/// Adapter that logs every batch of readings to the serial console.
#[derive(Debug, Default)]
pub struct LogSink {
    emitted: AtomicU64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Readings written so far.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl SensorSink for LogSink {
    fn emit(&self, readings: &[Reading]) {
        for r in readings {
            info!("SENSOR | {} = {}", r.uid, r.value);
        }
        self.emitted
            .fetch_add(readings.len() as u64, Ordering::Relaxed);
    }
}
