//! Kernel tunables.
//!
//! Timing constants shared by the App housekeeping task, the sensor
//! scheduler and the state emitter. A board crate may deserialize an
//! override from flash or build one in code; every field has a default.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    // --- Watchdog ---
    /// Task watchdog timeout (milliseconds)
    pub wdt_timeout_ms: u32,
    /// Sleep caps stay this far below the watchdog timeout (milliseconds)
    pub wdt_margin_ms: u32,

    // --- App housekeeping ---
    /// Liveness tick period of the App task (milliseconds)
    pub liveness_tick_ms: u32,
    /// Quiet period after the last config change before it is flushed
    pub config_debounce_ms: u32,
    /// Highest init level broadcast during boot
    pub max_init_level: u8,

    // --- Sensors ---
    /// Scheduler sleep while the App has not finished booting
    pub sensors_boot_sleep_ms: u32,
    /// Poll interval a Device starts with (milliseconds)
    pub default_poll_interval_ms: u32,
    /// Wait before a failed Device init is retried (milliseconds)
    pub default_reinit_delay_ms: u32,
    /// Period of the state emitter's full dump (milliseconds)
    pub emitter_period_ms: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            // Watchdog
            wdt_timeout_ms: 30_000,
            wdt_margin_ms: 100,

            // App housekeeping
            liveness_tick_ms: 1000,
            config_debounce_ms: 1000,
            max_init_level: 0,

            // Sensors
            sensors_boot_sleep_ms: 1000,
            default_poll_interval_ms: 1000,
            default_reinit_delay_ms: 10_000,
            emitter_period_ms: 60_000,
        }
    }
}

impl KernelConfig {
    /// Longest a watchdog-fed task may sleep between two feeds.
    pub fn max_sleep_ms(&self) -> u64 {
        u64::from(self.wdt_timeout_ms.saturating_sub(self.wdt_margin_ms))
    }
}
