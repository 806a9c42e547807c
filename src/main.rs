//! espkit firmware: boot entry point.
//!
//! Wires the kernel onto the chip and hands control to three pinned tasks:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Adapters   NvsStore (Store)   MonotonicClock   LogSink      │
//! │  ─────────────────── Context (bus · locks · sensors) ─────── │
//! │                                                              │
//! │  m/app      App: config debounce + liveness      (APP_CPU)   │
//! │  m/sensors  SensorScheduler: probe/sleep/fire    (APP_CPU)   │
//! │  m/stem     StateEmitter ──▶ LogSink             (PRO_CPU)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Board crates add their drivers between `App::new` and `app.init()`.
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};

use espkit::adapters::log_sink::LogSink;
use espkit::adapters::nvs::NvsStore;
use espkit::adapters::time::MonotonicClock;
use espkit::app::App;
use espkit::config::KernelConfig;
use espkit::context::Context;
use espkit::drivers::system;
use espkit::drivers::task_pin::{self, Core};
use espkit::drivers::watchdog::Watchdog;
use espkit::scheduler::SensorScheduler;
use espkit::sensors::emitter::{EmitFlags, StateEmitter};

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  espkit v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");
    info!("Free heap: {} bytes", system::free_heap());

    let settings = KernelConfig::default();
    Watchdog::configure(settings.wdt_timeout_ms);
    let emitter_period = u64::from(settings.emitter_period_ms);

    // ── 2. Kernel context and the App ─────────────────────────
    let ctx = Context::new(Arc::new(MonotonicClock::new()), settings);
    let store = NvsStore::new().map_err(|e| anyhow::anyhow!("NVS init failed: {e}"))?;
    let app = App::new(&ctx, "espkit", env!("CARGO_PKG_VERSION"), Box::new(store));

    // ── 3. Sensor services (subscribe before boot events) ─────
    let scheduler = SensorScheduler::new(&ctx);
    let emitter = StateEmitter::new(
        &ctx,
        LogSink::new(),
        EmitFlags::ON_CHANGE | EmitFlags::PERIODICALLY,
        emitter_period,
    );

    // ── 4. Boot ───────────────────────────────────────────────
    app.init();
    info!("Components: {:?}", app.describe().keys().collect::<Vec<_>>());

    // ── 5. Tasks ──────────────────────────────────────────────
    task_pin::spawn_on_core::<()>(Core::App, 5, 8, task_pin::SENSORS_TASK, move || {
        let watchdog = Watchdog::subscribe();
        scheduler.run(&watchdog)
    })?;
    task_pin::spawn_on_core::<()>(Core::Pro, 3, 6, task_pin::EMITTER_TASK, move || {
        let watchdog = Watchdog::subscribe();
        emitter.run(&watchdog)
    })?;
    let housekeeping = Arc::clone(&app);
    let handle = task_pin::spawn_on_core::<()>(Core::App, 4, 8, task_pin::APP_TASK, move || {
        let watchdog = Watchdog::subscribe();
        housekeeping.run(&watchdog)
    })?;

    if handle.join().is_err() {
        warn!("app task panicked, restarting");
        app.restart();
    }
    Ok(())
}
