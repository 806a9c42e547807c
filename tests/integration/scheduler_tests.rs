//! Sensor scheduler, devices and the state emitter working together.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use espkit::adapters::log_sink::LogSink;
use espkit::adapters::time::ManualClock;
use espkit::app::App;
use espkit::config::KernelConfig;
use espkit::context::Context;
use espkit::scheduler::SensorScheduler;
use espkit::sensors::device::Device;
use espkit::sensors::emitter::{EmitFlags, StateEmitter};
use serde_json::json;

use crate::mock_hw::{MockStore, Ntc, Probe};

fn booted(wdt_timeout_ms: u32) -> (Context, Arc<ManualClock>, Arc<App>) {
    let clock = Arc::new(ManualClock::new(0));
    let settings = KernelConfig {
        wdt_timeout_ms,
        ..KernelConfig::default()
    };
    let ctx = Context::new(clock.clone(), settings);
    let app = App::new(&ctx, "rig", "1.0.0", Box::new(MockStore::new()));
    (ctx, clock, app)
}

#[test]
fn heterogeneous_intervals_share_one_task() {
    let (ctx, clock, app) = booted(5000);
    let a = Probe::new(&ctx, "a", 100);
    let b = Probe::new(&ctx, "b", 500);
    let c = Probe::new(&ctx, "c", 2000);
    let sched = SensorScheduler::new(&ctx);

    assert_eq!(sched.step(), 1000, "boot sleep until the app is up");
    app.init();

    // Walk simulated time the way the task loop would.
    let mut now = 0;
    while now < 2000 {
        let sleep = sched.step();
        now += sleep;
        clock.set(now);
    }
    sched.step();

    assert_eq!(a.polls(), 20);
    assert_eq!(b.polls(), 4);
    assert_eq!(c.polls(), 1);
}

#[test]
fn long_intervals_still_wake_before_the_watchdog() {
    let (ctx, _clock, app) = booted(5000);
    let _slow = Probe::new(&ctx, "slow", 60_000);
    let sched = SensorScheduler::new(&ctx);
    app.init();
    assert_eq!(sched.step(), 4900);
}

#[test]
fn failed_init_backs_off_then_recovers() {
    let (ctx, clock, app) = booted(30_000);
    let probe = Probe::new(&ctx, "flaky", 1000);
    probe.device_core().set_reinit_delay(5000);
    probe.fail_init.store(true, Ordering::SeqCst);
    let sched = SensorScheduler::new(&ctx);
    app.init();

    clock.set(1000);
    sched.step();
    assert!(!probe.device_core().is_ready());
    assert_eq!(probe.polls(), 0);

    probe.fail_init.store(false, Ordering::SeqCst);
    clock.set(2000);
    sched.step();
    assert!(!probe.device_core().is_ready(), "still inside the re-init delay");

    clock.set(6000);
    sched.step();
    assert!(probe.device_core().is_ready());
    assert_eq!(probe.polls(), 1);
}

#[test]
fn polled_values_reach_the_sink() {
    let (ctx, clock, app) = booted(30_000);
    let ntc = Ntc::new(&ctx);
    let sched = SensorScheduler::new(&ctx);
    let emitter = StateEmitter::new(&ctx, LogSink::new(), EmitFlags::ON_CHANGE, 60_000);
    app.init();

    clock.set(1000);
    sched.step();
    assert_eq!(ntc.polls.load(Ordering::SeqCst), 1);
    let sensor = ctx.sensors().find("ntc_temperature").unwrap();
    assert_eq!(sensor.value(), json!(21.0));

    assert_eq!(emitter.pending_len(), 1);
    emitter.step();
    assert_eq!(emitter.sink().emitted(), 1);

    // Same reading again: no change, nothing queued.
    clock.set(2000);
    sched.step();
    assert_eq!(emitter.pending_len(), 0);
}
