//! Config pipeline and debounce against mock components.

use std::sync::Arc;

use espkit::adapters::time::ManualClock;
use espkit::app::App;
use espkit::config::KernelConfig;
use espkit::context::Context;
use espkit::events::{Event, Reply, Request, verbs};
use serde_json::{Value, json};

use crate::mock_hw::{Fan, FanConfig, MockStore, Ntc};

struct Rig {
    ctx: Context,
    clock: Arc<ManualClock>,
    store: MockStore,
    app: Arc<App>,
    fan: Arc<Fan>,
    _ntc: Arc<Ntc>,
}

fn rig() -> Rig {
    let clock = Arc::new(ManualClock::new(0));
    let ctx = Context::new(clock.clone(), KernelConfig::default());
    let store = MockStore::new();
    let app = App::new(&ctx, "rig", "1.0.0", Box::new(store.clone()));
    let fan = Fan::new(&ctx);
    let ntc = Ntc::new(&ctx);
    app.init();
    Rig {
        ctx,
        clock,
        store,
        app,
        fan,
        _ntc: ntc,
    }
}

fn set_fan(rig: &Rig, data: &Value) {
    let reply = Reply::new();
    Request::new(verbs::CONFIG_SET, 1, Some("fan"), data, &reply).publish(rig.ctx.bus());
    assert!(!reply.first().unwrap().error);
}

// ── Merge ─────────────────────────────────────────────────────

#[test]
fn save_writes_only_components_with_config() {
    let rig = rig();
    set_fan(&rig, &json!({"on": true, "speed": 0.5}));
    rig.app.save_now().unwrap();

    assert_eq!(
        rig.store.doc(),
        Some(json!({"fan": {"on": true, "speed": 0.5}}))
    );
}

#[test]
fn save_reset_load_round_trip() {
    let rig = rig();
    set_fan(&rig, &json!({"on": true, "speed": 0.25}));
    rig.app.save_now().unwrap();
    let saved = rig.store.doc();

    rig.app.config().reset().unwrap();
    assert_eq!(*rig.fan.config.lock().unwrap(), FanConfig::default());
    assert_eq!(rig.store.doc(), None);

    // Put the saved blob back and load it like a reboot would.
    rig.store.state.lock().unwrap().doc = saved;
    assert!(rig.app.config().load().unwrap());
    assert_eq!(
        *rig.fan.config.lock().unwrap(),
        FanConfig {
            on: true,
            speed: 0.25
        }
    );
}

// ── Debounce ──────────────────────────────────────────────────

#[test]
fn burst_inside_window_costs_one_write() {
    let rig = rig();
    for i in 1..=10 {
        rig.clock.set(i * 50);
        set_fan(&rig, &json!({"speed": i as f64 / 10.0}));
        assert!(!rig.app.tick());
    }
    assert_eq!(rig.store.writes(), 0);

    rig.clock.set(500 + 1001);
    assert!(rig.app.tick());
    assert_eq!(rig.store.writes(), 1);
    assert_eq!(rig.store.doc().unwrap()["fan"]["speed"], json!(1.0));
}

#[test]
fn spaced_changes_each_write() {
    let rig = rig();
    let mut now = 0;
    for i in 1..=3 {
        now += 2000;
        rig.clock.set(now);
        set_fan(&rig, &json!({"speed": f64::from(i) / 10.0}));
        rig.clock.set(now + 1001);
        assert!(rig.app.tick());
    }
    assert_eq!(rig.store.writes(), 3);
}

#[test]
fn failed_flush_is_retried_by_the_next_tick() {
    let rig = rig();
    set_fan(&rig, &json!({"on": true}));
    rig.store.fail_writes(true);
    rig.clock.set(1001);
    assert!(!rig.app.tick());
    assert!(rig.app.is_config_dirty());

    rig.store.fail_writes(false);
    rig.clock.set(2000);
    assert!(rig.app.tick());
    assert_eq!(rig.store.writes(), 1);
    assert_eq!(rig.store.doc().unwrap()["fan"]["on"], json!(true));
}

#[test]
fn save_now_flag_skips_the_timer() {
    let rig = rig();
    *rig.fan.config.lock().unwrap() = FanConfig {
        on: true,
        speed: 1.0,
    };
    rig.ctx.bus().publish(&Event::ConfigChanged {
        source: "fan",
        save_now: true,
    });
    assert_eq!(rig.store.writes(), 1);
    assert!(!rig.app.is_config_dirty());
}

#[test]
fn config_changed_broadcast_reaches_transports() {
    let rig = rig();
    let names = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = Arc::clone(&names);
    let _transport = rig.ctx.bus().subscribe(move |ev| {
        if let Event::Broadcast { source, name, .. } = ev {
            seen.lock().unwrap().push(format!("{source}:{name}"));
        }
    });
    set_fan(&rig, &json!({"on": true}));
    set_fan(&rig, &json!({"on": true}));
    assert_eq!(*names.lock().unwrap(), vec!["fan:config-changed"]);
}
