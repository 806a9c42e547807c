//! Event bus under concurrent publish / subscribe / unsubscribe.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use espkit::events::{Event, EventBus};
use serde_json::Value;

const PUBLISHERS: usize = 4;
const CHURNERS: usize = 4;
const ROUNDS: usize = 200;

// ── Unsubscribe guarantees ────────────────────────────────────

#[test]
fn no_callback_runs_after_unsubscribe_returns() {
    let bus = EventBus::new();
    let stop = AtomicBool::new(false);
    let late_calls = Arc::new(AtomicUsize::new(0));
    let delivered = Arc::new(AtomicUsize::new(0));

    thread::scope(|s| {
        for _ in 0..PUBLISHERS {
            s.spawn(|| {
                while !stop.load(Ordering::Acquire) {
                    bus.publish(&Event::Custom {
                        kind: "tick",
                        data: &Value::Null,
                    });
                }
            });
        }

        let churners: Vec<_> = (0..CHURNERS)
            .map(|_| {
                s.spawn(|| {
                    for _ in 0..ROUNDS {
                        let alive = Arc::new(AtomicBool::new(true));
                        let flag = Arc::clone(&alive);
                        let late = Arc::clone(&late_calls);
                        let hits = Arc::clone(&delivered);
                        let sub = bus.subscribe(move |_| {
                            if !flag.load(Ordering::Acquire) {
                                late.fetch_add(1, Ordering::SeqCst);
                            }
                            hits.fetch_add(1, Ordering::Relaxed);
                        });
                        thread::yield_now();
                        drop(sub);
                        alive.store(false, Ordering::Release);
                    }
                })
            })
            .collect();

        for c in churners {
            c.join().unwrap();
        }
        stop.store(true, Ordering::Release);
    });

    assert_eq!(late_calls.load(Ordering::SeqCst), 0);
    assert_eq!(bus.subscriber_count(), 0);
    // Tombstoned slots are reused, so churn never grows the table unbounded.
    assert!(bus.slot_count() <= CHURNERS);
}

// ── Delivery ──────────────────────────────────────────────────

#[test]
fn every_publish_reaches_a_stable_subscriber() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let _sub = bus.subscribe(move |ev| {
        if let Event::Custom { kind: "ping", .. } = ev {
            c.fetch_add(1, Ordering::SeqCst);
        }
    });

    thread::scope(|s| {
        for _ in 0..PUBLISHERS {
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    bus.publish(&Event::Custom {
                        kind: "ping",
                        data: &Value::Null,
                    });
                }
            });
        }
    });

    assert_eq!(count.load(Ordering::SeqCst), PUBLISHERS * ROUNDS);
}

#[test]
fn publish_from_inside_a_callback_on_another_task() {
    let bus = EventBus::new();
    let echoes = Arc::new(AtomicUsize::new(0));

    let inner = bus.clone();
    let _relay = bus.subscribe(move |ev| {
        if let Event::Custom { kind: "ping", .. } = ev {
            inner.publish(&Event::Custom {
                kind: "pong",
                data: &Value::Null,
            });
        }
    });
    let e = Arc::clone(&echoes);
    let _sink = bus.subscribe(move |ev| {
        if let Event::Custom { kind: "pong", .. } = ev {
            e.fetch_add(1, Ordering::SeqCst);
        }
    });

    let worker = {
        let bus = bus.clone();
        thread::spawn(move || {
            for _ in 0..10 {
                bus.publish(&Event::Custom {
                    kind: "ping",
                    data: &Value::Null,
                });
            }
        })
    };
    worker.join().unwrap();
    assert_eq!(echoes.load(Ordering::SeqCst), 10);
}
