//! Sensor subsystem: named values owned by devices, the global uid index,
//! the [`Device`](device::Device) polling contract and the
//! [`StateEmitter`](emitter::StateEmitter) that forwards values to sinks.
//!
//! A sensor's uid is `<device>_<id>`. Uids are unique for the lifetime of the
//! process; sensors are registered once and never removed.

pub mod device;
pub mod emitter;

use core::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::warn;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::json;

/// Longest uid a sensor may have (fits MQTT topic segments and NVS keys).
pub const MAX_UID_LEN: usize = 47;

pub type Uid = heapless::String<MAX_UID_LEN>;

/// Static description of a sensor, given at registration.
#[derive(Debug, Clone, Default)]
pub struct SensorSpec {
    pub id: String,
    /// Measured quantity, e.g. `temperature`, `humidity`, `switch`.
    pub kind: String,
    pub name: Option<String>,
    pub unit: Option<String>,
    /// Decimal places kept for float values.
    pub precision: Option<u8>,
    /// `> 0` when the sensor is updated together with others.
    pub group: i32,
}

impl SensorSpec {
    pub fn new(id: &str, kind: &str) -> Self {
        Self {
            id: id.to_owned(),
            kind: kind.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    #[must_use]
    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_owned());
        self
    }

    #[must_use]
    pub fn precision(mut self, precision: u8) -> Self {
        self.precision = Some(precision);
        self
    }

    #[must_use]
    pub fn group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }
}

// ── Sensor ────────────────────────────────────────────────────

pub struct Sensor {
    uid: Uid,
    device: String,
    spec: SensorSpec,
    disabled: AtomicBool,
    value: Mutex<Value>,
    bus: EventBus,
}

impl Sensor {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn kind(&self) -> &str {
        &self.spec.kind
    }

    pub fn unit(&self) -> Option<&str> {
        self.spec.unit.as_deref()
    }

    pub fn group(&self) -> i32 {
        self.spec.group
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Release);
    }

    /// Last value set, `null` before the first reading.
    pub fn value(&self) -> Value {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Store a new reading. Returns whether it differed from the previous one.
    ///
    /// Ungrouped sensors announce the change with [`Event::SensorChanged`];
    /// grouped ones wait for the device to publish
    /// [`Event::SensorGroupChanged`].
    pub fn set(&self, value: impl Into<Value>) -> bool {
        let value = match self.spec.precision {
            Some(p) => json::round(value.into(), p),
            None => value.into(),
        };
        {
            let mut current = self.value.lock().unwrap_or_else(PoisonError::into_inner);
            if *current == value {
                return false;
            }
            *current = value;
        }
        if self.spec.group <= 0 {
            self.bus.publish(&Event::SensorChanged(self));
        }
        true
    }

    pub fn descriptor(&self) -> Value {
        json!({
            "device": self.device,
            "id": self.spec.id,
            "kind": self.spec.kind,
            "name": self.spec.name,
            "unit": self.spec.unit,
            "precision": self.spec.precision,
            "group": self.spec.group,
        })
    }
}

impl core::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Sensor")
            .field("uid", &self.uid.as_str())
            .field("kind", &self.spec.kind)
            .field("group", &self.spec.group)
            .finish_non_exhaustive()
    }
}

// ── Registry ──────────────────────────────────────────────────

#[derive(Default)]
struct RegistryInner {
    by_uid: RwLock<BTreeMap<String, Arc<Sensor>>>,
    last_group: AtomicI32,
}

/// Global uid-keyed sensor index. Clones share the same index.
#[derive(Clone, Default)]
pub struct SensorRegistry {
    inner: Arc<RegistryInner>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `device_id` for a sensor, or [`Error::NameTooLong`].
    pub fn make_uid(device: &str, id: &str) -> Result<Uid> {
        let mut uid = Uid::new();
        uid.push_str(device).map_err(|()| Error::NameTooLong)?;
        uid.push('_').map_err(|_| Error::NameTooLong)?;
        uid.push_str(id).map_err(|()| Error::NameTooLong)?;
        Ok(uid)
    }

    /// Create and index a sensor owned by `device`.
    pub fn register(&self, bus: &EventBus, device: &str, spec: SensorSpec) -> Result<Arc<Sensor>> {
        let uid = Self::make_uid(device, &spec.id)?;
        let mut by_uid = self
            .inner
            .by_uid
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if by_uid.contains_key(uid.as_str()) {
            warn!("sensor {} already registered", uid);
            return Err(Error::DuplicateSensor);
        }
        let sensor = Arc::new(Sensor {
            uid: uid.clone(),
            device: device.to_owned(),
            spec,
            disabled: AtomicBool::new(false),
            value: Mutex::new(Value::Null),
            bus: bus.clone(),
        });
        by_uid.insert(uid.as_str().to_owned(), Arc::clone(&sensor));
        Ok(sensor)
    }

    pub fn find(&self, uid: &str) -> Option<Arc<Sensor>> {
        self.read().get(uid).cloned()
    }

    pub fn find_for(&self, device: &str, id: &str) -> Option<Arc<Sensor>> {
        let uid = Self::make_uid(device, id).ok()?;
        self.find(&uid)
    }

    /// Every sensor, ordered by uid.
    pub fn all(&self) -> Vec<Arc<Sensor>> {
        self.read().values().cloned().collect()
    }

    pub fn group(&self, group: i32) -> Vec<Arc<Sensor>> {
        self.read()
            .values()
            .filter(|s| s.group() == group)
            .cloned()
            .collect()
    }

    /// Allocate a fresh group id (starting at 1).
    pub fn next_group(&self) -> i32 {
        self.inner.last_group.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<Sensor>>> {
        self.inner
            .by_uid
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
