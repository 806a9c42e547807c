//! Config persistence pipeline.
//!
//! Components serialize their own slices; the pipeline only merges and
//! stores them:
//!
//! ```text
//!  save   config-get (broadcast) ──▶ every component answers its slice
//!                                    └──▶ merged {name: slice, …} ──▶ Store
//!  load   Store ──▶ config-set (broadcast, whole doc) ──▶ each takes its key
//!  reset  Store.reset() ──▶ config-set null ──▶ everyone restores defaults
//! ```
//!
//! The store mutex is never held while a request is on the bus, so a
//! component may trigger an immediate save from inside its own setter.

use core::cell::RefCell;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::events::{EventBus, Request, Responder, verbs};
use crate::json;

use super::ports::Store;

/// Collects synchronous `config-get` answers, keyed by source.
#[derive(Default)]
struct Collector {
    merged: RefCell<Map<String, Value>>,
}

impl Responder for Collector {
    fn respond(&self, _request: &Request<'_>, source: Option<&str>, data: &Value, error: bool) {
        if error || data.is_null() {
            return;
        }
        let Some(source) = source else {
            return;
        };
        self.merged
            .borrow_mut()
            .insert(source.to_owned(), data.clone());
    }
}

/// Discards answers to internally issued `config-set` broadcasts.
struct Discard;

impl Responder for Discard {
    fn respond(&self, request: &Request<'_>, source: Option<&str>, data: &Value, error: bool) {
        if error {
            debug!("{}: {:?} answered {}", request.name(), source, data);
        }
    }
}

pub struct ConfigPipeline {
    bus: EventBus,
    store: Mutex<Box<dyn Store>>,
    /// Serializes whole saves so two merges never interleave their writes.
    saving: Mutex<()>,
}

impl ConfigPipeline {
    pub fn new(bus: &EventBus, store: Box<dyn Store>) -> Self {
        Self {
            bus: bus.clone(),
            store: Mutex::new(store),
            saving: Mutex::new(()),
        }
    }

    /// Read the stored document and hand every component its slice.
    /// Returns whether a document was found.
    pub fn load(&self) -> Result<bool> {
        let Some(doc) = self.read()? else {
            info!("config: nothing stored, using defaults");
            return Ok(false);
        };
        if let Err(e) = json::check(&doc) {
            warn!("config: stored document rejected: {e}");
            return Err(e);
        }
        self.apply(&doc);
        info!("config: loaded");
        Ok(true)
    }

    /// Merge every component's config and write it.
    pub fn save(&self) -> Result<()> {
        let _saving = self.saving.lock().unwrap_or_else(PoisonError::into_inner);
        let doc = self.collect();
        json::check(&doc)?;
        self.store().write(&doc).map_err(|e| {
            warn!("config: save failed: {e}");
            Error::from(e)
        })?;
        debug!("config: saved {} slices", doc.as_object().map_or(0, Map::len));
        Ok(())
    }

    /// Erase the stored document and let every component restore defaults.
    pub fn reset(&self) -> Result<()> {
        self.store().reset().map_err(|e| {
            warn!("config: reset failed: {e}");
            Error::from(e)
        })?;
        self.apply(&Value::Null);
        info!("config: reset to defaults");
        Ok(())
    }

    /// The currently stored document.
    pub fn read(&self) -> Result<Option<Value>> {
        Ok(self.store().read()?)
    }

    /// The document `save()` would write right now.
    pub fn collect(&self) -> Value {
        let collector = Collector::default();
        Request::new(verbs::CONFIG_GET, 0, None, &Value::Null, &collector).publish(&self.bus);
        Value::Object(collector.merged.into_inner())
    }

    fn apply(&self, doc: &Value) {
        Request::new(verbs::CONFIG_SET, 0, None, doc, &Discard).publish(&self.bus);
    }

    fn store(&self) -> MutexGuard<'_, Box<dyn Store>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
