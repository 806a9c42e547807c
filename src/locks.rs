//! Named advisory locks shared between otherwise unrelated subsystems.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Held while sensors are polled and while a firmware image is written.
pub const OTA: &str = "ota";

#[derive(Clone, Default)]
pub struct Locks {
    named: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Locks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock registered under `name`, created on first use.
    pub fn get(&self, name: &str) -> Arc<Mutex<()>> {
        let mut named = self.named.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(named.entry(name.to_owned()).or_default())
    }

    /// Run `f` holding the lock `name`.
    pub fn with<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let lock = self.get(name);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Run `f` only if the lock `name` is free right now.
    pub fn try_with<R>(&self, name: &str, f: impl FnOnce() -> R) -> Option<R> {
        let lock = self.get(name);
        let guard = match lock.try_lock() {
            Ok(guard) => guard,
            Err(std::sync::TryLockError::Poisoned(p)) => p.into_inner(),
            Err(std::sync::TryLockError::WouldBlock) => return None,
        };
        let result = f();
        drop(guard);
        Some(result)
    }
}
