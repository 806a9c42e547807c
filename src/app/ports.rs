//! Port traits: the boundary between the kernel and the platform.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ App / ConfigPipeline / Scheduler
//! ```
//!
//! [`NvsStore`](crate::adapters::nvs::NvsStore) and
//! [`MonotonicClock`](crate::adapters::time::MonotonicClock) implement these
//! on the device; tests plug in in-memory stand-ins.

use serde_json::Value;

use crate::error::StoreError;

// ───────────────────────────────────────────────────────────────
// Store port (driven adapter: kernel ↔ persisted config)
// ───────────────────────────────────────────────────────────────

/// Backend holding the one merged configuration document.
///
/// Only "last write wins" is required. Implementations SHOULD write
/// atomically so a power loss never leaves half a document behind.
pub trait Store: Send {
    /// The persisted document, or `None` on first boot.
    fn read(&mut self) -> Result<Option<Value>, StoreError>;

    /// Replace the persisted document.
    fn write(&mut self, doc: &Value) -> Result<(), StoreError>;

    /// Forget the persisted document.
    fn reset(&mut self) -> Result<(), StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds since boot.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}
