//! Subscriber registry.
//!
//! Slots are never removed: unsubscribing leaves a tombstone that a later
//! `subscribe` reuses, so an index held by a concurrent `publish` stays
//! valid. The registry lock is held only for slot bookkeeping, never while a
//! callback runs, so callbacks may subscribe, unsubscribe and publish.
//!
//! Each entry counts its running invocations. Unsubscribing tombstones the
//! slot and then waits on a condvar until the count drains, which makes
//! "no callback after `unsubscribe` returned" hold across tasks.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::cell::RefCell;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use log::debug;

use super::Event;

type Callback = Box<dyn Fn(&Event<'_>) + Send + Sync>;

struct Entry {
    id: u64,
    callback: Callback,
    /// Running invocations. Changed only with the registry lock held.
    inflight: AtomicUsize,
}

#[derive(Default)]
struct Registry {
    slots: Vec<Option<Arc<Entry>>>,
    next_id: u64,
}

#[derive(Default)]
struct Inner {
    registry: Mutex<Registry>,
    drained: Condvar,
}

thread_local! {
    /// Ids of the entries whose callbacks are running on this thread.
    static RUNNING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Cheaply clonable handle to the process-wide bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`. Dropping the returned handle unsubscribes it.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Event<'_>) + Send + Sync + 'static,
    {
        let mut reg = self.inner.lock();
        let id = reg.next_id;
        reg.next_id += 1;
        let entry = Arc::new(Entry {
            id,
            callback: Box::new(callback),
            inflight: AtomicUsize::new(0),
        });
        let index = if let Some(index) = reg.slots.iter().position(Option::is_none) {
            debug!("bus: reusing slot {index} for subscription {id}");
            reg.slots[index] = Some(entry);
            index
        } else {
            reg.slots.push(Some(entry));
            reg.slots.len() - 1
        };
        Subscription {
            bus: Arc::downgrade(&self.inner),
            index,
            id,
        }
    }

    /// Deliver `event` to every live subscriber in registration order.
    ///
    /// Subscribers added while this runs are visited if they land past the
    /// current position.
    pub fn publish(&self, event: &Event<'_>) {
        let mut index = 0;
        while let Some(slot) = self.inner.acquire(index) {
            if let Some(entry) = slot {
                self.inner.invoke(&entry, event);
            }
            index += 1;
        }
    }

    /// Deliver `event` newest subscriber first. Used for teardown.
    pub fn publish_backwards(&self, event: &Event<'_>) {
        let len = self.inner.lock().slots.len();
        for index in (0..len).rev() {
            if let Some(Some(entry)) = self.inner.acquire(index) {
                self.inner.invoke(&entry, event);
            }
        }
    }

    /// Live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().slots.iter().flatten().count()
    }

    /// Slots including tombstones.
    pub fn slot_count(&self) -> usize {
        self.inner.lock().slots.len()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` past the end, `Some(None)` for a tombstone, otherwise the entry
    /// with its in-flight count already raised.
    fn acquire(&self, index: usize) -> Option<Option<Arc<Entry>>> {
        let reg = self.lock();
        let slot = reg.slots.get(index)?;
        Some(slot.as_ref().map(|entry| {
            entry.inflight.fetch_add(1, Ordering::AcqRel);
            Arc::clone(entry)
        }))
    }

    fn invoke(&self, entry: &Arc<Entry>, event: &Event<'_>) {
        let _running = Running::enter(self, entry);
        (entry.callback)(event);
    }

    fn release(&self, entry: &Entry) {
        let _reg = self.lock();
        entry.inflight.fetch_sub(1, Ordering::AcqRel);
        self.drained.notify_all();
    }

    fn unsubscribe(&self, index: usize, id: u64) {
        let mut reg = self.lock();
        let entry = match reg.slots.get_mut(index) {
            Some(slot) if slot.as_ref().is_some_and(|e| e.id == id) => slot.take(),
            _ => None,
        };
        let Some(entry) = entry else {
            return;
        };
        // Invocations further up this thread's stack can't finish while we wait.
        let own = RUNNING.with(|running| running.borrow().iter().filter(|&&r| r == id).count());
        while entry.inflight.load(Ordering::Acquire) > own {
            reg = self
                .drained
                .wait(reg)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(reg);
        // The callback may own handles whose drop touches the registry.
        drop(entry);
    }
}

/// Marks an invocation as running; releases it even if the callback panics.
struct Running<'a> {
    inner: &'a Inner,
    entry: &'a Entry,
}

impl<'a> Running<'a> {
    fn enter(inner: &'a Inner, entry: &'a Entry) -> Self {
        RUNNING.with(|running| running.borrow_mut().push(entry.id));
        Self { inner, entry }
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        RUNNING.with(|running| {
            let mut running = running.borrow_mut();
            if let Some(pos) = running.iter().rposition(|&r| r == self.entry.id) {
                running.remove(pos);
            }
        });
        self.inner.release(self.entry);
    }
}

/// Owning handle of a bus registration.
///
/// Dropping it blocks until no other task is running the callback.
pub struct Subscription {
    bus: Weak<Inner>,
    index: usize,
    id: u64,
}

impl Subscription {
    /// Unsubscribe now. Same as dropping the handle.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.unsubscribe(self.index, self.id);
        }
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("index", &self.index)
            .field("id", &self.id)
            .finish()
    }
}
