//! Task notification: one pending wake-up that a sleeping task takes.
//!
//! Mirrors the FreeRTOS direct-to-task notify used by long-running tasks:
//! `notify()` from any task sets the flag, `wait()` sleeps until the flag is
//! set or the timeout passes, and clears it.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Clone, Default)]
pub struct Notify {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Notify {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        let (flag, cv) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cv.notify_all();
    }

    /// Sleep up to `timeout`. Returns `true` when woken by a notification.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, cv) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut pending, _) = cv
            .wait_timeout_while(guard, timeout, |pending| !*pending)
            .unwrap_or_else(PoisonError::into_inner);
        core::mem::take(&mut *pending)
    }

    /// Clear and return the pending flag without sleeping.
    pub fn take(&self) -> bool {
        let (flag, _) = &*self.inner;
        core::mem::take(&mut *flag.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl core::fmt::Debug for Notify {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Notify").finish_non_exhaustive()
    }
}
