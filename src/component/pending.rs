//! Slot for a component's one asynchronous request.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::error::Error;
use crate::events::{EventBus, Request, Response, verbs};

/// At most one pending [`Response`] per component.
///
/// The handler calls [`begin`](Self::begin) from the event callback; the
/// worker task reports with [`progress`](Self::progress) and finishes with
/// [`complete`](Self::complete). Cancellation is cooperative: the worker
/// polls [`is_cancelled`](Self::is_cancelled) at its own yield points.
#[derive(Debug, Default)]
pub struct PendingResponse {
    slot: Mutex<Option<Response>>,
    cancelled: AtomicBool,
}

impl PendingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take `req` over. Answers the caller with an error and returns it when
    /// a request is already pending or the transport can't go async.
    pub fn begin(&self, req: &Request<'_>) -> Result<(), Error> {
        let mut slot = self.lock();
        if slot.is_some() {
            req.respond_error(None, &Error::InvalidState);
            return Err(Error::InvalidState);
        }
        let Some(response) = req.make_response() else {
            req.respond_error(None, &Error::Unsupported);
            return Err(Error::Unsupported);
        };
        *slot = Some(response);
        self.cancelled.store(false, Ordering::Release);
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    /// Name of the pending request.
    pub fn name(&self) -> Option<String> {
        self.lock().as_ref().map(|r| r.name().to_owned())
    }

    /// Ask the worker to stop. Returns `false` when nothing is pending.
    pub fn cancel(&self) -> bool {
        let slot = self.lock();
        if slot.is_none() {
            return false;
        }
        self.cancelled.store(true, Ordering::Release);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Serve the `cancel` verb. Returns `false` for other requests.
    pub fn handle_cancel(&self, req: &Request<'_>) -> bool {
        if !req.is(verbs::CANCEL) {
            return false;
        }
        if self.cancel() {
            req.respond_ok(None);
        } else {
            req.respond_error(None, &Error::InvalidState);
        }
        true
    }

    /// Publish a partial result. Returns `false` when nothing is pending.
    pub fn progress(&self, bus: &EventBus, data: Value) -> bool {
        let snapshot = {
            let mut slot = self.lock();
            let Some(response) = slot.as_mut() else {
                return false;
            };
            response.set_partial(true);
            response.set_data(data);
            response.clone()
        };
        // Published outside the lock: subscribers may call back into us.
        snapshot.publish(bus);
        true
    }

    /// Publish the final result and free the slot.
    pub fn complete(&self, bus: &EventBus, result: Result<Value, Error>) -> bool {
        let Some(response) = self.lock().take() else {
            return false;
        };
        self.cancelled.store(false, Ordering::Release);
        response.complete(bus, result);
        true
    }

    fn lock(&self) -> MutexGuard<'_, Option<Response>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
