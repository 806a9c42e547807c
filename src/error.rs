//! Unified error types for the component kernel.
//!
//! Every variant is cheap to copy so it can be attached to a Response,
//! logged, and returned to the caller without allocation. The wire form of
//! an error is a JSON array `[code, message]`, which transports forward to
//! the UI unchanged.

use core::fmt;

use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Top-level kernel error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The component already has an asynchronous request in flight.
    InvalidState,
    /// Nobody on the bus answered the request.
    Unhandled,
    /// The request reached a component that cannot serve it this way.
    Unsupported,
    /// A document exceeds the persisted size limit.
    TooLarge,
    /// A payload did not have the expected shape.
    Invalid(&'static str),
    /// A sensor with the same uid is already registered.
    DuplicateSensor,
    /// A sensor uid does not fit the fixed-capacity name buffer.
    NameTooLong,
    /// The persistence backend failed.
    Store(StoreError),
}

impl Error {
    /// Stable identifier sent on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidState => "invalid-state",
            Self::Unhandled => "unhandled",
            Self::Unsupported => "unsupported",
            Self::TooLarge => "too-large",
            Self::Invalid(_) => "invalid-argument",
            Self::DuplicateSensor => "duplicate-sensor",
            Self::NameTooLong => "name-too-long",
            Self::Store(_) => "store",
        }
    }

    /// Error payload carried by a Response.
    pub fn to_value(&self) -> Value {
        json!([self.code(), self.to_string()])
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState => write!(f, "another request is still pending"),
            Self::Unhandled => write!(f, "request was not handled"),
            Self::Unsupported => write!(f, "operation not supported by this transport"),
            Self::TooLarge => write!(f, "document too large"),
            Self::Invalid(msg) => write!(f, "invalid argument: {msg}"),
            Self::DuplicateSensor => write!(f, "sensor uid already registered"),
            Self::NameTooLong => write!(f, "sensor uid too long"),
            Self::Store(e) => write!(f, "store: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// The persisted blob failed its integrity check or did not decode.
    Corrupted,
    /// The backend ran out of space.
    Full,
    /// Any other backend failure.
    Io,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "data corrupted"),
            Self::Full => write!(f, "storage full"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
