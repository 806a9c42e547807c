//! Helpers for the JSON documents carried by requests and persisted by the
//! config pipeline.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};

/// Largest serialized document accepted for a response or a persisted blob.
pub const MAX_DOCUMENT_SIZE: usize = 4000;

static NULL: Value = Value::Null;

/// Validate a document before it is attached to a response or persisted.
/// Returns its serialized size.
pub fn check(value: &Value) -> Result<usize> {
    let len = serde_json::to_vec(value)
        .map_err(|_| Error::Invalid("document is not serializable"))?
        .len();
    if len > MAX_DOCUMENT_SIZE {
        return Err(Error::TooLarge);
    }
    Ok(len)
}

/// The part of a broadcast document addressed to `key`.
///
/// A `null` document is delivered to everyone as `null` (restore defaults);
/// an object yields the value under `key`, or `None` when the key is absent.
pub fn slice<'v>(doc: &'v Value, key: &str) -> Option<&'v Value> {
    match doc {
        Value::Null => Some(&NULL),
        Value::Object(map) => map.get(key),
        _ => None,
    }
}

/// `{"error": …}` objects are answers that report a failure.
pub fn is_error_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.len() == 1 && map.contains_key("error"))
}

/// Assign `source` to `target` when it deserializes and differs.
/// Sets `changed` when the assignment happened.
pub fn compare_set<T>(target: &mut T, source: Option<&Value>, changed: &mut bool) -> bool
where
    T: DeserializeOwned + PartialEq,
{
    let Some(source) = source else {
        return false;
    };
    match T::deserialize(source) {
        Ok(value) if value != *target => {
            *target = value;
            *changed = true;
            true
        }
        _ => false,
    }
}

/// Serialize a config or state struct, or `None` when it cannot be represented.
pub fn to_value<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}

/// Round numbers to `precision` decimal places. Other values pass through.
pub fn round(value: Value, precision: u8) -> Value {
    match value.as_f64() {
        Some(f) if !value.is_i64() && !value.is_u64() => {
            let scale = 10f64.powi(i32::from(precision));
            let rounded = (f * scale).round() / scale;
            serde_json::Number::from_f64(rounded).map_or(value, Value::Number)
        }
        _ => value,
    }
}
