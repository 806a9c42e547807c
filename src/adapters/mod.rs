//! Adapters: concrete implementations of the kernel's port traits.
//!
//! | Adapter    | Implements   | Connects to                  |
//! |------------|--------------|------------------------------|
//! | `nvs`      | Store        | NVS flash / in-memory map    |
//! | `time`     | Clock        | ESP32 system timer / Instant |
//! | `log_sink` | SensorSink   | Serial log output            |

pub mod log_sink;
pub mod nvs;
pub mod time;
