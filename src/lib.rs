//! espkit: component kernel for ESP32 firmware.
//!
//! Drivers implement [`component::Component`] and talk to each other only
//! through the [`events::EventBus`]. The [`app::App`] boots them, persists
//! their configuration and answers the system verbs; the
//! [`scheduler::SensorScheduler`] polls every sensor device from one task.
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module, so the whole kernel runs on the host.

#![deny(unused_must_use)]

pub mod app;
pub mod component;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod json;
pub mod locks;
pub mod notify;
pub mod scheduler;
pub mod sensors;

pub mod adapters;
pub mod drivers;
