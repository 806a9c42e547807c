//! Chip services the kernel tasks run on: watchdog, pinned tasks, reboot.

pub mod system;
pub mod task_pin;
pub mod watchdog;
