//! Chip-level operations.

use log::warn;

/// Reboot the chip. On the host the process keeps running.
pub fn restart() {
    warn!("system: restarting");
    #[cfg(target_os = "espidf")]
    {
        // SAFETY: esp_restart never returns; every task is torn down.
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }
    }
}

/// Free heap in bytes.
pub fn free_heap() -> u32 {
    #[cfg(target_os = "espidf")]
    {
        // SAFETY: reads an allocator counter.
        unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
    }

    #[cfg(not(target_os = "espidf"))]
    {
        0
    }
}
