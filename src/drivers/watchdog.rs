//! Task Watchdog Timer (TWDT) driver.
//!
//! The timeout is configured once at boot with [`Watchdog::configure`].
//! Every long-running task (App housekeeping, sensor scheduler, state
//! emitter) subscribes itself with [`Watchdog::subscribe`] and calls
//! `feed()` on each loop; their sleeps are capped below the timeout.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use log::info;

pub struct Watchdog {
    #[cfg(target_os = "espidf")]
    subscribed: bool,
    #[cfg(not(target_os = "espidf"))]
    feeds: core::sync::atomic::AtomicU32,
}

impl Watchdog {
    /// Set the TWDT timeout; the watchdog panics the chip on expiry.
    pub fn configure(timeout_ms: u32) {
        #[cfg(target_os = "espidf")]
        {
            let cfg = esp_task_wdt_config_t {
                timeout_ms,
                idle_core_mask: 0,
                trigger_panic: true,
            };
            // SAFETY: called from the boot task before other tasks subscribe.
            let ret = unsafe { esp_task_wdt_reconfigure(&cfg) };
            if ret == ESP_OK {
                info!("Watchdog: timeout {} ms, panic on trigger", timeout_ms);
            } else {
                log::warn!("TWDT reconfigure returned {} (may already be configured)", ret);
            }
        }

        #[cfg(not(target_os = "espidf"))]
        info!("Watchdog(sim): timeout {} ms", timeout_ms);
    }

    /// Subscribe the calling task.
    pub fn subscribe() -> Self {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: a null handle means the calling task.
            let ret = unsafe { esp_task_wdt_add(core::ptr::null_mut()) };
            let subscribed = ret == ESP_OK;
            if subscribed {
                info!("Watchdog: task subscribed");
            } else {
                log::warn!("Watchdog: failed to subscribe ({})", ret);
            }
            Self { subscribed }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            Self {
                feeds: core::sync::atomic::AtomicU32::new(0),
            }
        }
    }

    /// Reset the calling task's watchdog.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        {
            if self.subscribed {
                // SAFETY: only resets the calling task's own entry.
                unsafe {
                    esp_task_wdt_reset();
                }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        self.feeds
            .fetch_add(1, core::sync::atomic::Ordering::Relaxed);
    }

    /// Number of feeds so far (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn feeds(&self) -> u32 {
        self.feeds.load(core::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(target_os = "espidf")]
impl Drop for Watchdog {
    fn drop(&mut self) {
        if self.subscribed {
            // SAFETY: removes the calling task, which subscribed itself.
            unsafe {
                esp_task_wdt_delete(core::ptr::null_mut());
            }
        }
    }
}
