//! Monotonic time.
//!
//! - **`target_os = "espidf"`**: `esp_timer_get_time()`, microseconds
//!   since boot from the ESP-IDF high-resolution timer.
//! - **host**: `std::time::Instant` measured from the first call in the
//!   process, for tests and simulation.

use crate::app::ports::Clock;

/// Microseconds since boot.
#[cfg(target_os = "espidf")]
pub fn uptime_us() -> u64 {
    (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
}

/// Microseconds since the first call in this process.
#[cfg(not(target_os = "espidf"))]
pub fn uptime_us() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static BOOT: OnceLock<Instant> = OnceLock::new();
    BOOT.get_or_init(Instant::now).elapsed().as_micros() as u64
}

pub fn uptime_ms() -> u64 {
    uptime_us() / 1000
}

/// [`Clock`] backed by the system monotonic timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    fn uptime_us(&self) -> u64 {
        uptime_us()
    }
}
