//! Periodic timers on ESP-IDF's esp_timer API.
//!
//! Each timer pushes one fixed event into [`EVENTS`] per period and never
//! runs application code itself.  Status ticks are tagged with the timer's
//! generation at the moment they fire.  Callbacks execute in the esp_timer task
//! (not ISR), where pushing into the critical-section channel is safe.
//!
//! On host targets [`SimTimer`] stands in: time only moves when a test
//! calls [`SimTimer::advance`].

use crate::app::ports::PeriodicTimer;
use crate::events::Event;

#[cfg(target_os = "espidf")]
use crate::events::EVENTS;
#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicU32, Ordering};
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(target_os = "espidf")]
use log::{error, info};

/// Which event a timer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Tick {
    Status = 0,
    Telemetry = 1,
}

impl Tick {
    pub fn event(self, generation: u32) -> Event {
        match self {
            Tick::Status => Event::StatusTick(generation),
            Tick::Telemetry => Event::TelemetryTick,
        }
    }

    #[cfg(target_os = "espidf")]
    fn from_arg(arg: usize) -> Self {
        if arg == Tick::Telemetry as usize {
            Tick::Telemetry
        } else {
            Tick::Status
        }
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF
// ───────────────────────────────────────────────────────────────

/// Current generation per [`Tick`] kind, read by the C callback.
#[cfg(target_os = "espidf")]
static GENERATION: [AtomicU32; 2] = [AtomicU32::new(0), AtomicU32::new(0)];

#[cfg(target_os = "espidf")]
unsafe extern "C" fn tick_cb(arg: *mut core::ffi::c_void) {
    let tick = Tick::from_arg(arg as usize);
    let generation = GENERATION[tick as usize].load(Ordering::Acquire);
    EVENTS.push(tick.event(generation));
}

#[cfg(target_os = "espidf")]
pub struct EspPeriodicTimer {
    handle: esp_timer_handle_t,
    tick: Tick,
    running: bool,
}

#[cfg(target_os = "espidf")]
impl EspPeriodicTimer {
    /// Create a stopped timer.  `name` must be NUL-terminated.
    pub fn new(name: &'static core::ffi::CStr, tick: Tick) -> anyhow::Result<Self> {
        let args = esp_timer_create_args_t {
            callback: Some(tick_cb),
            arg: tick as usize as *mut core::ffi::c_void,
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
            name: name.as_ptr(),
            skip_unhandled_events: true,
        };
        let mut handle: esp_timer_handle_t = core::ptr::null_mut();
        // SAFETY: args outlives the call; the handle is owned by this struct.
        let ret = unsafe { esp_timer_create(&args, &mut handle) };
        if ret != ESP_OK as i32 {
            anyhow::bail!("esp_timer_create({:?}) failed, rc={}", name, ret);
        }
        Ok(Self {
            handle,
            tick,
            running: false,
        })
    }
}

#[cfg(target_os = "espidf")]
impl PeriodicTimer for EspPeriodicTimer {
    fn start(&mut self, period_ms: u32) {
        self.stop();
        GENERATION[self.tick as usize].fetch_add(1, Ordering::AcqRel);
        // SAFETY: handle is valid for the lifetime of self.
        let ret = unsafe { esp_timer_start_periodic(self.handle, u64::from(period_ms) * 1000) };
        if ret == ESP_OK as i32 {
            self.running = true;
            info!("hw_timer: {:?} every {} ms", self.tick, period_ms);
        } else {
            error!("hw_timer: {:?} start failed (rc={})", self.tick, ret);
        }
    }

    fn stop(&mut self) {
        if self.running {
            // SAFETY: handle is valid; stopping an idle timer is only an error code.
            unsafe {
                esp_timer_stop(self.handle);
            }
            self.running = false;
        }
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn generation(&self) -> u32 {
        GENERATION[self.tick as usize].load(Ordering::Acquire)
    }
}

#[cfg(target_os = "espidf")]
impl Drop for EspPeriodicTimer {
    fn drop(&mut self) {
        self.stop();
        // SAFETY: stopped above; the handle is not used again.
        unsafe {
            esp_timer_delete(self.handle);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

/// Host timer driven by explicit time steps.
#[derive(Debug)]
pub struct SimTimer {
    tick: Tick,
    period_ms: Option<u32>,
    elapsed_ms: u32,
    starts: u32,
    generation: u32,
}

impl SimTimer {
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            period_ms: None,
            elapsed_ms: 0,
            starts: 0,
            generation: 0,
        }
    }

    /// Move time forward; returns one event per period boundary crossed.
    pub fn advance(&mut self, ms: u32) -> Vec<Event> {
        let Some(period) = self.period_ms else {
            return Vec::new();
        };
        self.elapsed_ms += ms;
        let fired = self.elapsed_ms / period;
        self.elapsed_ms %= period;
        (0..fired).map(|_| self.tick.event(self.generation)).collect()
    }

    pub fn period_ms(&self) -> Option<u32> {
        self.period_ms
    }

    /// How many times `start` was called.
    pub fn starts(&self) -> u32 {
        self.starts
    }
}

impl PeriodicTimer for SimTimer {
    fn start(&mut self, period_ms: u32) {
        // Restarting discards the partial period, like esp_timer does.
        self.period_ms = Some(period_ms.max(1));
        self.elapsed_ms = 0;
        self.starts += 1;
        self.generation = self.generation.wrapping_add(1);
    }

    fn stop(&mut self) {
        self.period_ms = None;
        self.elapsed_ms = 0;
    }

    fn is_running(&self) -> bool {
        self.period_ms.is_some()
    }

    fn generation(&self) -> u32 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_period() {
        let mut t = SimTimer::new(Tick::Telemetry);
        assert!(t.advance(10_000).is_empty());
        t.start(1000);
        assert_eq!(t.advance(999).len(), 0);
        assert_eq!(t.advance(1).len(), 1);
        assert_eq!(t.advance(2500), [Event::TelemetryTick, Event::TelemetryTick]);
    }

    #[test]
    fn restart_discards_partial_period() {
        let mut t = SimTimer::new(Tick::Status);
        t.start(500);
        t.advance(400);
        t.start(500);
        assert!(t.advance(400).is_empty());
        assert_eq!(t.advance(100), [Event::StatusTick(2)]);
        assert_eq!(t.starts(), 2);
        assert_eq!(t.generation(), 2);
    }

    #[test]
    fn stopped_timer_is_silent() {
        let mut t = SimTimer::new(Tick::Status);
        t.start(500);
        t.stop();
        assert!(!t.is_running());
        assert!(t.advance(5000).is_empty());
    }
}
