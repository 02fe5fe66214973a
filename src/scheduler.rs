//! Telemetry scheduler.
//!
//! Wraps the telemetry [`PeriodicTimer`].  The board controller starts it
//! when a peer connects and stops it on disconnect; every firing reaches the
//! main loop as [`Event::TelemetryTick`](crate::events::Event::TelemetryTick)
//! and runs one sense-and-send cycle there.
//!
//! ```text
//!   timer ──tick──▶ EventQueue ──▶ main loop ──▶ should_run(now)?
//!                                                  │ yes        │ no
//!                                                  ▼            ▼
//!                                              poll + send   skip (logged)
//! ```
//!
//! A cycle is synchronous and can outlast a short period, in which case
//! ticks pile up in the queue.  [`TelemetryScheduler::should_run`] coalesces
//! them: a tick arriving less than half a period after the previous cycle
//! started is skipped, so a backlog never turns into back-to-back cycles.
//! Ticks that were queued before `stop()` are skipped as well.

use log::{debug, info};

use crate::app::ports::PeriodicTimer;

pub struct TelemetryScheduler<T: PeriodicTimer> {
    timer: T,
    interval_ms: u32,
    running: bool,
    last_cycle_us: Option<u64>,
    skipped: u32,
}

impl<T: PeriodicTimer> TelemetryScheduler<T> {
    pub fn new(timer: T) -> Self {
        Self {
            timer,
            interval_ms: 0,
            running: false,
            last_cycle_us: None,
            skipped: 0,
        }
    }

    /// Start (or restart) the periodic telemetry timer.
    pub fn start(&mut self, interval_ms: u32) {
        self.timer.stop();
        self.interval_ms = interval_ms;
        self.last_cycle_us = None;
        self.timer.start(interval_ms);
        self.running = true;
        info!("TELEM: started, every {} ms", interval_ms);
    }

    pub fn stop(&mut self) {
        if self.running {
            info!("TELEM: stopped ({} backlog ticks skipped)", self.skipped);
        }
        self.timer.stop();
        self.running = false;
        self.skipped = 0;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Period of the current (or last) run.
    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Apply a new interval.  Only takes effect immediately while running;
    /// otherwise the next `start` picks it up.
    pub fn restart_if_running(&mut self, interval_ms: u32) {
        if self.running && interval_ms != self.interval_ms {
            info!("TELEM: interval {} -> {} ms", self.interval_ms, interval_ms);
            self.start(interval_ms);
        }
    }

    /// Decide whether a tick delivered at `now_us` runs a cycle.  Returns
    /// `true` and records the cycle start when it does.
    pub fn should_run(&mut self, now_us: u64) -> bool {
        if !self.running {
            debug!("TELEM: tick after stop ignored");
            return false;
        }
        let half_period_us = u64::from(self.interval_ms) * 1000 / 2;
        if let Some(last) = self.last_cycle_us {
            if now_us.saturating_sub(last) < half_period_us {
                self.skipped += 1;
                debug!(
                    "TELEM: tick {} us after previous cycle, skipped",
                    now_us.saturating_sub(last)
                );
                return false;
            }
        }
        self.last_cycle_us = Some(now_us);
        true
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }
}
