//! Link status indicator.
//!
//! Drives the single RGB status LED from link transitions.  Two patterns,
//! both paced by one periodic timer:
//!
//! | Pattern   | Shape                                           | Period  |
//! |-----------|-------------------------------------------------|---------|
//! | Searching | toggle off ↔ blue                               | 500 ms  |
//! | Connected | 3 blocking green flashes, then one flash a tick | 60 s    |
//!
//! Starting a pattern always stops the timer first, so the indicator can
//! never have two schedules live.  Ticks from an earlier schedule that were
//! still queued at the switch are ignored.  A flash is off → on → off with 200 ms
//! holds and blocks the caller; that is the visible "connected" feedback.

use embedded_hal::delay::DelayNs;
use log::debug;

use crate::app::ports::{PeriodicTimer, Rgb, RgbLed, StatusSignal};

pub const SEARCHING_TOGGLE_MS: u32 = 500;
pub const HEARTBEAT_PERIOD_MS: u32 = 60_000;
pub const FLASH_HOLD_MS: u32 = 200;
pub const CONNECT_BURST_FLASHES: usize = 3;

// ── Colours ───────────────────────────────────────────────────

pub const COLOUR_OFF: Rgb = (0, 0, 0);
pub const COLOUR_SEARCHING: Rgb = (0, 0, 128); // Blue
pub const COLOUR_CONNECTED: Rgb = (0, 128, 0); // Green

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Off,
    Searching,
    Connected,
}

pub struct StatusIndicator<L: RgbLed, T: PeriodicTimer, D: DelayNs> {
    led: L,
    timer: T,
    delay: D,
    pattern: Pattern,
    lit: bool,
}

impl<L: RgbLed, T: PeriodicTimer, D: DelayNs> StatusIndicator<L, T, D> {
    pub fn new(led: L, timer: T, delay: D) -> Self {
        Self {
            led,
            timer,
            delay,
            pattern: Pattern::Off,
            lit: false,
        }
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    /// Stop any pattern and switch the LED off.
    pub fn off(&mut self) {
        self.timer.stop();
        self.pattern = Pattern::Off;
        self.set(COLOUR_OFF);
    }

    pub fn led(&self) -> &L {
        &self.led
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    fn set(&mut self, colour: Rgb) {
        self.led.set_colour(colour);
        self.lit = colour != COLOUR_OFF;
    }

    fn flash(&mut self, colour: Rgb) {
        self.set(COLOUR_OFF);
        self.delay.delay_ms(FLASH_HOLD_MS);
        self.set(colour);
        self.delay.delay_ms(FLASH_HOLD_MS);
        self.set(COLOUR_OFF);
    }
}

impl<L: RgbLed, T: PeriodicTimer, D: DelayNs> StatusSignal for StatusIndicator<L, T, D> {
    fn connected_signal(&mut self) {
        self.timer.stop();
        self.pattern = Pattern::Connected;
        for _ in 0..CONNECT_BURST_FLASHES {
            self.flash(COLOUR_CONNECTED);
        }
        self.timer.start(HEARTBEAT_PERIOD_MS);
        debug!("LED: connected burst done, heartbeat every {} ms", HEARTBEAT_PERIOD_MS);
    }

    fn disconnected_signal(&mut self) {
        self.timer.stop();
        self.pattern = Pattern::Searching;
        self.set(COLOUR_OFF);
        self.timer.start(SEARCHING_TOGGLE_MS);
    }

    fn on_tick(&mut self, generation: u32) {
        if generation != self.timer.generation() {
            debug!("LED: stale tick (generation {}) ignored", generation);
            return;
        }
        match self.pattern {
            Pattern::Searching => {
                if self.lit {
                    self.set(COLOUR_OFF);
                } else {
                    self.set(COLOUR_SEARCHING);
                }
            }
            Pattern::Connected => self.flash(COLOUR_CONNECTED),
            // A tick queued before `off()` was processed.
            Pattern::Off => {}
        }
    }
}
