//! LED and timer drivers.

pub mod hw_timer;
pub mod led_patterns;
pub mod status_led;
