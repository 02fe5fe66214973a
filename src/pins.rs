//! GPIO / peripheral assignments for the sensor board.
//!
//! Single source of truth; `main` takes the matching esp-idf-hal
//! peripherals and logs these numbers at boot.

/// WS2812 status LED data line.
pub const LED_GPIO: i32 = 27;

/// RMT TX channel clocking the status LED.
pub const LED_RMT_CHANNEL: u8 = 0;
