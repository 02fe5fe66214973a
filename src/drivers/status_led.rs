//! RGB status LED driver.
//!
//! A single WS2812 ("NeoPixel") on [`LED_GPIO`](crate::pins::LED_GPIO).
//!
//! ## Dual-target design
//!
//! On ESP-IDF: one RMT TX channel clocks out the 24-bit GRB frame.
//! On host/test: [`SimLed`] records every colour set.

use crate::app::ports::{Rgb, RgbLed};

#[cfg(target_os = "espidf")]
pub use esp::NeoPixelLed;

#[cfg(target_os = "espidf")]
mod esp {
    use core::time::Duration;

    use esp_idf_hal::gpio::OutputPin;
    use esp_idf_hal::peripheral::Peripheral;
    use esp_idf_hal::rmt::config::TransmitConfig;
    use esp_idf_hal::rmt::{FixedLengthSignal, PinState, Pulse, RmtChannel, TxRmtDriver};
    use log::warn;

    use crate::app::ports::{Rgb, RgbLed};

    /// WS2812 bit timings.
    const T0H_NS: u64 = 350;
    const T0L_NS: u64 = 800;
    const T1H_NS: u64 = 700;
    const T1L_NS: u64 = 600;

    pub struct NeoPixelLed<'d> {
        tx: TxRmtDriver<'d>,
        zero: (Pulse, Pulse),
        one: (Pulse, Pulse),
        current: Rgb,
    }

    impl<'d> NeoPixelLed<'d> {
        pub fn new<C: RmtChannel>(
            channel: impl Peripheral<P = C> + 'd,
            pin: impl Peripheral<P = impl OutputPin> + 'd,
        ) -> anyhow::Result<Self> {
            let config = TransmitConfig::new().clock_divider(1);
            let tx = TxRmtDriver::new(channel, pin, &config)?;
            let hz = tx.counter_clock()?;
            let pulse = |state, ns| Pulse::new_with_duration(hz, state, &Duration::from_nanos(ns));
            let zero = (pulse(PinState::High, T0H_NS)?, pulse(PinState::Low, T0L_NS)?);
            let one = (pulse(PinState::High, T1H_NS)?, pulse(PinState::Low, T1L_NS)?);
            let mut led = Self {
                tx,
                zero,
                one,
                current: (0, 0, 0),
            };
            led.set_colour((0, 0, 0));
            Ok(led)
        }

        fn write(&mut self, (r, g, b): Rgb) -> anyhow::Result<()> {
            let grb = (u32::from(g) << 16) | (u32::from(r) << 8) | u32::from(b);
            let mut signal = FixedLengthSignal::<24>::new();
            for i in 0..24 {
                let bit = grb & (1 << (23 - i)) != 0;
                signal.set(i, if bit { &self.one } else { &self.zero })?;
            }
            self.tx.start_blocking(&signal)?;
            Ok(())
        }
    }

    impl RgbLed for NeoPixelLed<'_> {
        fn set_colour(&mut self, colour: Rgb) {
            match self.write(colour) {
                Ok(()) => self.current = colour,
                Err(e) => warn!("LED: RMT write failed: {}", e),
            }
        }
    }
}

/// Host LED: remembers the current colour and the full history.
#[derive(Debug, Default)]
pub struct SimLed {
    current: Rgb,
    history: Vec<Rgb>,
}

impl SimLed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_colour(&self) -> Rgb {
        self.current
    }

    pub fn history(&self) -> &[Rgb] {
        &self.history
    }
}

impl RgbLed for SimLed {
    fn set_colour(&mut self, colour: Rgb) {
        self.current = colour;
        self.history.push(colour);
    }
}
