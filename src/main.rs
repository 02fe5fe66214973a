//! SensorLink Firmware: Main Entry Point
//!
//! BLE telemetry beacon: advertises a UART-style GATT service, streams
//! sensor readings as JSON lines while a peer is attached and accepts
//! configuration updates on the RX characteristic.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BleRadio        NeoPixelLed     NvsBlobStore    MonotonicClock│
//! │  (Radio)         (RgbLed)        (BlobStore)     (Clock)       │
//! │  EspPeriodicTimer ×2 (status pattern, telemetry)               │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  LinkStateMachine ── BoardController (pure logic)      │    │
//! │  │  StatusIndicator · TelemetryScheduler · ConfigStore    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  EVENTS queue ◀── BLE / timer callbacks                        │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::peripherals::Peripherals;
use log::info;
use rand::rngs::OsRng;

use sensorlink::adapters::ble::BleRadio;
use sensorlink::adapters::device_id::DeviceIdentity;
use sensorlink::adapters::nvs::NvsBlobStore;
use sensorlink::adapters::time::MonotonicClock;
use sensorlink::app::service::{BoardController, Device};
use sensorlink::drivers::hw_timer::{EspPeriodicTimer, Tick};
use sensorlink::drivers::led_patterns::StatusIndicator;
use sensorlink::drivers::status_led::NeoPixelLed;
use sensorlink::events::EVENTS;
use sensorlink::pins;
use sensorlink::scheduler::TelemetryScheduler;
use sensorlink::sensors::{ReaderTable, SensorRegistry};
use sensorlink::store::ConfigStore;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  SensorLink v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Storage + identity ─────────────────────────────────
    let mut nvs = NvsBlobStore::init()?;
    let identity = DeviceIdentity::load_or_ephemeral(&mut nvs, &mut OsRng);
    info!("Device ID: {}", identity);

    // ── 3. Load config (or defaults) ──────────────────────────
    let store = ConfigStore::load(nvs, identity);

    // ── 4. Peripherals ────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    info!(
        "Status LED on GPIO{} (RMT channel {})",
        pins::LED_GPIO,
        pins::LED_RMT_CHANNEL
    );
    let led = NeoPixelLed::new(peripherals.rmt.channel0, peripherals.pins.gpio27)?;
    let status_timer = EspPeriodicTimer::new(c"status", Tick::Status)?;
    let telemetry_timer = EspPeriodicTimer::new(c"telemetry", Tick::Telemetry)?;

    // ── 5. Radio ──────────────────────────────────────────────
    let radio = BleRadio::start()?;

    // ── 6. Application core ───────────────────────────────────
    let indicator = StatusIndicator::new(led, status_timer, FreeRtos);
    let board = BoardController::new(
        store,
        SensorRegistry::new(ReaderTable::builtin(), MonotonicClock::new()),
        TelemetryScheduler::new(telemetry_timer),
    );
    let mut device = Device::new(radio, indicator, board);

    info!("System ready. Entering event loop.");

    // ── 7. Event loop ─────────────────────────────────────────
    futures_lite::future::block_on(device.run(&EVENTS));
    Ok(())
}
