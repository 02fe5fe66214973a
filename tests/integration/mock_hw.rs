//! Mock adapters for integration tests.
//!
//! Records every radio, LED, timer and storage call so tests can assert on
//! the full history without touching real peripherals.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use sensorlink::adapters::device_id::DeviceIdentity;
use sensorlink::app::ports::{BlobStore, Clock, PeriodicTimer, Radio, Rgb, RgbLed};
use sensorlink::app::service::{BoardController, Device};
use sensorlink::drivers::led_patterns::StatusIndicator;
use sensorlink::error::{RadioError, StorageError};
use sensorlink::events::{Event, Payload};
use sensorlink::link::RadioEvent;
use sensorlink::scheduler::TelemetryScheduler;
use sensorlink::sensors::{ReaderTable, SensorRegistry};
use sensorlink::store::ConfigStore;
use serde_json::Value;

// ── MockRadio ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MockRadio {
    pub adverts: Vec<Vec<u8>>,
    pub notifications: Vec<Vec<u8>>,
    pub fail_notify: bool,
}

#[allow(dead_code)]
impl MockRadio {
    /// Every notification parsed as one JSON document.
    pub fn sent_json(&self) -> Vec<Value> {
        self.notifications
            .iter()
            .map(|n| {
                assert_eq!(n.last(), Some(&b'\n'), "frame must end in a newline");
                serde_json::from_slice(n).expect("notification is not JSON")
            })
            .collect()
    }

    pub fn last_advertised_name(&self) -> Option<&[u8]> {
        self.adverts.last().map(|adv| &adv[5..])
    }
}

impl Radio for MockRadio {
    fn advertise(&mut self, adv_data: &[u8]) -> Result<(), RadioError> {
        self.adverts.push(adv_data.to_vec());
        Ok(())
    }

    fn notify(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        if self.fail_notify {
            return Err(RadioError::NotifyFailed(-1));
        }
        self.notifications.push(payload.to_vec());
        Ok(())
    }
}

// ── MockLed ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockLed {
    pub history: Vec<Rgb>,
}

impl RgbLed for MockLed {
    fn set_colour(&mut self, colour: Rgb) {
        self.history.push(colour);
    }
}

// ── MockTimer ─────────────────────────────────────────────────

/// Counts schedules and flags any `start` on an already running timer.
#[derive(Default)]
pub struct MockTimer {
    pub period_ms: Option<u32>,
    pub starts: u32,
    pub stops: u32,
    pub overlapping_starts: u32,
}

impl PeriodicTimer for MockTimer {
    fn start(&mut self, period_ms: u32) {
        if self.period_ms.is_some() {
            self.overlapping_starts += 1;
        }
        self.period_ms = Some(period_ms);
        self.starts += 1;
    }

    fn stop(&mut self) {
        self.period_ms = None;
        self.stops += 1;
    }

    fn is_running(&self) -> bool {
        self.period_ms.is_some()
    }

    fn generation(&self) -> u32 {
        self.starts
    }
}

// ── RecordingDelay ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingDelay {
    pub total_ns: u64,
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

// ── MemStore ──────────────────────────────────────────────────

/// In-memory blob store with write failure injection.
#[derive(Default, Clone)]
pub struct MemStore {
    pub blobs: HashMap<String, Vec<u8>>,
    pub writes: u32,
    pub fail_writes: bool,
}

impl BlobStore for MemStore {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blobs.get(name).cloned())
    }

    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Full);
        }
        self.writes += 1;
        self.blobs.insert(name.into(), data.to_vec());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        self.blobs.remove(name);
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.blobs.contains_key(name)
    }
}

// ── FakeClock ─────────────────────────────────────────────────

/// Shared manual clock; clones see the same time.
#[derive(Default, Clone)]
pub struct FakeClock(Rc<Cell<u64>>);

#[allow(dead_code)]
impl FakeClock {
    pub fn advance_ms(&self, ms: u64) {
        self.0.set(self.0.get() + ms * 1000);
    }
}

impl Clock for FakeClock {
    fn uptime_us(&self) -> u64 {
        self.0.get()
    }
}

// ── Assembled device ──────────────────────────────────────────

pub type MockIndicator = StatusIndicator<MockLed, MockTimer, RecordingDelay>;
pub type MockDevice = Device<MockRadio, MockIndicator, MemStore, MockTimer, FakeClock>;

pub const TEST_ID: &str = "TestBoard0000001";

pub fn identity() -> DeviceIdentity {
    DeviceIdentity::parse(TEST_ID).expect("valid test id")
}

/// A booted device over `store`, advertising, no peer.
pub fn boot(store: MemStore, clock: &FakeClock) -> MockDevice {
    let indicator = StatusIndicator::new(
        MockLed::default(),
        MockTimer::default(),
        RecordingDelay::default(),
    );
    let board = BoardController::new(
        ConfigStore::load(store, identity()),
        SensorRegistry::new(ReaderTable::builtin(), clock.clone()),
        TelemetryScheduler::new(MockTimer::default()),
    );
    Device::new(MockRadio::default(), indicator, board)
}

#[allow(dead_code)]
pub fn connect(dev: &mut MockDevice) {
    dev.dispatch(Event::Radio(RadioEvent::PeerConnected));
}

#[allow(dead_code)]
pub fn disconnect(dev: &mut MockDevice) {
    dev.dispatch(Event::Radio(RadioEvent::PeerDisconnected));
}

#[allow(dead_code)]
pub fn write(dev: &mut MockDevice, text: &str) {
    let payload = Payload::from_slice(text.as_bytes()).expect("payload fits");
    dev.dispatch(Event::Radio(RadioEvent::DataReceived(payload)));
}

/// A status tick from the indicator's current schedule.
#[allow(dead_code)]
pub fn status_tick(dev: &MockDevice) -> Event {
    Event::StatusTick(dev.machine().indicator().timer().generation())
}

#[allow(dead_code)]
pub fn radio(dev: &MockDevice) -> &MockRadio {
    dev.machine().link().radio()
}
