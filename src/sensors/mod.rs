//! Sensor subsystem: the reader table and the telemetry poll cycle.
//!
//! Sensors are configured, not compiled in.  Each configured sensor names a
//! `reader_id`; the [`ReaderTable`] maps ids to plain functions registered
//! at boot.  A reader that does not exist, or one that fails, turns into an
//! error string in that sensor's field and the cycle carries on with the
//! next sensor.  A cycle always yields exactly one field per configured
//! sensor.

pub mod builtin;

use heapless::FnvIndexMap;
use log::{debug, warn};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::adapters::device_id::DeviceIdentity;
use crate::app::ports::Clock;
use crate::config::{Config, Kwargs};

/// Maximum number of registered readers.
pub const MAX_READERS: usize = 16;

/// A sensor reader: keyword arguments in, JSON scalar out.
pub type ReaderFn = fn(&Kwargs) -> anyhow::Result<Value>;

/// Static registration table of reader functions.
#[derive(Clone, Default)]
pub struct ReaderTable {
    readers: FnvIndexMap<&'static str, ReaderFn, MAX_READERS>,
}

impl ReaderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding every reader in [`builtin`].
    pub fn builtin() -> Self {
        let mut table = Self::new();
        builtin::register_all(&mut table);
        table
    }

    /// Register (or replace) a reader.  Returns `false` when the table is full.
    pub fn register(&mut self, id: &'static str, reader: ReaderFn) -> bool {
        match self.readers.insert(id, reader) {
            Ok(_) => true,
            Err(_) => {
                warn!("SENSOR: reader table full, '{}' not registered", id);
                false
            }
        }
    }

    pub fn resolve(&self, id: &str) -> Option<ReaderFn> {
        self.readers.get(id).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.readers.keys().copied()
    }
}

// ---------------------------------------------------------------------------
// Telemetry record
// ---------------------------------------------------------------------------

/// One sensor's contribution to a telemetry record.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Successful read and how long it took.
    Reading { value: Value, duration_ms: u64 },
    /// Reader missing or failed.
    Error(String),
}

/// Result of one poll cycle.  Serialises as a flat JSON object:
/// `firmware`, `_id`, then one key per sensor in configuration order.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub firmware: String,
    pub device_id: String,
    pub fields: Vec<(String, FieldValue)>,
}

impl TelemetryRecord {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

impl Serialize for TelemetryRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 2))?;
        map.serialize_entry("firmware", &self.firmware)?;
        map.serialize_entry("_id", &self.device_id)?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Reader table plus the clock used to time each read.
pub struct SensorRegistry<C: Clock> {
    readers: ReaderTable,
    clock: C,
}

impl<C: Clock> SensorRegistry<C> {
    pub fn new(readers: ReaderTable, clock: C) -> Self {
        Self { readers, clock }
    }

    pub fn readers(&self) -> &ReaderTable {
        &self.readers
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run one telemetry cycle over `config.sensors`, in table order.
    pub fn poll(&self, config: &Config, id: &DeviceIdentity, firmware: &str) -> TelemetryRecord {
        let mut fields = Vec::with_capacity(config.sensors.len());

        for (name, descriptor) in &config.sensors {
            let value = match self.readers.resolve(&descriptor.reader_id) {
                None => {
                    warn!(
                        "SENSOR: '{}' uses unknown reader '{}'",
                        name, descriptor.reader_id
                    );
                    FieldValue::Error(format!("interface '{}' not found", descriptor.reader_id))
                }
                Some(reader) => {
                    let started = self.clock.uptime_us();
                    let result = reader(&descriptor.kwargs);
                    let duration_ms = self.clock.uptime_us().saturating_sub(started) / 1000;
                    match result {
                        Ok(value) => {
                            debug!("SENSOR: '{}' = {} ({} ms)", name, value, duration_ms);
                            FieldValue::Reading { value, duration_ms }
                        }
                        Err(e) => {
                            warn!("SENSOR: '{}' failed: {:#}", name, e);
                            FieldValue::Error(format!(
                                "error while reading sensor '{name}': {e:#}"
                            ))
                        }
                    }
                }
            };
            fields.push((name.clone(), value));
        }

        TelemetryRecord {
            firmware: firmware.into(),
            device_id: id.as_str().into(),
            fields,
        }
    }
}
