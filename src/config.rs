//! Device configuration document.
//!
//! The whole configuration is one JSON document: the advertised link name,
//! the telemetry interval and the sensor table.  It is loaded once at boot
//! by [`ConfigStore`](crate::store::ConfigStore) and rewritten in full after
//! every accepted change.
//!
//! Two update shapes exist and they intentionally differ:
//!
//! - [`Config::merged`]: shallow top-level merge.  A `"sensors"` key in the
//!   patch replaces the whole sensor table.
//! - [`Config::with_sensors`]: per-sensor upsert.  Sensors not named in the
//!   update are kept.

use heapless::FnvIndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Maximum number of configured sensors (power of two, heapless index map).
pub const MAX_SENSORS: usize = 16;

/// Longest link name that fits the 31-byte advertising payload next to the
/// flags field and the name field header.
pub const MAX_LINK_NAME_LEN: usize = 26;

/// Largest serialized (pretty) configuration document.  Matches the NVS
/// blob limit so anything accepted also loads on the next boot.
pub const MAX_CONFIG_BYTES: usize = 4000;

pub const MIN_TELEMETRY_INTERVAL_MS: u32 = 100;
pub const MAX_TELEMETRY_INTERVAL_MS: u32 = 3_600_000;

/// Telemetry record keys owned by the firmware; sensors may not use them.
pub const RESERVED_FIELDS: [&str; 2] = ["firmware", "_id"];

pub const DEFAULT_LINK_NAME: &str = "Lass Mich";
pub const DEFAULT_TELEMETRY_INTERVAL_MS: u32 = 5000;

/// Keyword arguments handed to a reader function.
pub type Kwargs = Map<String, Value>;

/// Insertion-ordered sensor table.
pub type SensorMap = FnvIndexMap<String, SensorDescriptor, MAX_SENSORS>;

/// One configured sensor: which reader to call and with what arguments.
///
/// `reader_id` is resolved only when the sensor is polled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    #[serde(default)]
    pub name: String,
    pub reader_id: String,
    #[serde(default)]
    pub kwargs: Kwargs,
}

impl SensorDescriptor {
    pub fn new(name: &str, reader_id: &str) -> Self {
        Self {
            name: name.into(),
            reader_id: reader_id.into(),
            kwargs: Kwargs::new(),
        }
    }

    pub fn with_kwarg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }
}

/// The persisted configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Complete local name put in the advertising payload.
    pub link_name: String,
    /// Period of the telemetry timer while a peer is connected.
    pub telemetry_interval_ms: u32,
    /// Sensors polled on every telemetry cycle, in insertion order.
    pub sensors: SensorMap,
    /// Top-level keys this firmware does not interpret.  Kept so a peer can
    /// store its own settings on the device.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        let mut sensors = SensorMap::new();
        // Capacity is MAX_SENSORS; the first insert cannot fail.
        let _ = sensors.insert("random".into(), SensorDescriptor::new("random", "random"));
        Self {
            link_name: DEFAULT_LINK_NAME.into(),
            telemetry_interval_ms: DEFAULT_TELEMETRY_INTERVAL_MS,
            sensors,
            extra: Map::new(),
        }
    }
}

impl Config {
    /// Shallow merge: every top-level key in `patch` overwrites the current
    /// value, every other key is left alone.  The result is validated; on
    /// error `self` is untouched because a new value is returned.
    pub fn merged(&self, patch: &Map<String, Value>) -> Result<Config, ConfigError> {
        let mut doc = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(ConfigError::Malformed("config is not an object".into())),
            Err(e) => return Err(ConfigError::Malformed(e.to_string())),
        };
        for (key, value) in patch {
            doc.insert(key.clone(), value.clone());
        }

        let mut next: Config = serde_json::from_value(Value::Object(doc))
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;
        next.normalize_sensor_names();
        validate(&next)?;
        Ok(next)
    }

    /// Per-key upsert into the sensor table.  Existing sensors keep their
    /// position; new ones are appended.
    pub fn with_sensors(&self, upserts: &SensorMap) -> Result<Config, ConfigError> {
        let mut next = self.clone();
        for (name, descriptor) in upserts {
            let mut descriptor = descriptor.clone();
            descriptor.name.clone_from(name);
            next.sensors
                .insert(name.clone(), descriptor)
                .map_err(|_| ConfigError::TooManySensors)?;
        }
        validate(&next)?;
        Ok(next)
    }

    /// The table key is authoritative for a sensor's name.
    fn normalize_sensor_names(&mut self) {
        for (key, descriptor) in self.sensors.iter_mut() {
            if descriptor.name != *key {
                if !descriptor.name.is_empty() {
                    log::warn!(
                        "CFG: sensor '{}' declared name '{}', using table key",
                        key,
                        descriptor.name
                    );
                }
                descriptor.name.clone_from(key);
            }
        }
    }
}

/// Range-check a configuration before it is accepted.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.link_name.is_empty() || cfg.link_name.len() > MAX_LINK_NAME_LEN {
        return Err(ConfigError::ValidationFailed(format!(
            "link_name must be 1-{MAX_LINK_NAME_LEN} bytes"
        )));
    }
    if cfg.link_name.chars().any(char::is_control) {
        return Err(ConfigError::ValidationFailed(
            "link_name must not contain control characters".into(),
        ));
    }
    if !(MIN_TELEMETRY_INTERVAL_MS..=MAX_TELEMETRY_INTERVAL_MS)
        .contains(&cfg.telemetry_interval_ms)
    {
        return Err(ConfigError::ValidationFailed(format!(
            "telemetry_interval_ms must be {MIN_TELEMETRY_INTERVAL_MS}-{MAX_TELEMETRY_INTERVAL_MS}"
        )));
    }
    for (name, descriptor) in &cfg.sensors {
        if name.is_empty() {
            return Err(ConfigError::ValidationFailed("sensor name must not be empty".into()));
        }
        if RESERVED_FIELDS.contains(&name.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "sensor name '{name}' is reserved"
            )));
        }
        if descriptor.reader_id.is_empty() {
            return Err(ConfigError::ValidationFailed(format!(
                "sensor '{name}' has an empty reader_id"
            )));
        }
    }
    let size = serde_json::to_vec_pretty(cfg)
        .map_err(|e| ConfigError::Malformed(e.to_string()))?
        .len();
    if size > MAX_CONFIG_BYTES {
        return Err(ConfigError::ValidationFailed(format!(
            "config document is {size} bytes, limit is {MAX_CONFIG_BYTES}"
        )));
    }
    Ok(())
}
