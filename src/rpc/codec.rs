//! JSON codec for telemetry, control messages and replies.
//!
//! Inbound control message (flat object, both keys optional):
//! ```text
//! {"config": "get" | {<top-level keys to merge>},
//!  "sensor": "get" | {<name>: {"reader_id": .., "kwargs": {..}}, ..}}
//! ```
//! Outbound:
//! ```text
//! telemetry  {"firmware": .., "_id": .., <sensor>: <value|error|timed>, ..}\n
//! reply      {"config": {<full config>}[, "error": ".."]}\n
//! ```

use log::error;
use serde_json::{Map, Value};

use crate::config::{Config, SensorDescriptor, SensorMap};
use crate::error::DecodeError;
use crate::sensors::TelemetryRecord;

/// A `"config"` or `"sensor"` request.
#[derive(Debug, Clone, PartialEq)]
pub enum Command<T> {
    /// Report the current configuration.
    Get,
    Set(T),
}

/// One decoded RX write.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControlMessage {
    /// Shallow merge patch for the whole config.
    pub config: Option<Command<Map<String, Value>>>,
    /// Per-sensor upserts.
    pub sensor: Option<Command<SensorMap>>,
}

impl ControlMessage {
    /// Neither key present: nothing to do, nothing to reply.
    pub fn is_empty(&self) -> bool {
        self.config.is_none() && self.sensor.is_none()
    }
}

pub fn decode_control(bytes: &[u8]) -> Result<ControlMessage, DecodeError> {
    let text = core::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    let Value::Object(mut doc) = serde_json::from_str::<Value>(text)? else {
        return Err(DecodeError::Json("expected a JSON object".into()));
    };

    let config = match doc.remove("config") {
        None => None,
        Some(value) => Some(command(value, "config")?),
    };

    let sensor = match doc.remove("sensor") {
        None => None,
        Some(value) => Some(match command(value, "sensor")? {
            Command::Get => Command::Get,
            Command::Set(entries) => Command::Set(sensor_map(entries)?),
        }),
    };

    Ok(ControlMessage { config, sensor })
}

/// `"get"` or an object; anything else is malformed.
fn command(value: Value, key: &str) -> Result<Command<Map<String, Value>>, DecodeError> {
    match value {
        Value::String(s) if s == "get" => Ok(Command::Get),
        Value::Object(map) => Ok(Command::Set(map)),
        other => Err(DecodeError::Json(format!(
            "'{key}' must be \"get\" or an object, got {other}"
        ))),
    }
}

fn sensor_map(entries: Map<String, Value>) -> Result<SensorMap, DecodeError> {
    let mut sensors = SensorMap::new();
    for (name, value) in entries {
        let mut descriptor: SensorDescriptor = serde_json::from_value(value)
            .map_err(|e| DecodeError::Json(format!("sensor '{name}': {e}")))?;
        descriptor.name.clone_from(&name);
        sensors
            .insert(name, descriptor)
            .map_err(|_| DecodeError::Json("too many sensors in one message".into()))?;
    }
    Ok(sensors)
}

/// Compact JSON plus the newline frame terminator.
pub fn encode_telemetry(record: &TelemetryRecord) -> String {
    match serde_json::to_string(record) {
        Ok(mut line) => {
            line.push('\n');
            line
        }
        Err(e) => {
            error!("TELEM: record not serialisable: {}", e);
            String::from("{}\n")
        }
    }
}

/// `{"config": <full config>}`, with `"error"` when the request was
/// rejected or could not be persisted.
pub fn encode_reply(config: &Config, error: Option<&str>) -> String {
    let mut reply = Map::new();
    match serde_json::to_value(config) {
        Ok(doc) => {
            reply.insert("config".into(), doc);
        }
        Err(e) => {
            error!("CFG: config not serialisable: {}", e);
            reply.insert("config".into(), Value::Null);
        }
    }
    if let Some(msg) = error {
        reply.insert("error".into(), Value::String(msg.into()));
    }
    let mut line = Value::Object(reply).to_string();
    line.push('\n');
    line
}
