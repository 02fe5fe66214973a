//! Readers shipped with the firmware.
//!
//! | id              | kwargs                   | value                       |
//! |-----------------|--------------------------|-----------------------------|
//! | `random`        | none                     | float in `[0, 100)`         |
//! | `internal_temp` | `unit`: `"C"` \| `"F"`   | simulated die temperature   |
//! | `constant`      | `value` (required)       | `value`, unchanged          |
//! | `uptime`        | none                     | milliseconds since boot     |

use anyhow::{Context, anyhow, bail};
use rand::Rng;
use rand::rngs::OsRng;
use serde_json::{Value, json};

use super::ReaderTable;
use crate::adapters::time::uptime_ms;
use crate::config::Kwargs;

pub fn register_all(table: &mut ReaderTable) {
    table.register("random", random);
    table.register("internal_temp", internal_temp);
    table.register("constant", constant);
    table.register("uptime", uptime);
}

pub fn random(_kwargs: &Kwargs) -> anyhow::Result<Value> {
    Ok(json!(OsRng.gen_range(0.0..100.0_f64)))
}

/// The board has no calibrated die sensor; the reading is simulated.
pub fn internal_temp(kwargs: &Kwargs) -> anyhow::Result<Value> {
    let celsius = OsRng.gen_range(0.0..100.0_f64);
    let unit = match kwargs.get("unit") {
        None => "C",
        Some(v) => v
            .as_str()
            .ok_or_else(|| anyhow!("kwarg 'unit' must be a string"))?,
    };
    match unit {
        "C" | "c" => Ok(json!(celsius)),
        "F" | "f" => Ok(json!(celsius * 9.0 / 5.0 + 32.0)),
        other => bail!("unsupported unit '{other}'"),
    }
}

pub fn constant(kwargs: &Kwargs) -> anyhow::Result<Value> {
    kwargs
        .get("value")
        .cloned()
        .context("missing kwarg 'value'")
}

pub fn uptime(_kwargs: &Kwargs) -> anyhow::Result<Value> {
    Ok(json!(uptime_ms()))
}
