//! Configuration ownership and persistence.
//!
//! [`ConfigStore`] owns the single in-memory [`Config`] and the blob store
//! it is persisted to.  Every accepted change is written back in full, as
//! pretty JSON, before the call returns.
//!
//! ```text
//!   set_config / set_sensors
//!        │
//!        ▼
//!   merge / upsert + validate ──✗──▶ Err, nothing changed
//!        │ ✓
//!        ▼
//!   swap in memory ──▶ persist ──✗──▶ Err(Persist), memory keeps the
//!                         │ ✓         new value, old blob intact
//!                         ▼
//!                        Ok
//! ```

use log::{info, warn};
use serde_json::{Map, Value};

use crate::adapters::device_id::DeviceIdentity;
use crate::app::ports::BlobStore;
use crate::config::{Config, SensorMap};
use crate::error::ConfigError;

/// Blob holding the configuration document.
pub const CONFIG_BLOB: &str = "config.json";

pub struct ConfigStore<S: BlobStore> {
    store: S,
    config: Config,
    identity: DeviceIdentity,
    persisted: bool,
}

impl<S: BlobStore> ConfigStore<S> {
    /// Load the configuration blob.  A missing, unreadable or invalid blob
    /// yields the default configuration, which is not written back until
    /// the first change.
    pub fn load(store: S, identity: DeviceIdentity) -> Self {
        let loaded = match store.read(CONFIG_BLOB) {
            Ok(Some(bytes)) => match Self::parse(&bytes) {
                Ok(cfg) => Some(cfg),
                Err(e) => {
                    warn!("CFG: stored config rejected ({}), using defaults", e);
                    None
                }
            },
            Ok(None) => {
                info!("CFG: no stored config, using defaults");
                None
            }
            Err(e) => {
                warn!("CFG: config read failed ({}), using defaults", e);
                None
            }
        };

        let persisted = loaded.is_some();
        let config = loaded.unwrap_or_default();
        info!(
            "CFG: link_name='{}' interval={} ms sensors={}",
            config.link_name,
            config.telemetry_interval_ms,
            config.sensors.len()
        );
        Self {
            store,
            config,
            identity,
            persisted,
        }
    }

    fn parse(bytes: &[u8]) -> Result<Config, ConfigError> {
        let doc: Map<String, Value> =
            serde_json::from_slice(bytes).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        Config::default().merged(&doc)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Whether the in-memory config matches what is stored.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Shallow top-level merge, then persist.
    pub fn set_config(&mut self, patch: &Map<String, Value>) -> Result<(), ConfigError> {
        let next = self.config.merged(patch)?;
        self.replace(next)
    }

    /// Per-sensor upsert, then persist.
    pub fn set_sensors(&mut self, upserts: &SensorMap) -> Result<(), ConfigError> {
        let next = self.config.with_sensors(upserts)?;
        self.replace(next)
    }

    fn replace(&mut self, next: Config) -> Result<(), ConfigError> {
        self.config = next;
        self.persisted = false;
        self.persist()
    }

    /// Write the whole document.  The blob store replaces it atomically.
    pub fn persist(&mut self) -> Result<(), ConfigError> {
        let bytes = serde_json::to_vec_pretty(&self.config)
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;
        match self.store.write(CONFIG_BLOB, &bytes) {
            Ok(()) => {
                self.persisted = true;
                info!("CFG: persisted ({} bytes)", bytes.len());
                Ok(())
            }
            Err(e) => {
                warn!("CFG: persist failed, keeping in-memory config: {}", e);
                Err(e.into())
            }
        }
    }
}
