//! SensorLink firmware library.
//!
//! Exposes the link state machine, the configuration store and the
//! telemetry pipeline for integration testing.  All ESP-IDF-specific code
//! is guarded by `#[cfg(target_os = "espidf")]` within each module; every
//! hardware adapter has a host simulation twin.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod link;
pub mod pins;
pub mod rpc;
pub mod scheduler;
pub mod sensors;
pub mod store;
