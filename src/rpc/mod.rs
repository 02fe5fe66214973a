//! Wire protocol over the BLE UART characteristics.
//!
//! Newline-terminated UTF-8 JSON objects in both directions.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  RX write ──▶ decode_control ──▶ BoardController         │
//! │                                      │ set_config /      │
//! │                                      │ set_sensors       │
//! │  TX notify ◀── encode_reply ◀────────┘                   │
//! │  TX notify ◀── encode_telemetry ◀── SensorRegistry::poll │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
