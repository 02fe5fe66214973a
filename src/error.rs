//! Unified error types for the SensorLink firmware.
//!
//! Each subsystem has its own small enum so callers can match on exactly
//! the failures that subsystem produces.  None of them are fatal to the
//! device: the main loop logs them and keeps serving the radio link.

use core::fmt;

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from [`BlobStore`](crate::app::ports::BlobStore) operations.
#[derive(Debug)]
pub enum StorageError {
    /// The blob name is not acceptable to the backend (too long, bad chars).
    InvalidName,
    /// Storage partition is full.
    Full,
    /// Generic I/O error from the backend.
    Io(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "invalid blob name"),
            Self::Full => write!(f, "storage full"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl core::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors from [`ConfigStore`](crate::store::ConfigStore) mutations.
#[derive(Debug)]
pub enum ConfigError {
    /// A field failed range validation.  Nothing was changed.
    ValidationFailed(String),
    /// The merged document could not be represented as a `Config`.
    /// Nothing was changed.
    Malformed(String),
    /// The sensor table is at capacity.  Nothing was changed.
    TooManySensors,
    /// The in-memory config was updated but writing it to storage failed.
    /// The previous durable copy is untouched.
    Persist(StorageError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed config: {msg}"),
            Self::TooManySensors => write!(f, "sensor table full"),
            Self::Persist(e) => write!(f, "persist failed: {e}"),
        }
    }
}

impl core::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Persist(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        Self::Persist(e)
    }
}

// ---------------------------------------------------------------------------
// Inbound message decode errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum DecodeError {
    /// Payload is not valid UTF-8.
    InvalidUtf8,
    /// Payload is empty after trimming whitespace.
    Empty,
    /// Payload is not a JSON object of the expected shape.
    Json(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUtf8 => write!(f, "payload is not valid UTF-8"),
            Self::Empty => write!(f, "payload is empty"),
            Self::Json(msg) => write!(f, "invalid control message: {msg}"),
        }
    }
}

impl core::error::Error for DecodeError {}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Radio errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// The BLE stack could not be brought up.
    StackInitFailed,
    /// Advertising data was rejected or advertising failed to start.
    AdvertiseFailed,
    /// The notify primitive returned an error code.
    NotifyFailed(i32),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackInitFailed => write!(f, "BLE stack initialisation failed"),
            Self::AdvertiseFailed => write!(f, "advertising failed"),
            Self::NotifyFailed(rc) => write!(f, "notify failed (rc={rc})"),
        }
    }
}

impl core::error::Error for RadioError {}

// ---------------------------------------------------------------------------
// Identity errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum IdentityError {
    /// The identity slot exists but does not hold a valid identifier.
    Corrupted,
    /// Reading or writing the identity slot failed.
    Storage(StorageError),
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "identity slot holds an invalid identifier"),
            Self::Storage(e) => write!(f, "identity storage: {e}"),
        }
    }
}

impl core::error::Error for IdentityError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Corrupted => None,
        }
    }
}

impl From<StorageError> for IdentityError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
