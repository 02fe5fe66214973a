//! Device identity.
//!
//! A 16-character alphanumeric identifier generated from the hardware RNG
//! on first boot and written once to its own blob.  Every later boot reads
//! it back; it is never regenerated while the blob exists.  It is reported
//! as `_id` in every telemetry record.

use core::fmt;

use log::{info, warn};
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::app::ports::BlobStore;
use crate::error::IdentityError;

/// Blob holding the identifier.
pub const IDENTITY_BLOB: &str = "identity";

pub const DEVICE_ID_LEN: usize = 16;

pub type DeviceIdString = heapless::String<DEVICE_ID_LEN>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity(DeviceIdString);

impl DeviceIdentity {
    /// Fresh random identifier.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let mut id = DeviceIdString::new();
        for _ in 0..DEVICE_ID_LEN {
            // Exactly DEVICE_ID_LEN pushes into a DEVICE_ID_LEN buffer.
            let _ = id.push(char::from(rng.sample(Alphanumeric)));
        }
        Self(id)
    }

    /// Accepts exactly 16 ASCII alphanumerics.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != DEVICE_ID_LEN || !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        DeviceIdString::try_from(s).ok().map(Self)
    }

    /// Read the identity blob, creating it on first boot.
    ///
    /// A blob that exists but does not parse is reported as
    /// [`IdentityError::Corrupted`] and left untouched.
    pub fn load_or_create<S, R>(store: &mut S, rng: &mut R) -> Result<Self, IdentityError>
    where
        S: BlobStore + ?Sized,
        R: Rng,
    {
        if let Some(bytes) = store.read(IDENTITY_BLOB)? {
            let text = core::str::from_utf8(&bytes).map_err(|_| IdentityError::Corrupted)?;
            let id = Self::parse(text.trim()).ok_or(IdentityError::Corrupted)?;
            info!("ID: device identity {}", id);
            return Ok(id);
        }

        let id = Self::generate(rng);
        store.write(IDENTITY_BLOB, id.as_str().as_bytes())?;
        info!("ID: first boot, generated identity {}", id);
        Ok(id)
    }

    /// [`load_or_create`](Self::load_or_create), falling back to an
    /// unsaved identifier for this session when the slot is unusable.
    pub fn load_or_ephemeral<S, R>(store: &mut S, rng: &mut R) -> Self
    where
        S: BlobStore + ?Sized,
        R: Rng,
    {
        match Self::load_or_create(store, rng) {
            Ok(id) => id,
            Err(e) => {
                let id = Self::generate(rng);
                warn!("ID: {}; using ephemeral identity {} for this session", e, id);
                id
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
