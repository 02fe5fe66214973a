//! NVS (Non-Volatile Storage) blob store.
//!
//! Implements [`BlobStore`] on the `sensorlink` NVS namespace, one NVS blob
//! per named blob.
//!
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`; a
//!   power cut mid-write leaves the previous value readable.
//! - Key names are limited to 15 bytes by NVS.
//! - The host build keeps blobs in a `HashMap` (tests and simulation only).

use log::{info, warn};

use crate::app::ports::BlobStore;
use crate::error::StorageError;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const NAMESPACE: &str = "sensorlink";

/// NVS key length limit (excluding the NUL).
const MAX_KEY_LEN: usize = 15;

/// Largest blob this adapter stores.
pub const MAX_BLOB_SIZE: usize = 4000;

const _: () = assert!(crate::config::MAX_CONFIG_BYTES <= MAX_BLOB_SIZE);

pub struct NvsBlobStore {
    #[cfg(not(target_os = "espidf"))]
    blobs: HashMap<String, Vec<u8>>,
}

impl NvsBlobStore {
    /// Initialise NVS flash.  On first boot or after a version mismatch the
    /// partition is erased and re-initialised.
    #[cfg(target_os = "espidf")]
    pub fn init() -> Result<Self, StorageError> {
        // SAFETY: called once from the main task before any NVS access.
        let ret = unsafe { nvs_flash_init() };
        if ret == ESP_ERR_NVS_NO_FREE_PAGES as i32 || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as i32 {
            warn!("NVS: erasing and re-initialising flash partition");
            if unsafe { nvs_flash_erase() } != ESP_OK as i32 || unsafe { nvs_flash_init() } != ESP_OK as i32 {
                return Err(StorageError::Io("nvs_flash_init failed".into()));
            }
        } else if ret != ESP_OK as i32 {
            return Err(StorageError::Io(format!("nvs_flash_init rc={ret}")));
        }
        info!("NVS: initialised, namespace '{}'", NAMESPACE);
        Ok(Self {})
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn init() -> Result<Self, StorageError> {
        info!("NVS: simulation backend");
        Ok(Self::new())
    }

    /// Empty in-memory store.
    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            blobs: HashMap::new(),
        }
    }

    fn key(name: &str) -> Result<[u8; MAX_KEY_LEN + 1], StorageError> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_KEY_LEN || bytes.contains(&0) {
            return Err(StorageError::InvalidName);
        }
        let mut key = [0u8; MAX_KEY_LEN + 1];
        key[..bytes.len()].copy_from_slice(bytes);
        Ok(key)
    }

    /// A blob `read` would refuse is never written.
    fn check_size(name: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            warn!(
                "NVS: '{}' is {} bytes, limit {}, not written",
                name,
                data.len(),
                MAX_BLOB_SIZE
            );
            return Err(StorageError::Full);
        }
        Ok(())
    }

    /// Open the namespace, run `f` with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        ns_buf[..NAMESPACE.len()].copy_from_slice(NAMESPACE.as_bytes());

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK as i32 {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn map_err(rc: i32) -> StorageError {
        if rc == ESP_ERR_NVS_NOT_ENOUGH_SPACE as i32 {
            StorageError::Full
        } else {
            StorageError::Io(format!("NVS rc={rc}"))
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for NvsBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl BlobStore for NvsBlobStore {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Self::key(name)?;
        Ok(self.blobs.get(name).cloned())
    }

    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        Self::key(name)?;
        Self::check_size(name, data)?;
        self.blobs.insert(name.into(), data.to_vec());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        Self::key(name)?;
        self.blobs.remove(name);
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.blobs.contains_key(name)
    }
}

#[cfg(target_os = "espidf")]
impl BlobStore for NvsBlobStore {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = Self::key(name)?;
        let result = Self::with_nvs_handle(false, |handle| {
            let mut size: usize = 0;
            // First call: get size.
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key.as_ptr() as *const _,
                    core::ptr::null_mut(),
                    &mut size,
                )
            };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            if size > MAX_BLOB_SIZE {
                return Err(ESP_ERR_NVS_INVALID_LENGTH as i32);
            }

            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key.as_ptr() as *const _,
                    buf.as_mut_ptr() as *mut _,
                    &mut size,
                )
            };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            buf.truncate(size);
            Ok(buf)
        });

        match result {
            Ok(bytes) => Ok(Some(bytes)),
            // A namespace that was never written does not exist yet.
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND as i32 => Ok(None),
            Err(e) => Err(Self::map_err(e)),
        }
    }

    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        let key = Self::key(name)?;
        Self::check_size(name, data)?;
        let result = Self::with_nvs_handle(true, |handle| {
            let ret = unsafe {
                nvs_set_blob(
                    handle,
                    key.as_ptr() as *const _,
                    data.as_ptr() as *const _,
                    data.len(),
                )
            };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            Ok(())
        });
        match result {
            Ok(()) => {
                info!("NVS: wrote '{}' ({} bytes)", name, data.len());
                Ok(())
            }
            Err(e) => {
                warn!("NVS: write '{}' failed, rc={}", name, e);
                Err(Self::map_err(e))
            }
        }
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        let key = Self::key(name)?;
        let result = Self::with_nvs_handle(true, |handle| {
            let ret = unsafe { nvs_erase_key(handle, key.as_ptr() as *const _) };
            if ret != ESP_OK as i32 && ret != ESP_ERR_NVS_NOT_FOUND as i32 {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(Self::map_err)
    }

    fn exists(&self, name: &str) -> bool {
        let Ok(key) = Self::key(name) else {
            return false;
        };
        let result = Self::with_nvs_handle(false, |handle| {
            let ret = unsafe {
                nvs_find_key(handle, key.as_ptr() as *const _, core::ptr::null_mut())
            };
            Ok(ret == ESP_OK as i32)
        });
        result.unwrap_or(false)
    }
}
