//! NVS (Non-Volatile Storage) config store.
//!
//! Implements [`Store`] for the merged configuration document.
//!
//! # Blob format
//!
//! The document is stored as a postcard-encoded envelope
//! `{version, sha256(body), body}` where `body` is the JSON text. A blob
//! whose digest does not match is treated as corrupted.
//!
//! # Durability
//!
//! - ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - Before a new document is written, the previous valid blob is copied
//!   to a backup key; a corrupted primary falls back to it on read.
//! - The simulation backend keeps blobs in memory (dev/test only).

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::ports::Store;
use crate::error::StoreError;
use crate::json::MAX_DOCUMENT_SIZE;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const NAMESPACE: &str = "espkit";
const PRIMARY_KEY: &str = "config";
const BACKUP_KEY: &str = "config.bak";

const ENVELOPE_VERSION: u8 = 1;
/// Document limit plus envelope overhead.
pub const MAX_BLOB_SIZE: usize = MAX_DOCUMENT_SIZE + 64;

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u8,
    digest: [u8; 32],
    body: Vec<u8>,
}

/// Wrap `doc` into a blob.
pub fn encode(doc: &Value) -> Result<Vec<u8>, StoreError> {
    let body = serde_json::to_vec(doc).map_err(|_| StoreError::Io)?;
    let envelope = Envelope {
        version: ENVELOPE_VERSION,
        digest: hmac_sha256::Hash::hash(&body),
        body,
    };
    let bytes = postcard::to_allocvec(&envelope).map_err(|_| StoreError::Io)?;
    if bytes.len() > MAX_BLOB_SIZE {
        return Err(StoreError::Full);
    }
    Ok(bytes)
}

/// Unwrap a blob, checking version and digest.
pub fn decode(bytes: &[u8]) -> Result<Value, StoreError> {
    let envelope: Envelope = postcard::from_bytes(bytes).map_err(|_| StoreError::Corrupted)?;
    if envelope.version != ENVELOPE_VERSION {
        return Err(StoreError::Corrupted);
    }
    if hmac_sha256::Hash::hash(&envelope.body) != envelope.digest {
        return Err(StoreError::Corrupted);
    }
    serde_json::from_slice(&envelope.body).map_err(|_| StoreError::Corrupted)
}

pub struct NvsStore {
    #[cfg(not(target_os = "espidf"))]
    blobs: HashMap<String, Vec<u8>>,
}

impl NvsStore {
    /// Open the store, initialising NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, StoreError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // boot task before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StoreError::Io);
                }
            } else if ret != ESP_OK {
                return Err(StoreError::Io);
            }
            info!("NvsStore: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsStore: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            blobs: HashMap::new(),
        })
    }

    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match self.get_blob(key)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    // ── Raw blob access ───────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.blobs.get(key) {
            Some(bytes) if bytes.is_empty() || bytes.len() > MAX_BLOB_SIZE => {
                Err(StoreError::Corrupted)
            }
            blob => Ok(blob.cloned()),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn set_blob(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.blobs.insert(key.to_owned(), bytes.to_vec());
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn erase(&mut self, key: &str) -> Result<(), StoreError> {
        self.blobs.remove(key);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = c_key(key);
        let result = with_nvs_handle(false, |handle| {
            let mut size: usize = 0;
            // SAFETY: a null buffer asks for the blob size only.
            let ret = unsafe {
                nvs_get_blob(handle, key.as_ptr().cast(), core::ptr::null_mut(), &mut size)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            if size == 0 || size > MAX_BLOB_SIZE {
                return Err(ESP_ERR_NVS_INVALID_LENGTH);
            }
            let mut buf = vec![0u8; size];
            // SAFETY: `buf` holds exactly `size` bytes.
            let ret = unsafe {
                nvs_get_blob(handle, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            buf.truncate(size);
            Ok(buf)
        });
        match result {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(None),
            Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH => Err(StoreError::Corrupted),
            Err(e) => {
                warn!("NvsStore: read error {}", e);
                Err(StoreError::Io)
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn set_blob(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let key = c_key(key);
        let result = with_nvs_handle(true, |handle| {
            // SAFETY: `bytes` outlives the call; NVS copies it.
            let ret = unsafe {
                nvs_set_blob(handle, key.as_ptr().cast(), bytes.as_ptr().cast(), bytes.len())
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            // SAFETY: handle is open for writing.
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|e| {
            warn!("NvsStore: write error {}", e);
            if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                StoreError::Full
            } else {
                StoreError::Io
            }
        })
    }

    #[cfg(target_os = "espidf")]
    fn erase(&mut self, key: &str) -> Result<(), StoreError> {
        let key = c_key(key);
        let result = with_nvs_handle(true, |handle| {
            // SAFETY: handle is open for writing.
            let ret = unsafe { nvs_erase_key(handle, key.as_ptr().cast()) };
            if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                return Err(ret);
            }
            // SAFETY: handle is open for writing.
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        match result {
            Ok(()) => Ok(()),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(()),
            Err(_) => Err(StoreError::Io),
        }
    }
}

/// NUL-terminated NVS key (keys are at most 15 bytes).
#[cfg(target_os = "espidf")]
fn c_key(key: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let bytes = key.as_bytes();
    let len = bytes.len().min(15);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

/// Open the store's namespace, run `f` with the handle, then close.
#[cfg(target_os = "espidf")]
fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, esp_err_t>
where
    F: FnOnce(nvs_handle_t) -> Result<T, esp_err_t>,
{
    let ns = c_key(NAMESPACE);
    let mode = if write {
        nvs_open_mode_t_NVS_READWRITE
    } else {
        nvs_open_mode_t_NVS_READONLY
    };
    let mut handle: nvs_handle_t = 0;
    // SAFETY: `ns` is NUL-terminated and `handle` is a valid out pointer.
    let ret = unsafe { nvs_open(ns.as_ptr().cast(), mode, &mut handle) };
    if ret != ESP_OK {
        return Err(ret);
    }
    let result = f(handle);
    // SAFETY: handle was opened above and is closed exactly once.
    unsafe {
        nvs_close(handle);
    }
    result
}

impl Store for NvsStore {
    fn read(&mut self) -> Result<Option<Value>, StoreError> {
        match self.load(PRIMARY_KEY) {
            Ok(doc) => Ok(doc),
            Err(StoreError::Corrupted) => {
                warn!("NvsStore: primary config corrupted, trying backup");
                match self.load(BACKUP_KEY) {
                    Ok(Some(doc)) => {
                        info!("NvsStore: restored config from backup");
                        Ok(Some(doc))
                    }
                    Ok(None) | Err(_) => Err(StoreError::Corrupted),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, doc: &Value) -> Result<(), StoreError> {
        let bytes = encode(doc)?;
        match self.get_blob(PRIMARY_KEY) {
            Ok(Some(previous)) if decode(&previous).is_ok() => {
                self.set_blob(BACKUP_KEY, &previous)?;
            }
            Ok(_) => {}
            Err(e) => warn!("NvsStore: previous config unreadable ({e}), no backup kept"),
        }
        self.set_blob(PRIMARY_KEY, &bytes)?;
        info!("NvsStore: config saved ({} bytes)", bytes.len());
        Ok(())
    }

    fn reset(&mut self) -> Result<(), StoreError> {
        self.erase(PRIMARY_KEY)?;
        self.erase(BACKUP_KEY)?;
        info!("NvsStore: config erased");
        Ok(())
    }
}
