//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`NvsPort`] for the NetSender node. The packed config image
//! and the active-handler name both live in the `netsender` namespace.
//!
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`;
//!   the in-memory simulation achieves this trivially.
//! - On first boot or after an NVS version mismatch the partition is
//!   erased and re-initialised automatically.

use crate::app::ports::NvsPort;
use crate::error::StoreError;
use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(not(target_os = "espidf"))]
use std::cell::RefCell;
#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const NAMESPACE: &str = "netsender";

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: RefCell<HashMap<String, Vec<u8>>>,
}

impl Default for NvsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl NvsAdapter {
    /// Create the adapter and initialise NVS flash.
    pub fn new() -> Self {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                unsafe {
                    nvs_flash_erase();
                    nvs_flash_init();
                }
            } else if ret != ESP_OK {
                warn!("NVS: init failed ({ret}); operations will error");
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Self {
            #[cfg(not(target_os = "espidf"))]
            store: RefCell::new(HashMap::new()),
        }
    }

    /// Open the namespace, run a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns = NAMESPACE.as_bytes();
        ns_buf[..ns.len()].copy_from_slice(ns);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn key_buf(key: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let kb = key.as_bytes();
        let kl = kb.len().min(15);
        buf[..kl].copy_from_slice(&kb[..kl]);
        buf
    }
}

impl NvsPort for NvsAdapter {
    fn read_blob(&self, key: &str, buf: &mut [u8]) -> Result<usize, StoreError> {
        #[cfg(not(target_os = "espidf"))]
        {
            match self.store.borrow().get(key) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StoreError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let key_buf = Self::key_buf(key);
            let result = Self::with_nvs_handle(false, |handle| {
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StoreError::NotFound),
                Err(_) => Err(StoreError::IoError),
            }
        }
    }

    fn write_blob(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .insert(key.to_string(), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key_buf = Self::key_buf(key);
            let result = Self::with_nvs_handle(true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|e| {
                warn!("NVS: write '{key}' failed ({e})");
                StoreError::IoError
            })
        }
    }

    fn read_str(&self, key: &str) -> Option<heapless::String<16>> {
        let mut buf = [0u8; 16];
        let len = self.read_blob(key, &mut buf).ok()?;
        let text = core::str::from_utf8(&buf[..len]).ok()?;
        let mut out = heapless::String::new();
        out.push_str(text).ok()?;
        Some(out)
    }

    fn write_str(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.write_blob(key, value.as_bytes())
    }
}
