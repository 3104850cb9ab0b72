//! SD card adapter — append-only data files for the offline handler.
//!
//! On the node, an SDMMC card is mounted at `/NSD` through the ESP-IDF FAT
//! VFS, and `std::fs` works against it directly. On the host the same
//! `std::fs` code runs against a base directory, so integration tests and
//! bench runs exercise the real file path handling.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;

#[cfg(target_os = "espidf")]
use log::info;
use log::warn;

use crate::app::ports::FileStorePort;
use crate::error::OfflineError;

pub struct SdCardAdapter {
    /// Prefix applied to every path; empty on the device (the VFS mount
    /// point is part of the path already).
    base: PathBuf,
}

impl Default for SdCardAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SdCardAdapter {
    pub fn new() -> Self {
        Self {
            base: PathBuf::new(),
        }
    }

    /// Host-side: root all paths under `base`.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Mount the SDMMC card. Must be called once before the first append.
    #[cfg(target_os = "espidf")]
    pub fn mount(&self) -> Result<(), OfflineError> {
        use esp_idf_svc::sys::*;
        use std::ffi::CString;

        unsafe {
            let mount_point = CString::new(crate::handlers::offline::DATA_DIR).unwrap();
            let mount_cfg = esp_vfs_fat_sdmmc_mount_config_t {
                format_if_mount_failed: false,
                max_files: 8,
                allocation_unit_size: 16 * 1024,
                ..Default::default()
            };
            let host = sdmmc_host_t {
                ..Default::default()
            };
            let slot_cfg = sdmmc_slot_config_t {
                ..Default::default()
            };
            let mut card: *mut sdmmc_card_t = core::ptr::null_mut();
            let ret = esp_vfs_fat_sdmmc_mount(
                mount_point.as_ptr(),
                &host,
                &slot_cfg as *const _ as *const core::ffi::c_void,
                &mount_cfg,
                &mut card,
            );
            if ret != ESP_OK {
                warn!("sdcard: mount failed ({ret})");
                return Err(OfflineError::OpenFailed);
            }
        }
        info!("sdcard: mounted");
        Ok(())
    }

    fn resolve(&self, path: &str) -> PathBuf {
        // Data paths are absolute ("/NSD/A4"); joining an absolute path
        // would discard the base, so strip the leading slash first.
        self.base.join(path.trim_start_matches('/'))
    }
}

impl FileStorePort for SdCardAdapter {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), OfflineError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                warn!("sdcard: mkdir {} failed: {e}", parent.display());
                OfflineError::OpenFailed
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .map_err(|e| {
                warn!("sdcard: open {} failed: {e}", full.display());
                OfflineError::OpenFailed
            })?;
        file.write_all(data).map_err(|e| {
            warn!("sdcard: write {} failed: {e}", full.display());
            OfflineError::WriteFailed
        })
    }
}
