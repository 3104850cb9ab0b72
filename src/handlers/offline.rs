//! Offline request handler — caches poll data to local storage.
//!
//! Used when the node is deployed out of coverage. Poll inputs are
//! appended to one binary file per pin under [`DATA_DIR`]; a recovery crew
//! pulls the card and backfills the service. Config and vars requests
//! still need the network and are routed to the online handler by the
//! manager; act requests have nothing to command and are no-ops.
//!
//! File layout: a two-record header (format version, then the absolute
//! time reference) followed by 16-byte data records. A fresh time
//! reference record is inserted whenever the millisecond counter wraps, so
//! the file's timestamps stay monotonic across a rollover.

use core::fmt::Write as _;

use log::warn;

use crate::app::context::{Context, DeviceError};
use crate::app::ports::{NvsPort, Platform};
use crate::error::{Error, OfflineError, Result};
use crate::handlers::{RequestHandler, RequestKind};
use crate::pins::Pin;

/// Directory holding per-pin data files.
pub const DATA_DIR: &str = "/NSD";

/// Record value marking the header's format-version record.
pub const VERSION_MARKER: i64 = 0x7FFF_FFFE;

/// Record value marking a time-reference record.
pub const TIME_MARKER: i64 = 0x7FFF_FFFF;

/// Current data file format version.
pub const FORMAT_VERSION: u64 = 1;

pub struct OfflineHandler {
    /// Uptime seconds at the last saved batch, for rollover detection.
    last_secs: u64,
}

impl Default for OfflineHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineHandler {
    pub fn new() -> Self {
        Self { last_secs: 0 }
    }

    fn poll(
        &mut self,
        ctx: &mut Context,
        plat: &mut impl Platform,
        inputs: &mut [Pin],
    ) -> Result<String> {
        let now_secs = u64::from(plat.millis() / 1000);
        let rolled_over = now_secs < self.last_secs;
        let mut failed = false;

        for pin in inputs.iter().filter(|p| p.value >= 0) {
            let mut path = String::new();
            let _ = write!(path, "{DATA_DIR}/{}", pin.name);

            let mut records = Vec::with_capacity(48);
            if !plat.exists(&path) {
                if ctx.ref_timestamp == 0 {
                    warn!("offline: time reference unset, records start at epoch 0");
                }
                records.extend_from_slice(&encode_record(VERSION_MARKER, FORMAT_VERSION));
                records.extend_from_slice(&encode_record(TIME_MARKER, ctx.ref_timestamp));
            } else if rolled_over {
                records.extend_from_slice(&encode_record(TIME_MARKER, ctx.ref_timestamp));
            }
            records.extend_from_slice(&encode_record(
                i64::from(pin.value),
                ctx.ref_timestamp + now_secs,
            ));

            if let Err(e) = plat.append(&path, &records) {
                warn!("offline: {} not saved: {e}", pin.name);
                ctx.raise_error(DeviceError::SdCardFailure);
                failed = true;
            }
        }

        self.last_secs = now_secs;
        if failed {
            Err(Error::Offline(OfflineError::WriteFailed))
        } else {
            Ok(String::new())
        }
    }
}

impl RequestHandler for OfflineHandler {
    fn name(&self) -> &'static str {
        "Offline"
    }

    fn init(&mut self, _ctx: &mut Context, _plat: &mut impl Platform) -> Result<()> {
        // The data directory is created lazily on first append.
        Ok(())
    }

    fn request(
        &mut self,
        ctx: &mut Context,
        plat: &mut impl Platform,
        _nvs: &impl NvsPort,
        kind: RequestKind,
        inputs: &mut [Pin],
        _outputs: &mut [Pin],
        _reconfig: &mut bool,
    ) -> Result<String> {
        match kind {
            RequestKind::Poll => self.poll(ctx, plat, inputs),
            RequestKind::Act => Ok(String::new()),
            // The manager routes these to the online handler.
            RequestKind::Config | RequestKind::Vars => {
                Err(Error::Config("config/vars require the online handler"))
            }
        }
    }

    fn disconnect(&mut self, _plat: &mut impl Platform) -> Result<()> {
        Ok(())
    }
}

/// Encode one `(value, timestamp)` record as raw little-endian bytes.
pub fn encode_record(value: i64, timestamp: u64) -> [u8; 16] {
    let mut record = [0u8; 16];
    record[..8].copy_from_slice(&value.to_le_bytes());
    record[8..].copy_from_slice(&timestamp.to_le_bytes());
    record
}
