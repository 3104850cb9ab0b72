//! NetSender firmware — main entry point.
//!
//! Hexagonal architecture: the control loop in [`netsender::app::service`]
//! consumes the platform through port traits; this binary wires the real
//! adapters to it and runs the loop.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Adapters (outer ring)                  │
//! │                                                          │
//! │  SystemAdapter  GpioAdapter  WifiAdapter                 │
//! │  HttpAdapter    SdCardAdapter            NvsAdapter      │
//! │                                                          │
//! │  ───────────── Port Trait Boundary ──────────────        │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────┐      │
//! │  │        NetSender (run loop, handlers)          │      │
//! │  └────────────────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

use anyhow::Result;
use log::{info, warn};

use netsender::adapters::hardware::HardwareAdapter;
use netsender::app::service::NetSender;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }
    #[cfg(not(target_os = "espidf"))]
    host_log_init();

    info!("NetSender v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Construct adapters ─────────────────────────────────
    let nvs = HardwareAdapter::nvs();
    let mut hw = HardwareAdapter::new();

    #[cfg(target_os = "espidf")]
    if let Err(e) = hw.sdcard.mount() {
        warn!("SD card unavailable: {e} (offline mode will fail)");
    }

    // ── 3. Run the control loop ───────────────────────────────
    let mut node = NetSender::init(&mut hw, &nvs);
    loop {
        let ok = node.run(&mut hw, &nvs);
        if !ok {
            warn!("cycle ended early, retrying");
        }
    }
}

/// Host builds have no ESP logger; the log facade's default (no-op) sink
/// is fine for bench runs, but keep the max level in place.
#[cfg(not(target_os = "espidf"))]
fn host_log_init() {
    log::set_max_level(log::LevelFilter::Info);
}
