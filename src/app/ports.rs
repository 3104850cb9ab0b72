//! Port traits — the hexagonal boundary between the control loop and the
//! platform.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ run loop / handlers (domain)
//! ```
//!
//! The core consumes the platform exclusively through these traits, so the
//! whole loop runs against mock adapters on the host. Real implementations
//! live in `crate::adapters` with ESP-IDF code behind
//! `#[cfg(target_os = "espidf")]`.

use crate::error::{NetworkError, OfflineError, StoreError};
use crate::pins::Pin;

// ───────────────────────────────────────────────────────────────
// System port (clock, delays, sleep, reset)
// ───────────────────────────────────────────────────────────────

/// Monotonic time, blocking delays, and the reset/sleep primitives.
///
/// `millis` wraps in the 32-bit domain; callers use
/// [`crate::timing::elapsed_ms`] for differences. All waits in the core are
/// explicit calls into this port — the loop is cooperative and
/// single-threaded.
pub trait SystemPort {
    /// Milliseconds since boot, wrapping at `u32::MAX`.
    fn millis(&self) -> u32;

    /// Block for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);

    /// Enter deep sleep for `ms` milliseconds. On hardware this does not
    /// return; the simulation records the request and continues.
    fn deep_sleep_ms(&mut self, ms: u64);

    /// Reset the platform. On hardware this does not return; the
    /// simulation records the request so tests can observe restarts.
    fn restart(&mut self);
}

// ───────────────────────────────────────────────────────────────
// GPIO port (analog/digital pin drivers)
// ───────────────────────────────────────────────────────────────

/// Raw pin access by hardware pin number.
pub trait GpioPort {
    /// One ADC sample.
    fn analog_read(&mut self, pin: u8) -> i32;

    /// PWM write.
    fn analog_write(&mut self, pin: u8, value: i32);

    /// Digital read (0 or 1).
    fn digital_read(&mut self, pin: u8) -> i32;

    /// Digital write; any non-zero level drives high.
    fn digital_write(&mut self, pin: u8, level: i32);
}

// ───────────────────────────────────────────────────────────────
// Non-volatile store port
// ───────────────────────────────────────────────────────────────

/// Byte-blob and small-string persistence.
///
/// Writes MUST be atomic — no partial blobs on power loss. The ESP-IDF NVS
/// API guarantees this natively; the in-memory simulation achieves it
/// trivially.
pub trait NvsPort {
    /// Copy a stored blob into `buf`, returning the byte count copied.
    /// Bytes beyond the stored length are left untouched.
    fn read_blob(&self, key: &str, buf: &mut [u8]) -> Result<usize, StoreError>;

    /// Store a blob atomically.
    fn write_blob(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Read a small string value (e.g. the active-handler name).
    fn read_str(&self, key: &str) -> Option<heapless::String<16>>;

    /// Store a small string value atomically.
    fn write_str(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Wi-Fi port
// ───────────────────────────────────────────────────────────────

/// Radio control. Association and DHCP are the adapter's problem; the core
/// only sequences power and credentials.
pub trait WifiPort {
    /// Power the radio on. Failure counts as a network failure.
    fn power_on(&mut self) -> Result<(), NetworkError>;

    /// Power the radio off. Failure is fatal to the node (the ADC shares
    /// the bus) and triggers a restart.
    fn power_off(&mut self) -> Result<(), NetworkError>;

    /// Associate with an access point. Blocks up to the adapter's internal
    /// timeout.
    fn join(&mut self, ssid: &str, key: &str) -> Result<(), NetworkError>;

    /// Whether the station currently holds an association.
    fn is_joined(&self) -> bool;

    /// Factory MAC, formatted uppercase `AA:BB:CC:DD:EE:FF`.
    fn mac(&self) -> heapless::String<17>;

    /// Station IP as dotted decimal, empty when unassigned.
    fn local_ip(&self) -> heapless::String<15>;
}

// ───────────────────────────────────────────────────────────────
// HTTP port
// ───────────────────────────────────────────────────────────────

/// A completed HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct HttpReply {
    pub status: u16,
    /// Location header, present on redirect statuses.
    pub location: Option<String>,
    pub body: String,
}

/// Plaintext HTTP client. One request per call, bounded by the adapter's
/// fixed timeout; redirects are followed by the caller, not the adapter.
pub trait HttpPort {
    /// Issue a GET (empty `body`) or POST (non-empty `body`) to
    /// `http://<host><path>`.
    fn request(&mut self, host: &str, path: &str, body: &[u8]) -> Result<HttpReply, NetworkError>;
}

// ───────────────────────────────────────────────────────────────
// File store port (offline data files)
// ───────────────────────────────────────────────────────────────

/// Append-only file access for the offline handler's per-pin data files.
pub trait FileStorePort {
    /// Whether `path` already exists.
    fn exists(&self, path: &str) -> bool;

    /// Append `data` to `path`, creating the file (and its directory) on
    /// first use.
    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), OfflineError>;
}

// ───────────────────────────────────────────────────────────────
// Platform bundle
// ───────────────────────────────────────────────────────────────

/// Everything the run loop and handlers need from the platform, as a single
/// bound. Blanket-implemented, so any adapter (or test mock) implementing
/// the individual ports satisfies it automatically.
pub trait Platform: SystemPort + GpioPort + WifiPort + HttpPort + FileStorePort {}

impl<T: SystemPort + GpioPort + WifiPort + HttpPort + FileStorePort> Platform for T {}

// ───────────────────────────────────────────────────────────────
// External reader hooks
// ───────────────────────────────────────────────────────────────

/// Application hook for virtual pins outside the built-in bank.
/// Returns the pin value; may also populate `data`/`mime`.
pub type ExternalReader = fn(&mut Pin) -> i32;

/// Application hook producing post-body payloads for `B`/`T` pins.
pub type PostReader = fn(&mut Pin) -> i32;
