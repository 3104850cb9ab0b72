//! Unified error types for the NetSender firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! top-level control loop's error handling uniform. All variants are `Copy`
//! so they can be cheaply passed through the run loop without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Transport failure or non-200 service response.
    Network(NetworkError),
    /// Persistent store read/write failed.
    Store(StoreError),
    /// A pin name or pin-list CSV failed validation.
    Pin(PinError),
    /// Offline data file open/write failed.
    Offline(OfflineError),
    /// Malformed service reply or missing required field.
    Config(&'static str),
    /// Radio power-down failed; treated as fatal by the run loop.
    WifiDisconnect,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "network: {e}"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Pin(e) => write!(f, "pin: {e}"),
            Self::Offline(e) => write!(f, "offline: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::WifiDisconnect => write!(f, "wifi disconnect failed"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Network errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    /// Radio failed to power on or associate with any access point.
    ConnectFailed,
    /// TCP connect or socket I/O failed.
    TransportFailed,
    /// Request completed with a non-redirect, non-200 status.
    BadStatus(u16),
    /// Redirect reply carried no usable Location header.
    BadRedirect,
    /// Request exceeded its timeout.
    Timeout,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::TransportFailed => write!(f, "transport failed"),
            Self::BadStatus(code) => write!(f, "HTTP status {code}"),
            Self::BadRedirect => write!(f, "redirect without location"),
            Self::Timeout => write!(f, "request timed out"),
        }
    }
}

impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Self::Network(e)
    }
}

// ---------------------------------------------------------------------------
// Persistent store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Requested key does not exist.
    NotFound,
    /// Stored blob is shorter than the expected layout.
    Truncated,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Truncated => write!(f, "blob truncated"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Pin errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinError {
    /// Name does not match `[ABDTX][0-9]{1,2}`.
    BadName,
    /// Service-supplied CSV contains an invalid token or too many pins.
    BadList,
}

impl fmt::Display for PinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadName => write!(f, "invalid pin name"),
            Self::BadList => write!(f, "invalid pin list"),
        }
    }
}

impl From<PinError> for Error {
    fn from(e: PinError) -> Self {
        Self::Pin(e)
    }
}

// ---------------------------------------------------------------------------
// Offline storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineError {
    /// Data file could not be created or opened for append.
    OpenFailed,
    /// Record write failed part-way.
    WriteFailed,
}

impl fmt::Display for OfflineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed => write!(f, "file open failed"),
            Self::WriteFailed => write!(f, "file write failed"),
        }
    }
}

impl From<OfflineError> for Error {
    fn from(e: OfflineError) -> Self {
        Self::Offline(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
