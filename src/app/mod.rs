//! Application core — the control loop and its boundary.
//!
//! [`service`] owns the per-cycle sequencing, [`context`] bundles the
//! process-wide state, and [`ports`] defines the traits the platform
//! adapters implement. Everything here is hardware-agnostic and fully
//! testable with mock adapters.

pub mod context;
pub mod ports;
pub mod service;
