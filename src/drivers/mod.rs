//! Peripheral drivers built on the port traits.

pub mod status_led;
