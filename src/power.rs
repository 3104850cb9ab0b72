//! Relay bank — the node's power distribution unit.
//!
//! Four relays gate downstream loads. Power0 feeds the always-on load
//! (typically the rig controller) and defaults on; the rest default off.
//! The service toggles them through the "Power0".."Power3" variables; an
//! alarm forces every relay to its inactive level until the alarm clears.

use log::info;

use crate::app::ports::GpioPort;
use crate::pins::{NUM_RELAYS, RELAY_PINS};

/// One relay output.
#[derive(Debug, Clone, Copy)]
pub struct PowerPin {
    /// Hardware GPIO driving the relay coil.
    pub pin: u8,
    /// Variable name the service uses to command this relay.
    pub name: &'static str,
    /// Level applied outside alarm conditions.
    pub default_on: bool,
}

/// The fixed relay table.
#[derive(Debug, Clone, Copy)]
pub struct PowerBank {
    pins: [PowerPin; NUM_RELAYS],
}

impl Default for PowerBank {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerBank {
    pub fn new() -> Self {
        Self {
            pins: [
                PowerPin { pin: RELAY_PINS[0], name: "Power0", default_on: true },
                PowerPin { pin: RELAY_PINS[1], name: "Power1", default_on: false },
                PowerPin { pin: RELAY_PINS[2], name: "Power2", default_on: false },
                PowerPin { pin: RELAY_PINS[3], name: "Power3", default_on: false },
            ],
        }
    }

    pub fn pins(&self) -> &[PowerPin; NUM_RELAYS] {
        &self.pins
    }

    /// Drive every relay to its default level.
    pub fn apply_defaults(&self, gpio: &mut impl GpioPort) {
        for relay in &self.pins {
            gpio.digital_write(relay.pin, i32::from(relay.default_on));
        }
        info!("power: relays restored to defaults");
    }

    /// Drive every relay to the inactive level, regardless of default.
    pub fn all_off(&self, gpio: &mut impl GpioPort) {
        for relay in &self.pins {
            gpio.digital_write(relay.pin, 0);
        }
        info!("power: relays driven off");
    }
}
