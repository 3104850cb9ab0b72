//! Status LED driver.
//!
//! The navigation-light pin doubles as a status indicator: a short burst of
//! flashes at the end of each cycle (or on the way into a restart) reports
//! the node's condition to anyone standing at the rig.
//!
//! Flash counts are part of the field-service contract — do not renumber.

use crate::app::ports::{GpioPort, SystemPort};
use crate::pins::NAV_PIN;

/// Status flash codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Flash {
    Ok = 1,
    ConfigError = 2,
    WifiError = 3,
    ConfigUpdate = 4,
    VoltageAlarm = 5,
    Restart = 6,
}

/// Milliseconds the LED is held on, and then off, per flash.
const FLASH_MS: u32 = 100;

/// Flash the status LED `pattern as u32` times.
pub fn flash(plat: &mut (impl GpioPort + SystemPort), pattern: Flash) {
    for _ in 0..pattern as u32 {
        plat.digital_write(NAV_PIN, 1);
        plat.delay_ms(FLASH_MS);
        plat.digital_write(NAV_PIN, 0);
        plat.delay_ms(FLASH_MS);
    }
}
