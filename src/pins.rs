//! Pin naming, parsing, and board assignments.
//!
//! Single source of truth — every module references this file rather than
//! hard-coding pin numbers or name rules.
//!
//! A pin name is a kind prefix followed by one or two decimal digits:
//!
//! - `A` analog hardware input/output
//! - `B` binary post-body payload (external reader)
//! - `D` digital hardware input/output
//! - `T` text post-body payload (external reader)
//! - `X` virtual pin (software-defined scalar)

use crate::error::{PinError, Result};

// ---------------------------------------------------------------------------
// Board assignments (ESP32 main board)
// ---------------------------------------------------------------------------

/// ADC input wired to the battery voltage divider.
pub const BAT_PIN: u8 = 35;
/// Digital output driving the external alarm indicator.
pub const ALARM_PIN: u8 = 25;
/// Navigation-light output; doubles as the status flash LED.
pub const NAV_PIN: u8 = 26;
/// Logic level that asserts the alarm indicator.
pub const ALARM_LEVEL: i32 = 1;

/// Relay bank driving the power distribution unit.
pub const NUM_RELAYS: usize = 4;
/// GPIO numbers for Power0..Power3.
pub const RELAY_PINS: [u8; NUM_RELAYS] = [16, 17, 18, 19];

// ---------------------------------------------------------------------------
// Pin name rules
// ---------------------------------------------------------------------------

/// Most pins a single inputs or outputs list may hold.
pub const MAX_PINS: usize = 10;

/// Longest valid pin name ("A99" style — prefix plus two digits).
pub const MAX_PIN_NAME: usize = 3;

/// Fixed-capacity pin name.
pub type PinName = heapless::String<MAX_PIN_NAME>;

/// Pin kind, taken from the first character of the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinKind {
    Analog,
    Binary,
    Digital,
    Text,
    Virtual,
}

impl PinKind {
    /// Parse a kind from a name's first byte.
    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            'A' => Some(Self::Analog),
            'B' => Some(Self::Binary),
            'D' => Some(Self::Digital),
            'T' => Some(Self::Text),
            'X' => Some(Self::Virtual),
            _ => None,
        }
    }
}

/// One sampled or commanded pin. Ephemeral: constructed fresh each cycle.
#[derive(Debug, Clone, Default)]
pub struct Pin {
    pub name: PinName,
    pub value: i32,
    /// Binary payload for `B`/`T` pins, concatenated into the POST body.
    pub data: Option<Vec<u8>>,
    /// MIME type accompanying `data`.
    pub mime: Option<String>,
}

impl Pin {
    /// Construct a pin from a validated name.
    pub fn new(name: &str) -> Option<Self> {
        validate_name(name)?;
        let mut pin = Self::default();
        // Length was just validated against the buffer capacity.
        pin.name.push_str(name).ok()?;
        pin.value = -1;
        Some(pin)
    }

    /// Kind prefix of this pin.
    pub fn kind(&self) -> PinKind {
        // A Pin is only constructible with a validated name.
        PinKind::from_prefix(self.name.chars().next().unwrap_or('X')).unwrap_or(PinKind::Virtual)
    }

    /// Decimal pin number following the prefix.
    pub fn number(&self) -> u8 {
        self.name[1..].parse().unwrap_or(0)
    }
}

/// Validate `[ABDTX][0-9]{1,2}` with total length under 4.
fn validate_name(name: &str) -> Option<()> {
    let mut chars = name.chars();
    PinKind::from_prefix(chars.next()?)?;
    let digits = chars.as_str();
    if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(())
}

/// Parse a comma-separated pin list, silently dropping invalid tokens.
///
/// Used when loading from the stored configuration, where a bad token must
/// not take the node down. Stops after [`MAX_PINS`] valid entries.
pub fn parse_csv(csv: &str) -> heapless::Vec<Pin, MAX_PINS> {
    let mut pins = heapless::Vec::new();
    for token in csv.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some(pin) = Pin::new(token) {
            if pins.push(pin).is_err() {
                break;
            }
        }
    }
    pins
}

/// Strictly validate a service-supplied pin list.
///
/// Returns the pin count, or an error if any token is invalid or the list
/// is too long — a bad list from the service must be rejected before it
/// reaches persistent storage.
pub fn check(csv: &str) -> Result<usize> {
    if csv.is_empty() {
        return Ok(0);
    }
    let mut count = 0;
    for token in csv.split(',') {
        if validate_name(token.trim()).is_none() {
            return Err(PinError::BadList.into());
        }
        count += 1;
    }
    if count > MAX_PINS {
        return Err(PinError::BadList.into());
    }
    Ok(count)
}

// ---------------------------------------------------------------------------
// Virtual pin bank
// ---------------------------------------------------------------------------

/// Number of software-defined `X` pins held in the bank.
pub const X_PIN_COUNT: usize = 15;

/// X0: upstream bandwidth estimate, bytes per second.
pub const X_BW_UP: usize = 0;
/// X1: downstream bandwidth estimate, bytes per second.
pub const X_BW_DOWN: usize = 1;
/// X2: last request round-trip, milliseconds.
pub const X_REQUEST_MS: usize = 2;
/// X10: last battery reading. Initialised to -1; the only pin whose
/// negative value is still reported to the service (legacy behavior the
/// cloud side depends on).
pub const X_BAT: usize = 10;
/// X11: alarmed flag (0/1).
pub const X_ALARMED: usize = 11;
/// X12: alarms raised since boot.
pub const X_ALARM_COUNT: usize = 12;
/// X13: boot reason of the current boot.
pub const X_BOOT_REASON: usize = 13;
/// X14: one-shot pulse-suppression flag, cleared at the end of each cycle.
pub const X_PULSE_SUPPRESS: usize = 14;

/// Fixed-size bank of virtual pin values.
///
/// Reads of indices outside the bank are delegated by the registry to the
/// external reader, so applications can expose their own virtual pins.
#[derive(Debug)]
pub struct VirtualPins {
    values: [i32; X_PIN_COUNT],
}

impl Default for VirtualPins {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualPins {
    pub fn new() -> Self {
        let mut values = [0; X_PIN_COUNT];
        values[X_BAT] = -1;
        Self { values }
    }

    /// Value at `index`, or `None` when the index is outside the bank.
    pub fn get(&self, index: usize) -> Option<i32> {
        self.values.get(index).copied()
    }

    /// Set `index` if it is inside the bank; out-of-bank writes are dropped.
    pub fn set(&mut self, index: usize, value: i32) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    /// Whether pulse output is suppressed this cycle.
    pub fn pulse_suppressed(&self) -> bool {
        self.values[X_PULSE_SUPPRESS] != 0
    }

    /// Clear the one-shot suppression flag at the end of a cycle.
    pub fn clear_pulse_suppress(&mut self) {
        self.values[X_PULSE_SUPPRESS] = 0;
    }
}
