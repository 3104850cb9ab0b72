//! Persistent node configuration.
//!
//! The configuration is stored as a single packed byte image at offset 0 of
//! the NVS blob, in a fixed field order with null-padded strings. It is the
//! single source of truth for runtime behavior: created once by `init`,
//! mutated only through config and vars updates, and persisted on every
//! mutation.
//!
//! Erased flash reads as 0xFF, so every byte is translated to 0x00 on load.
//! A stored image from a different minor-version family (`version/10`) is
//! discarded wholesale rather than migrated.

use log::info;

use crate::app::ports::NvsPort;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Compile-time constants
// ---------------------------------------------------------------------------

/// Firmware version, persisted in the config image. `VERSION/10` is the
/// minor-version family; images from another family are invalidated.
pub const VERSION: u16 = 214;

/// Cloud service host.
pub const SERVICE_HOST: &str = "data.netsender.io";

/// Fallback Wi-Fi credentials ("ssid,key") used when the configured
/// network is unreachable.
pub const DEFAULT_WIFI: &str = "netsender,netsender";

/// Seconds between retries after a failed cycle; also the floor applied to
/// a zeroed monitor period.
pub const RETRY_PERIOD: u16 = 5;

/// Field widths inside the packed image.
pub const WIFI_LEN: usize = 80;
pub const DKEY_LEN: usize = 32;
pub const IO_LEN: usize = 80;
pub const RESERVED_LEN: usize = 8;

/// Total size of the packed image.
pub const CONFIG_SIZE: usize =
    8 + WIFI_LEN + DKEY_LEN + 2 * IO_LEN + NUM_VARS * 4 + RESERVED_LEN;

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

/// Number of tunable variables persisted in the image tail.
pub const NUM_VARS: usize = 12;

/// Tunable variables, synchronized from the service vars endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Var {
    LogLevel = 0,
    Pulses,
    PulseWidth,
    PulseDutyCycle,
    PulseCycle,
    AutoRestart,
    AlarmPeriod,
    AlarmNetwork,
    AlarmVoltage,
    AlarmRecoveryVoltage,
    PeakVoltage,
    HeartbeatPeriod,
}

impl Var {
    pub const ALL: [Var; NUM_VARS] = [
        Var::LogLevel,
        Var::Pulses,
        Var::PulseWidth,
        Var::PulseDutyCycle,
        Var::PulseCycle,
        Var::AutoRestart,
        Var::AlarmPeriod,
        Var::AlarmNetwork,
        Var::AlarmVoltage,
        Var::AlarmRecoveryVoltage,
        Var::PeakVoltage,
        Var::HeartbeatPeriod,
    ];

    /// Wire name, as it appears in a vars reply.
    pub fn name(self) -> &'static str {
        match self {
            Self::LogLevel => "LogLevel",
            Self::Pulses => "Pulses",
            Self::PulseWidth => "PulseWidth",
            Self::PulseDutyCycle => "PulseDutyCycle",
            Self::PulseCycle => "PulseCycle",
            Self::AutoRestart => "AutoRestart",
            Self::AlarmPeriod => "AlarmPeriod",
            Self::AlarmNetwork => "AlarmNetwork",
            Self::AlarmVoltage => "AlarmVoltage",
            Self::AlarmRecoveryVoltage => "AlarmRecoveryVoltage",
            Self::PeakVoltage => "PeakVoltage",
            Self::HeartbeatPeriod => "HeartbeatPeriod",
        }
    }

    /// Value assumed when a variable is absent from the service reply.
    pub fn default_value(self) -> i32 {
        match self {
            Self::AutoRestart => 600,
            Self::PeakVoltage => 845,
            _ => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Boot reason
// ---------------------------------------------------------------------------

/// Why the node (re)booted. Persisted in the config image so the cause of
/// the previous restart survives into the next boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum BootReason {
    #[default]
    Normal = 0,
    /// Radio power-down failed; the node restarted to recover the ADC bus.
    Wifi = 1,
    /// A continuous alarm aged past AutoRestart.
    Alarm = 2,
    /// Transient marker: the alarm cleared after an alarm-caused boot.
    /// Coerced to `Alarm` before persisting so a crash mid-clear is still
    /// observable as an alarm-caused boot.
    Clear = 3,
}

impl BootReason {
    pub fn from_u16(raw: u16) -> Self {
        match raw {
            1 => Self::Wifi,
            2 => Self::Alarm,
            3 => Self::Clear,
            _ => Self::Normal,
        }
    }

    /// The value actually written to persistent storage.
    pub fn persisted(self) -> Self {
        if self == Self::Clear { Self::Alarm } else { self }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// In-memory view of the packed configuration image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub version: u16,
    /// Nominal seconds between cycle starts.
    pub mon_period: u16,
    /// Active (non-sleeping) window within a cycle, seconds.
    pub act_period: u16,
    pub boot_reason: BootReason,
    /// Wi-Fi credentials as "ssid,key".
    pub wifi: heapless::String<WIFI_LEN>,
    /// Device key issued by the service.
    pub dkey: heapless::String<DKEY_LEN>,
    /// Inputs CSV (pin names sampled each cycle).
    pub inputs: heapless::String<IO_LEN>,
    /// Outputs CSV (pin names commanded from poll/act replies).
    pub outputs: heapless::String<IO_LEN>,
    pub vars: [i32; NUM_VARS],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: VERSION,
            mon_period: RETRY_PERIOD,
            act_period: 0,
            boot_reason: BootReason::Normal,
            wifi: heapless::String::new(),
            dkey: heapless::String::new(),
            inputs: heapless::String::new(),
            outputs: heapless::String::new(),
            vars: [0; NUM_VARS],
        }
    }
}

impl Config {
    pub fn var(&self, var: Var) -> i32 {
        self.vars[var as usize]
    }

    pub fn set_var(&mut self, var: Var, value: i32) {
        self.vars[var as usize] = value;
    }

    /// Alarm thresholds can never exceed the battery's peak reading.
    pub fn clamp_alarm_voltages(&mut self) {
        let peak = self.var(Var::PeakVoltage);
        for var in [Var::AlarmVoltage, Var::AlarmRecoveryVoltage] {
            if self.var(var) > peak {
                self.set_var(var, peak);
            }
        }
    }

    // ── Packed codec ──────────────────────────────────────────

    /// Serialize to the packed image. The buffer is zeroed first so string
    /// padding never leaks stack residue.
    pub fn to_bytes(&self) -> [u8; CONFIG_SIZE] {
        let mut buf = [0u8; CONFIG_SIZE];
        buf[0..2].copy_from_slice(&self.version.to_le_bytes());
        buf[2..4].copy_from_slice(&self.mon_period.to_le_bytes());
        buf[4..6].copy_from_slice(&self.act_period.to_le_bytes());
        // Clear is an in-memory marker only; it lands on flash as Alarm so
        // a crash mid-clear still reads as an alarm-caused boot.
        buf[6..8].copy_from_slice(&(self.boot_reason.persisted() as u16).to_le_bytes());

        let mut at = 8;
        for (text, width) in [
            (self.wifi.as_str(), WIFI_LEN),
            (self.dkey.as_str(), DKEY_LEN),
            (self.inputs.as_str(), IO_LEN),
            (self.outputs.as_str(), IO_LEN),
        ] {
            let bytes = text.as_bytes();
            buf[at..at + bytes.len()].copy_from_slice(bytes);
            at += width;
        }

        for value in self.vars {
            buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
            at += 4;
        }
        buf
    }

    /// Deserialize from a packed image, translating erased (0xFF) bytes to
    /// zero first.
    pub fn from_bytes(raw: &[u8; CONFIG_SIZE]) -> Self {
        let mut buf = *raw;
        for byte in &mut buf {
            if *byte == 0xFF {
                *byte = 0;
            }
        }

        let u16_at = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);
        let mut cfg = Self {
            version: u16_at(0),
            mon_period: u16_at(2),
            act_period: u16_at(4),
            boot_reason: BootReason::from_u16(u16_at(6)),
            ..Self::default()
        };

        let mut at = 8;
        for (field, width) in [
            (&mut cfg.wifi as &mut dyn PushStr, WIFI_LEN),
            (&mut cfg.dkey as &mut dyn PushStr, DKEY_LEN),
            (&mut cfg.inputs as &mut dyn PushStr, IO_LEN),
            (&mut cfg.outputs as &mut dyn PushStr, IO_LEN),
        ] {
            field.assign(unpad(&buf[at..at + width]));
            at += width;
        }

        for slot in &mut cfg.vars {
            *slot = i32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
            at += 4;
        }
        cfg
    }

    /// Emit every field to the console in a stable order.
    pub fn print(&self) {
        info!("version:    {}", self.version);
        info!("monPeriod:  {}", self.mon_period);
        info!("actPeriod:  {}", self.act_period);
        info!("bootReason: {:?}", self.boot_reason);
        info!("wifi:       {}", self.wifi);
        info!("dkey:       {}", self.dkey);
        info!("inputs:     {}", self.inputs);
        info!("outputs:    {}", self.outputs);
        for var in Var::ALL {
            info!("{}: {}", var.name(), self.var(var));
        }
    }
}

/// Null-terminated fixed-width string field → str slice.
fn unpad(field: &[u8]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    core::str::from_utf8(&field[..end]).unwrap_or("")
}

/// Assign into differently-sized heapless strings through one loop.
trait PushStr {
    fn assign(&mut self, text: &str);
}

impl<const N: usize> PushStr for heapless::String<N> {
    fn assign(&mut self, text: &str) {
        self.clear();
        // Truncate rather than fail: the source field is never wider than N.
        let _ = self.push_str(&text[..text.len().min(N)]);
    }
}

// ---------------------------------------------------------------------------
// Persistent store operations
// ---------------------------------------------------------------------------

/// NVS key holding the packed config image.
pub const CONFIG_KEY: &str = "config";

/// Load the config image, applying the erased-byte translation, the
/// version-family check, and the monitor-period floor.
pub fn load(store: &dyn NvsPort) -> Config {
    let mut raw = [0u8; CONFIG_SIZE];
    let mut cfg = match store.read_blob(CONFIG_KEY, &mut raw) {
        Ok(_) => Config::from_bytes(&raw),
        Err(e) => {
            info!("config: no stored image ({e}), starting clean");
            Config::default()
        }
    };

    if cfg.version / 10 != VERSION / 10 {
        info!(
            "config: version family changed ({} -> {}), clearing",
            cfg.version, VERSION
        );
        cfg = Config {
            version: VERSION,
            ..Config::default()
        };
        cfg.mon_period = 0;
        if let Err(e) = save(store, &cfg) {
            log::warn!("config: clear-on-mismatch write failed: {e}");
        }
    }
    if cfg.mon_period == 0 {
        cfg.mon_period = RETRY_PERIOD;
    }
    cfg
}

/// Persist the full config image and print it.
pub fn save(store: &dyn NvsPort, cfg: &Config) -> Result<()> {
    store.write_blob(CONFIG_KEY, &cfg.to_bytes())?;
    info!("config: saved {} bytes", CONFIG_SIZE);
    cfg.print();
    Ok(())
}

/// Replace the variables tail and persist the whole image.
pub fn save_vars(store: &dyn NvsPort, cfg: &mut Config, vars: &[i32; NUM_VARS]) -> Result<()> {
    cfg.vars = *vars;
    save(store, cfg)
}
