//! Shared run-loop context.
//!
//! One owning value bundles everything that used to be process-wide state:
//! the configuration, the virtual pin bank, the alarm supervisor, the relay
//! bank, and the mode/error pair. It is constructed once in `init` and
//! threaded through the run loop and handlers — no hidden globals.

use log::warn;

use crate::app::ports::{ExternalReader, GpioPort, NvsPort, Platform, PostReader, SystemPort};
use crate::config::{self, BootReason, Config};
use crate::drivers::status_led::{self, Flash};
use crate::error::Error;
use crate::pins::{
    ALARM_LEVEL, ALARM_PIN, BAT_PIN, Pin, PinKind, VirtualPins, X_BAT, X_PIN_COUNT,
    X_PULSE_SUPPRESS,
};
use crate::power::PowerBank;

/// Device-visible error, echoed to the service as the `er` parameter on
/// config requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceError {
    #[default]
    None,
    LowVoltage,
    SdCardFailure,
}

impl DeviceError {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::LowVoltage => "LowVoltage",
            Self::SdCardFailure => "SDCardFailure",
        }
    }
}

/// The run-loop's owning state bundle.
pub struct Context {
    pub config: Config,
    pub vpins: VirtualPins,
    pub alarms: crate::alarm::Alarms,
    pub power: PowerBank,
    /// Active handler name, echoed as the `md` parameter.
    pub mode: heapless::String<16>,
    pub error: DeviceError,
    /// Server-side checksum of the variable set, from the last reply.
    pub varsum: i64,
    /// Absolute epoch seconds at counter zero; anchors offline records.
    pub ref_timestamp: u64,
    /// Whether a config reply has been applied since boot.
    pub configured: bool,
    /// One-shot battery override for bench testing, set via an X-pin write.
    pub sim_bat: Option<i32>,
    pub external_reader: Option<ExternalReader>,
    pub post_reader: Option<PostReader>,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            vpins: VirtualPins::new(),
            alarms: crate::alarm::Alarms::new(),
            power: PowerBank::new(),
            mode: heapless::String::new(),
            error: DeviceError::None,
            varsum: -1,
            ref_timestamp: 0,
            configured: false,
            sim_bat: None,
            external_reader: None,
            post_reader: None,
        }
    }

    // ── Pin registry dispatch ─────────────────────────────────

    /// Read one pin, dispatching on its kind prefix.
    pub fn read_pin(&mut self, plat: &mut (impl GpioPort + SystemPort), pin: &mut Pin) {
        let num = pin.number();
        match pin.kind() {
            PinKind::Analog => {
                if num == BAT_PIN {
                    if let Some(v) = self.sim_bat.take() {
                        pin.value = v;
                        self.vpins.set(X_BAT, v);
                        return;
                    }
                }
                // The ADC needs settling reads right after boot, before the
                // first monitor period has elapsed.
                if u64::from(plat.millis()) < u64::from(self.config.mon_period) * 1000 {
                    for _ in 0..3 {
                        let _ = plat.analog_read(num);
                        plat.delay_ms(20);
                    }
                }
                pin.value = plat.analog_read(num);
                if num == BAT_PIN {
                    self.vpins.set(X_BAT, pin.value);
                }
            }
            PinKind::Binary | PinKind::Text => {
                pin.value = match self.post_reader {
                    Some(reader) => reader(pin),
                    None => -1,
                };
            }
            PinKind::Digital => {
                pin.value = plat.digital_read(num);
            }
            PinKind::Virtual => {
                let index = num as usize;
                pin.value = if index < X_PIN_COUNT {
                    self.vpins.get(index).unwrap_or(-1)
                } else {
                    match self.external_reader {
                        Some(reader) => reader(pin),
                        None => -1,
                    }
                };
            }
        }
    }

    /// Write one pin, dispatching on its kind prefix.
    pub fn write_pin(&mut self, plat: &mut (impl GpioPort + SystemPort), pin: &Pin) {
        let num = pin.number();
        match pin.kind() {
            PinKind::Analog => plat.analog_write(num, pin.value),
            PinKind::Digital => {
                plat.digital_write(num, pin.value);
                if num == ALARM_PIN {
                    if pin.value == ALARM_LEVEL {
                        self.alarms.start_timer(plat.millis());
                    } else {
                        self.alarms.clear_timer();
                    }
                }
            }
            PinKind::Virtual => match num as usize {
                X_BAT => self.sim_bat = Some(pin.value),
                // Latched only; the pulse path clears it at end of cycle.
                X_PULSE_SUPPRESS => {
                    if pin.value == 1 {
                        self.vpins.set(X_PULSE_SUPPRESS, 1);
                    }
                }
                _ => {}
            },
            PinKind::Binary | PinKind::Text => {}
        }
    }

    // ── Restart path ──────────────────────────────────────────

    /// Persist the boot reason, put the rig in a safe state, and reset.
    ///
    /// With `alarm` set, a continuous alarm is asserted and given two
    /// seconds to settle before the reset, so the relay bank is already
    /// safe if the reset itself hangs.
    pub fn restart(
        &mut self,
        plat: &mut impl Platform,
        nvs: &impl NvsPort,
        reason: BootReason,
        alarm: bool,
    ) {
        warn!("restarting: {reason:?}");
        let persisted = reason.persisted();
        if self.config.boot_reason != persisted {
            self.config.boot_reason = persisted;
            if let Err(e) = config::save(nvs, &self.config) {
                warn!("restart: boot reason not persisted: {e}");
            }
        }
        self.power.apply_defaults(plat);
        if alarm {
            self.alarms.write(
                true,
                true,
                &self.config,
                &self.power,
                &mut self.vpins,
                plat,
            );
            plat.delay_ms(2000);
        }
        status_led::flash(plat, Flash::Restart);
        plat.restart();
    }

    /// Record a failure observable by the service, keeping the first cause.
    pub fn raise_error(&mut self, error: DeviceError) {
        if self.error == DeviceError::None {
            self.error = error;
        }
    }

    /// Map an internal error onto the device-visible error set.
    pub fn note_failure(&mut self, error: &Error) {
        if let Error::Offline(_) = error {
            self.raise_error(DeviceError::SdCardFailure);
        }
    }
}
