//! Alarm supervisor.
//!
//! Runs inside the control loop and tracks two alarm flavors:
//!
//! - **Continuous**: raised by a low battery (or a long-lived fault); the
//!   relay bank stays off until a successful request or voltage recovery
//!   clears it, or auto-restart fires after `AutoRestart` seconds.
//! - **Temporary**: raised by repeated network failures or an explicit
//!   service command; the relay bank is held off for `AlarmPeriod` seconds
//!   and then restored in the same call.
//!
//! Alarms are globally disabled while both `AlarmNetwork` and
//! `AlarmVoltage` are zero.

use log::{info, warn};

use crate::app::ports::{GpioPort, SystemPort};
use crate::config::{Config, Var};
use crate::pins::{ALARM_LEVEL, ALARM_PIN, VirtualPins, X_ALARMED, X_ALARM_COUNT};
use crate::power::PowerBank;
use crate::timing::elapsed_ms;

/// Alarm state, owned by the run-loop context.
#[derive(Debug, Default)]
pub struct Alarms {
    alarmed: bool,
    /// When the current alarm episode began, for the auto-restart timer.
    /// Deliberately left in place when a temporary alarm ends.
    alarmed_at: Option<u32>,
    /// Alarms raised since boot.
    alarms: u32,
    /// Consecutive failed requests since the last success.
    network_failures: u32,
}

impl Alarms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alarmed(&self) -> bool {
        self.alarmed
    }

    pub fn raised_count(&self) -> u32 {
        self.alarms
    }

    pub fn network_failures(&self) -> u32 {
        self.network_failures
    }

    /// Assert (`set`) or clear an alarm.
    ///
    /// Clearing restores the relay defaults; asserting drives the bank off
    /// and either latches (`continuous`) or blocks for `AlarmPeriod`
    /// seconds before restoring.
    pub fn write(
        &mut self,
        set: bool,
        continuous: bool,
        cfg: &Config,
        power: &PowerBank,
        vpins: &mut VirtualPins,
        plat: &mut (impl GpioPort + SystemPort),
    ) {
        if !set {
            if !self.alarmed {
                return;
            }
            info!("alarm: cleared");
            power.apply_defaults(plat);
            plat.digital_write(ALARM_PIN, 0);
            self.alarmed = false;
            self.alarmed_at = None;
            vpins.set(X_ALARMED, 0);
            return;
        }

        if cfg.var(Var::AlarmNetwork) == 0 && cfg.var(Var::AlarmVoltage) == 0 {
            return;
        }

        warn!("alarm: asserted (continuous={continuous})");
        power.all_off(plat);
        plat.digital_write(ALARM_PIN, ALARM_LEVEL);
        self.alarms += 1;
        self.alarmed = true;
        vpins.set(X_ALARMED, 1);
        vpins.set(X_ALARM_COUNT, self.alarms as i32);

        if continuous {
            if self.alarmed_at.is_none() {
                self.alarmed_at = Some(plat.millis());
            }
            return;
        }

        let hold_secs = cfg.var(Var::AlarmPeriod).max(0) as u32;
        plat.delay_ms(hold_secs * 1000);
        power.apply_defaults(plat);
        plat.digital_write(ALARM_PIN, 0);
        self.alarmed = false;
        vpins.set(X_ALARMED, 0);
    }

    /// Record a failed request; trips a temporary alarm when the
    /// `AlarmNetwork` threshold is reached.
    pub fn note_network_failure(
        &mut self,
        cfg: &Config,
        power: &PowerBank,
        vpins: &mut VirtualPins,
        plat: &mut (impl GpioPort + SystemPort),
    ) {
        self.network_failures += 1;
        let threshold = cfg.var(Var::AlarmNetwork);
        warn!(
            "alarm: network failure {}/{}",
            self.network_failures,
            threshold.max(0)
        );
        if threshold > 0 && self.network_failures >= threshold as u32 {
            self.write(true, false, cfg, power, vpins, plat);
            self.network_failures = 0;
        }
    }

    /// Record a successful request: resets the failure counter and clears
    /// any latched alarm.
    pub fn note_network_success(
        &mut self,
        cfg: &Config,
        power: &PowerBank,
        vpins: &mut VirtualPins,
        plat: &mut (impl GpioPort + SystemPort),
    ) {
        self.network_failures = 0;
        if self.alarmed {
            self.write(false, false, cfg, power, vpins, plat);
        }
    }

    /// Start the auto-restart timer (service-commanded alarm pin write).
    pub fn start_timer(&mut self, now: u32) {
        if self.alarmed_at.is_none() {
            self.alarmed_at = Some(now);
        }
    }

    /// Stop the auto-restart timer.
    pub fn clear_timer(&mut self) {
        self.alarmed_at = None;
    }

    /// Seconds the current alarm episode has been running.
    pub fn age_secs(&self, now: u32) -> Option<u32> {
        self.alarmed_at.map(|at| elapsed_ms(now, at) / 1000)
    }
}
