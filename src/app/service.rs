//! The NetSender service — the node's main control loop.
//!
//! [`NetSender`] owns the context, the handler pair, and cycle timing, and
//! exposes a clean, hardware-agnostic API: construct with [`NetSender::init`],
//! then call [`run`](NetSender::run) from the host loop until it returns
//! true. All I/O flows through port traits injected at call sites, so the
//! entire loop is testable with mock adapters.
//!
//! Per-cycle sequence: lag compute → heartbeat → auto-restart check →
//! pulses → voltage check → disconnect → input reads → (re)config →
//! poll/act → vars sync → status flash → pause → deep sleep.

use core::fmt::Write as _;

use log::{info, warn};

use crate::app::context::{Context, DeviceError};
use crate::app::ports::{NvsPort, Platform};
use crate::config::{self, BootReason, RETRY_PERIOD, Var};
use crate::drivers::status_led::{self, Flash};
use crate::error::{Error, NetworkError, Result};
use crate::handlers::{self, HandlerKind, HandlerManager, RequestKind};
use crate::pins::{self, BAT_PIN, NAV_PIN, Pin, X_BOOT_REASON};
use crate::pulse::pulse_pin;
use crate::timing::{CycleClock, ROLLOVER_SECS, elapsed_ms};

/// Vars-fetch attempts per heartbeat.
const HEARTBEAT_ATTEMPTS: u32 = 3;

/// The control loop and its supporting state.
pub struct NetSender {
    ctx: Context,
    handlers: HandlerManager,
    clock: CycleClock,
    /// Varsum at our last applied vars fetch; a mismatch against the
    /// service-advertised sum triggers a refresh.
    varsum_applied: i64,
    /// Set when a reply asked for reconfiguration outside the poll path.
    pending_reconfig: bool,
    last_heartbeat: Option<u32>,
}

impl NetSender {
    /// One-time initialisation: load config, restore the active handler,
    /// establish relay defaults, and cache the radio MAC.
    pub fn init(plat: &mut impl Platform, nvs: &impl NvsPort) -> Self {
        let cfg = config::load(nvs);
        info!(
            "NetSender v{} up, boot reason {:?}",
            cfg.version, cfg.boot_reason
        );

        let mut ctx = Context::new(cfg);
        ctx.vpins
            .set(X_BOOT_REASON, ctx.config.boot_reason as i32);
        apply_log_level(ctx.config.var(Var::LogLevel));

        let mut handlers = HandlerManager::new();
        handlers.restore(nvs);
        let _ = ctx.mode.push_str(handlers.active_name());

        ctx.power.apply_defaults(plat);

        match handlers.init(&mut ctx, plat) {
            Ok(()) => {}
            Err(Error::WifiDisconnect) => {
                ctx.restart(plat, nvs, BootReason::Wifi, true);
            }
            Err(e) => warn!("handler init failed: {e}"),
        }

        Self {
            ctx,
            handlers,
            clock: CycleClock::new(),
            varsum_applied: -1,
            pending_reconfig: false,
            last_heartbeat: None,
        }
    }

    /// Run one cycle. Returns true when the cycle completed cleanly; the
    /// host calls again either way.
    pub fn run(&mut self, plat: &mut impl Platform, nvs: &impl NvsPort) -> bool {
        let now = plat.millis();
        if self.clock.begin_cycle(now, self.ctx.config.mon_period) {
            // The counter wrapped: re-anchor the offline time reference.
            self.ctx.ref_timestamp += ROLLOVER_SECS;
        }

        self.heartbeat(plat, nvs);

        if let Some(age) = self.ctx.alarms.age_secs(now) {
            let auto_restart = self.ctx.config.var(Var::AutoRestart);
            if auto_restart > 0 && age >= auto_restart as u32 {
                self.ctx.restart(plat, nvs, BootReason::Alarm, false);
                return false;
            }
        }

        if !self.ctx.configured || self.ctx.config.dkey.is_empty() {
            self.ctx.config.print();
        }

        let pulsed_ms = self.pulse_trains(plat);

        if !self.check_voltage(plat, pulsed_ms) {
            return false;
        }

        // Radio off before sampling: the ADC reads noisy with it powered.
        if let Err(e) = self.handlers.disconnect(plat) {
            if matches!(e, Error::WifiDisconnect) {
                self.ctx.restart(plat, nvs, BootReason::Wifi, true);
                return false;
            }
        }

        let mut inputs = pins::parse_csv(&self.ctx.config.inputs);
        let mut outputs = pins::parse_csv(&self.ctx.config.outputs);
        for pin in inputs.iter_mut() {
            self.ctx.read_pin(plat, pin);
        }

        if self.pending_reconfig || (inputs.is_empty() && outputs.is_empty()) {
            if !self.configure(plat, nvs) {
                return self.pause(plat, false, pulsed_ms);
            }
            self.pending_reconfig = false;
            inputs = pins::parse_csv(&self.ctx.config.inputs);
            outputs = pins::parse_csv(&self.ctx.config.outputs);
            for pin in inputs.iter_mut() {
                self.ctx.read_pin(plat, pin);
            }
        }

        let mut cycle_ok = true;
        let mut reconfig = false;
        let kind = if !inputs.is_empty() {
            Some(RequestKind::Poll)
        } else if !outputs.is_empty() {
            Some(RequestKind::Act)
        } else {
            None
        };
        if let Some(kind) = kind {
            if let Err(e) =
                self.do_request(plat, nvs, kind, &mut inputs, &mut outputs, &mut reconfig, false)
            {
                warn!("{kind:?} failed: {e}");
                if matches!(e, Error::Network(NetworkError::ConnectFailed)) {
                    status_led::flash(plat, Flash::WifiError);
                }
                cycle_ok = false;
            }
        }

        if reconfig && !self.configure(plat, nvs) {
            return self.pause(plat, false, pulsed_ms);
        }

        if self.ctx.varsum != self.varsum_applied {
            match self.fetch_vars(plat, nvs, false) {
                Ok(()) => {}
                Err(e) => {
                    warn!("vars fetch failed: {e}");
                    cycle_ok = false;
                }
            }
        }

        if cycle_ok {
            status_led::flash(plat, Flash::Ok);
        }
        let ok = self.pause(plat, cycle_ok, pulsed_ms);

        let mon = self.ctx.config.mon_period;
        let act = self.ctx.config.act_period;
        if mon > act {
            plat.deep_sleep_ms(u64::from(mon - act) * 1000);
        }
        ok
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn handlers(&self) -> &HandlerManager {
        &self.handlers
    }

    /// Varsum of the variable set currently applied.
    pub fn varsum(&self) -> i64 {
        self.varsum_applied
    }

    // ── Request plumbing ──────────────────────────────────────

    /// Issue one request through the active handler, with network-failure
    /// accounting. `quiet` suppresses the network alarm (heartbeat path).
    fn do_request(
        &mut self,
        plat: &mut impl Platform,
        nvs: &impl NvsPort,
        kind: RequestKind,
        inputs: &mut [Pin],
        outputs: &mut [Pin],
        reconfig: &mut bool,
        quiet: bool,
    ) -> Result<String> {
        let online = self.handlers.routes_online(kind);
        let result = self
            .handlers
            .request(&mut self.ctx, plat, nvs, kind, inputs, outputs, reconfig);
        match &result {
            Ok(_) if online => {
                self.ctx.alarms.note_network_success(
                    &self.ctx.config,
                    &self.ctx.power,
                    &mut self.ctx.vpins,
                    plat,
                );
            }
            Err(Error::Network(_)) if online && !quiet => {
                self.ctx.alarms.note_network_failure(
                    &self.ctx.config,
                    &self.ctx.power,
                    &mut self.ctx.vpins,
                    plat,
                );
            }
            Err(e) => self.ctx.note_failure(e),
            _ => {}
        }
        result
    }

    /// Fetch and apply the service configuration. Returns success.
    fn configure(&mut self, plat: &mut impl Platform, nvs: &impl NvsPort) -> bool {
        info!("requesting configuration");
        let mut no_inputs: [Pin; 0] = [];
        let mut no_outputs: [Pin; 0] = [];
        let mut reconfig = false;
        let reply = match self.do_request(
            plat,
            nvs,
            RequestKind::Config,
            &mut no_inputs,
            &mut no_outputs,
            &mut reconfig,
            false,
        ) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("config request failed: {e}");
                status_led::flash(plat, Flash::ConfigError);
                return false;
            }
        };

        let mut cfg = self.ctx.config.clone();
        if let Some(mp) = crate::json::extract_int(&reply, "mp") {
            if mp > 0 {
                cfg.mon_period = mp as u16;
            }
        }
        if let Some(ap) = crate::json::extract_int(&reply, "ap") {
            if ap >= 0 {
                cfg.act_period = ap as u16;
            }
        }
        if let Some(wifi) = crate::json::extract(&reply, "wi") {
            assign(&mut cfg.wifi, wifi);
        }
        if let Some(dkey) = crate::json::extract(&reply, "dk") {
            assign(&mut cfg.dkey, dkey);
        }
        for (key, field) in [("ip", &mut cfg.inputs), ("op", &mut cfg.outputs)] {
            if let Some(csv) = crate::json::extract(&reply, key) {
                // A bad list from the service must not corrupt storage.
                match pins::check(csv) {
                    Ok(_) => assign(field, csv),
                    Err(e) => warn!("config: rejected {key} list '{csv}': {e}"),
                }
            }
        }

        if cfg != self.ctx.config {
            self.ctx.config = cfg;
            if let Err(e) = config::save(nvs, &self.ctx.config) {
                warn!("config not persisted: {e}");
            }
            status_led::flash(plat, Flash::ConfigUpdate);
        }
        self.ctx.configured = true;
        true
    }

    /// Fetch the variable set; persist and apply when changed.
    fn fetch_vars(
        &mut self,
        plat: &mut impl Platform,
        nvs: &impl NvsPort,
        quiet: bool,
    ) -> Result<()> {
        let mut no_inputs: [Pin; 0] = [];
        let mut no_outputs: [Pin; 0] = [];
        let mut reconfig = false;
        let reply = self.do_request(
            plat,
            nvs,
            RequestKind::Vars,
            &mut no_inputs,
            &mut no_outputs,
            &mut reconfig,
            quiet,
        )?;

        let (vars, meta) = handlers::parse_vars(&reply);
        if vars != self.ctx.config.vars {
            if let Err(e) = config::save_vars(nvs, &mut self.ctx.config, &vars) {
                warn!("vars not persisted: {e}");
            }
            apply_log_level(self.ctx.config.var(Var::LogLevel));
        }

        if let Some(ts) = meta.ts {
            if ts > 0 {
                // Anchor so that reference + uptime = current epoch.
                let uptime = u64::from(plat.millis() / 1000);
                self.ctx.ref_timestamp = ts.saturating_sub(uptime);
            }
        }
        if let Some(mode) = meta.mode {
            if mode.as_str() != self.handlers.active_name() {
                match self.handlers.set(mode.as_str(), nvs) {
                    Ok(()) => {
                        self.ctx.mode.clear();
                        let _ = self.ctx.mode.push_str(self.handlers.active_name());
                    }
                    Err(e) => warn!("mode '{mode}' rejected: {e}"),
                }
            }
        }

        self.varsum_applied = self.ctx.varsum;
        if reconfig {
            self.pending_reconfig = true;
        }
        Ok(())
    }

    // ── Heartbeat ─────────────────────────────────────────────

    /// While offline, periodically force a vars fetch so the service can
    /// still command a mode change or re-tune the node.
    fn heartbeat(&mut self, plat: &mut impl Platform, nvs: &impl NvsPort) {
        if self.handlers.active() != HandlerKind::Offline {
            return;
        }
        let now = plat.millis();
        let period = self.ctx.config.var(Var::HeartbeatPeriod);
        let due = match self.last_heartbeat {
            None => true,
            Some(prev) => period > 0 && elapsed_ms(now, prev) / 1000 >= period as u32,
        };
        if !due {
            return;
        }

        info!("heartbeat: fetching vars");
        for attempt in 1..=HEARTBEAT_ATTEMPTS {
            match self.fetch_vars(plat, nvs, true) {
                Ok(()) => break,
                Err(e) => {
                    warn!("heartbeat attempt {attempt}/{HEARTBEAT_ATTEMPTS} failed: {e}");
                    if attempt < HEARTBEAT_ATTEMPTS {
                        plat.delay_ms(u32::from(RETRY_PERIOD) * 1000);
                    }
                }
            }
        }
        self.last_heartbeat = Some(now);

        if self.pending_reconfig && self.configure(plat, nvs) {
            self.pending_reconfig = false;
        }
        if let Err(Error::WifiDisconnect) = self.handlers.disconnect(plat) {
            self.ctx.restart(plat, nvs, BootReason::Wifi, true);
        }
    }

    // ── Pulsing ───────────────────────────────────────────────

    /// Emit the configured pulse trains, with `PulseCycle` gaps, filling at
    /// most the monitor period. Returns total milliseconds consumed.
    fn pulse_trains(&mut self, plat: &mut impl Platform) -> u32 {
        let pulses = self.ctx.config.var(Var::Pulses);
        let width = self.ctx.config.var(Var::PulseWidth);
        if pulses == 0 || width == 0 {
            self.ctx.vpins.clear_pulse_suppress();
            return 0;
        }

        let duty = self.ctx.config.var(Var::PulseDutyCycle);
        let cycle = self.ctx.config.var(Var::PulseCycle);
        let mon = self.ctx.config.mon_period;
        let suppress = self.ctx.vpins.pulse_suppressed();

        let train_ms = pulse_pin(plat, NAV_PIN, pulses, width, duty, mon, suppress);
        let mut total = train_ms;
        if train_ms > 0 && cycle > 0 {
            let gap = (cycle as u32 * 1000).saturating_sub(train_ms);
            let budget = u32::from(mon) * 1000;
            while total + gap + train_ms <= budget {
                plat.delay_ms(gap);
                let t = pulse_pin(plat, NAV_PIN, pulses, width, duty, mon, suppress);
                if t == 0 {
                    break;
                }
                total += gap + t;
            }
        }
        self.ctx.vpins.clear_pulse_suppress();
        total
    }

    // ── Voltage supervision ───────────────────────────────────

    /// Battery check with alarm hysteresis. Returns false when the cycle
    /// must end early (alarmed and not yet recovered).
    fn check_voltage(&mut self, plat: &mut impl Platform, pulsed_ms: u32) -> bool {
        let alarm_v = self.ctx.config.var(Var::AlarmVoltage);
        if alarm_v <= 0 {
            return true;
        }

        let mut name = heapless::String::<4>::new();
        let _ = write!(name, "A{BAT_PIN}");
        let mut bat = match Pin::new(&name) {
            Some(pin) => pin,
            None => return true,
        };
        self.ctx.read_pin(plat, &mut bat);
        let reading = bat.value;

        if reading < alarm_v {
            warn!("voltage alarm: battery {reading} below {alarm_v}");
            self.ctx.raise_error(DeviceError::LowVoltage);
            if !self.ctx.alarms.alarmed() {
                self.ctx.alarms.write(
                    true,
                    true,
                    &self.ctx.config,
                    &self.ctx.power,
                    &mut self.ctx.vpins,
                    plat,
                );
            }
            status_led::flash(plat, Flash::VoltageAlarm);
            self.pause(plat, false, pulsed_ms);
            return false;
        }

        let recovery_v = self.ctx.config.var(Var::AlarmRecoveryVoltage);
        if self.ctx.alarms.alarmed() && reading < recovery_v {
            info!("voltage alarm: battery {reading} awaiting recovery to {recovery_v}");
            status_led::flash(plat, Flash::VoltageAlarm);
            self.pause(plat, false, pulsed_ms);
            return false;
        }

        if self.ctx.alarms.alarmed() {
            self.ctx.alarms.write(
                false,
                false,
                &self.ctx.config,
                &self.ctx.power,
                &mut self.ctx.vpins,
                plat,
            );
            // The alarm that caused the last restart has now cleared.
            if self.ctx.config.boot_reason == BootReason::Alarm {
                self.ctx.config.boot_reason = BootReason::Clear;
            }
        }
        if self.ctx.error == DeviceError::LowVoltage {
            self.ctx.error = DeviceError::None;
        }
        if reading > self.ctx.config.var(Var::PeakVoltage) {
            warn!("battery {reading} exceeds peak voltage");
        }
        true
    }

    // ── Pausing ───────────────────────────────────────────────

    /// Fill the actuation window, compensating for pulse time and carried
    /// lag. After a failure with no pulse activity this cycle, just wait
    /// the retry period.
    fn pause(&mut self, plat: &mut impl Platform, ok: bool, pulsed_ms: u32) -> bool {
        if !ok && pulsed_ms == 0 {
            plat.delay_ms(u32::from(RETRY_PERIOD) * 1000);
            return ok;
        }
        let window = u32::from(self.ctx.config.act_period) * 1000;
        let spent = pulsed_ms.saturating_add(self.clock.lag_ms());
        if window > spent {
            plat.delay_ms(window - spent);
            self.clock.clear_lag();
        }
        ok
    }
}

/// Map the LogLevel variable onto the `log` facade's filter.
fn apply_log_level(level: i32) {
    let filter = match level {
        ..=0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    log::set_max_level(filter);
}

/// Clear-and-set a fixed-capacity string, truncating oversize input.
fn assign<const N: usize>(field: &mut heapless::String<N>, text: &str) {
    field.clear();
    let _ = field.push_str(&text[..text.len().min(N)]);
}
