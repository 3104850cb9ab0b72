//! Request handlers — how sampled inputs reach the service.
//!
//! Exactly one handler is active at a time. `Online` speaks plaintext HTTP
//! to the cloud service; `Offline` caches poll data to local storage and
//! borrows the online handler for the few requests that genuinely need the
//! network. The active handler is a tagged variant (not a trait object):
//! the set is closed, and the tag is what gets persisted.

pub mod offline;
pub mod online;

pub use offline::OfflineHandler;
pub use online::OnlineHandler;

use log::info;

use crate::app::context::Context;
use crate::app::ports::{NvsPort, Platform};
use crate::config::{NUM_VARS, Var};
use crate::error::{Error, Result};
use crate::json;
use crate::pins::Pin;

/// NVS key holding the active handler name.
pub const MODE_KEY: &str = "mode";

// ───────────────────────────────────────────────────────────────
// Request vocabulary
// ───────────────────────────────────────────────────────────────

/// The four service requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Fetch or refresh the node configuration.
    Config,
    /// Deliver sampled inputs; receive output commands.
    Poll,
    /// Receive output commands without delivering inputs.
    Act,
    /// Fetch the tunable variable set.
    Vars,
}

impl RequestKind {
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Config => "/config",
            Self::Poll => "/poll",
            Self::Act => "/act",
            Self::Vars => "/vars",
        }
    }
}

/// Service response codes (`rc` reply field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Ok,
    /// Re-fetch configuration.
    Update,
    /// Reboot the node.
    Reboot,
    /// Log-level change arrives via vars; nothing to do here.
    Debug,
    /// Firmware upgrade is driven by a host-side upgrader.
    Upgrade,
    /// Assert a temporary alarm.
    Alarm,
    Test,
}

impl ResponseCode {
    pub fn from_reply(reply: &str) -> Self {
        match json::extract_int(reply, "rc") {
            Some(1) => Self::Update,
            Some(2) => Self::Reboot,
            Some(3) => Self::Debug,
            Some(4) => Self::Upgrade,
            Some(5) => Self::Alarm,
            Some(6) => Self::Test,
            _ => Self::Ok,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Handler capability trait
// ───────────────────────────────────────────────────────────────

/// The capability set every handler provides.
pub trait RequestHandler {
    /// Wire name, as persisted and as reported in the `md` parameter.
    fn name(&self) -> &'static str;

    /// One-time initialisation at boot.
    fn init(&mut self, ctx: &mut Context, plat: &mut impl Platform) -> Result<()>;

    /// Issue one request. `inputs` are delivered, `outputs` receive
    /// commanded values, `reconfig` is raised when the service wants a
    /// config refresh. Returns the raw reply body.
    fn request(
        &mut self,
        ctx: &mut Context,
        plat: &mut impl Platform,
        nvs: &impl NvsPort,
        kind: RequestKind,
        inputs: &mut [Pin],
        outputs: &mut [Pin],
        reconfig: &mut bool,
    ) -> Result<String>;

    /// Release the network (or other transport) until the next request.
    fn disconnect(&mut self, plat: &mut impl Platform) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Handler manager
// ───────────────────────────────────────────────────────────────

/// Which handler is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerKind {
    #[default]
    Online,
    Offline,
}

/// Owns both handlers and routes requests to the active one.
///
/// The offline handler has no network of its own: config and vars requests
/// are routed straight to the online handler rather than through a stored
/// back-pointer.
pub struct HandlerManager {
    online: OnlineHandler,
    offline: OfflineHandler,
    active: HandlerKind,
}

impl Default for HandlerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerManager {
    pub fn new() -> Self {
        Self {
            online: OnlineHandler::new(),
            offline: OfflineHandler::new(),
            active: HandlerKind::Online,
        }
    }

    /// Restore the persisted active handler (default Online).
    pub fn restore(&mut self, nvs: &impl NvsPort) {
        if let Some(name) = nvs.read_str(MODE_KEY) {
            if name.as_str() == self.offline.name() {
                self.active = HandlerKind::Offline;
            }
        }
        info!("handler: active is {}", self.active_name());
    }

    /// Activate the handler named `name` and persist the choice.
    pub fn set(&mut self, name: &str, nvs: &impl NvsPort) -> Result<()> {
        let kind = if name == self.online.name() {
            HandlerKind::Online
        } else if name == self.offline.name() {
            HandlerKind::Offline
        } else {
            return Err(Error::Config("unknown handler name"));
        };
        if kind != self.active {
            self.active = kind;
            info!("handler: switched to {}", self.active_name());
            nvs.write_str(MODE_KEY, name)?;
        }
        Ok(())
    }

    pub fn active(&self) -> HandlerKind {
        self.active
    }

    pub fn active_name(&self) -> &'static str {
        match self.active {
            HandlerKind::Online => self.online.name(),
            HandlerKind::Offline => self.offline.name(),
        }
    }

    /// Whether `kind` would travel over the network right now.
    pub fn routes_online(&self, kind: RequestKind) -> bool {
        match self.active {
            HandlerKind::Online => true,
            HandlerKind::Offline => {
                matches!(kind, RequestKind::Config | RequestKind::Vars)
            }
        }
    }

    pub fn init(&mut self, ctx: &mut Context, plat: &mut impl Platform) -> Result<()> {
        self.online.init(ctx, plat)?;
        self.offline.init(ctx, plat)
    }

    pub fn request(
        &mut self,
        ctx: &mut Context,
        plat: &mut impl Platform,
        nvs: &impl NvsPort,
        kind: RequestKind,
        inputs: &mut [Pin],
        outputs: &mut [Pin],
        reconfig: &mut bool,
    ) -> Result<String> {
        if self.routes_online(kind) {
            self.online
                .request(ctx, plat, nvs, kind, inputs, outputs, reconfig)
        } else {
            self.offline
                .request(ctx, plat, nvs, kind, inputs, outputs, reconfig)
        }
    }

    pub fn disconnect(&mut self, plat: &mut impl Platform) -> Result<()> {
        // The radio comes down in either mode: the heartbeat path powers
        // it up even while the offline handler is active.
        let radio = self.online.disconnect(plat);
        if self.active == HandlerKind::Offline {
            self.offline.disconnect(plat)?;
        }
        radio
    }
}

// ───────────────────────────────────────────────────────────────
// Vars reply parsing
// ───────────────────────────────────────────────────────────────

/// Side data carried by a vars reply beyond the variable values.
#[derive(Debug, Default, Clone)]
pub struct VarsMeta {
    /// Commanded handler name, when the service wants a mode change.
    pub mode: Option<heapless::String<16>>,
    /// Absolute epoch reference for offline records.
    pub ts: Option<u64>,
}

/// Parse a vars reply into a full variable array plus side data.
///
/// Variables arrive either as flat keys (`"AlarmVoltage":600`) or
/// namespaced by the device id (`"18.AlarmVoltage":600`). Absent variables
/// take their defaults, and the alarm voltages are clamped to the peak.
pub fn parse_vars(reply: &str) -> ([i32; NUM_VARS], VarsMeta) {
    let id = json::extract(reply, "id").unwrap_or("");

    let mut vars = [0i32; NUM_VARS];
    for var in Var::ALL {
        let mut scoped = heapless::String::<40>::new();
        let _ = core::fmt::Write::write_fmt(&mut scoped, format_args!("{id}.{}", var.name()));
        let value = json::extract_int(reply, var.name())
            .or_else(|| json::extract_int(reply, scoped.as_str()))
            .map(|v| v as i32)
            .unwrap_or_else(|| var.default_value());
        vars[var as usize] = value;
    }

    let peak = vars[Var::PeakVoltage as usize];
    for var in [Var::AlarmVoltage, Var::AlarmRecoveryVoltage] {
        if vars[var as usize] > peak {
            vars[var as usize] = peak;
        }
    }

    let mut meta = VarsMeta::default();
    if let Some(mode) = json::extract(reply, "mode") {
        let mut name = heapless::String::new();
        if name.push_str(mode).is_ok() {
            meta.mode = Some(name);
        }
    }
    meta.ts = json::extract_int(reply, "ts").and_then(|v| u64::try_from(v).ok());
    (vars, meta)
}
