//! Online request handler — plaintext HTTP to the cloud service.
//!
//! Owns the radio lifecycle for the core: powered on for the request burst,
//! powered off before input sampling (the ADC shares the supply rail and
//! reads noisy with the radio up). The MAC is read once at init with a
//! brief radio enable and cached for the life of the process.

use core::fmt::Write as _;

use log::{info, warn};

use crate::app::context::Context;
use crate::app::ports::{HttpReply, NvsPort, Platform};
use crate::config::{BootReason, DEFAULT_WIFI, SERVICE_HOST, VERSION, Var};
use crate::error::{Error, NetworkError, Result};
use crate::handlers::{RequestHandler, RequestKind, ResponseCode};
use crate::json;
use crate::pins::{Pin, PinKind, X_BAT, X_BW_DOWN, X_BW_UP, X_REQUEST_MS};
use crate::timing::elapsed_ms;

/// Association attempts before a connect is declared failed. Each round
/// tries the configured network, then the factory-default fallback.
const CONNECT_ROUNDS: u32 = 2;

/// Redirect depth budget.
const MAX_REDIRECTS: u32 = 5;

pub struct OnlineHandler {
    mac: heapless::String<17>,
    connected: bool,
}

impl Default for OnlineHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl OnlineHandler {
    pub fn new() -> Self {
        Self {
            mac: heapless::String::new(),
            connected: false,
        }
    }

    /// Power the radio and associate, trying the configured credentials
    /// with the compiled-in default as fallback.
    fn connect(&mut self, ctx: &Context, plat: &mut impl Platform) -> Result<()> {
        if self.connected && plat.is_joined() {
            return Ok(());
        }
        plat.power_on().map_err(Error::Network)?;

        let configured = if ctx.config.wifi.is_empty() {
            DEFAULT_WIFI
        } else {
            ctx.config.wifi.as_str()
        };
        for round in 0..CONNECT_ROUNDS {
            for creds in [configured, DEFAULT_WIFI] {
                let (ssid, key) = creds.split_once(',').unwrap_or((creds, ""));
                if plat.join(ssid, key).is_ok() {
                    info!("online: joined '{ssid}' (round {round})");
                    self.connected = true;
                    return Ok(());
                }
            }
        }
        warn!("online: could not associate");
        Err(NetworkError::ConnectFailed.into())
    }

    /// Issue the HTTP exchange, following redirects up to the budget.
    fn exchange(
        &mut self,
        plat: &mut impl Platform,
        path: &str,
        body: &[u8],
    ) -> Result<HttpReply> {
        let mut reply = plat.request(SERVICE_HOST, path, body).map_err(Error::Network)?;
        let mut redirects = 0;
        while is_redirect(reply.status) {
            redirects += 1;
            if redirects > MAX_REDIRECTS {
                return Err(NetworkError::BadRedirect.into());
            }
            let location = reply.location.ok_or(Error::Network(NetworkError::BadRedirect))?;
            let (host, loc_path) = split_location(&location);
            info!("online: redirect {} -> {location}", reply.status);
            reply = plat
                .request(host.unwrap_or(SERVICE_HOST), loc_path, body)
                .map_err(Error::Network)?;
        }
        if reply.status != 200 {
            return Err(NetworkError::BadStatus(reply.status).into());
        }
        Ok(reply)
    }
}

impl RequestHandler for OnlineHandler {
    fn name(&self) -> &'static str {
        "Normal"
    }

    /// Briefly power the radio to learn the factory MAC, then shut it
    /// down again so the boot path leaves the rails quiet.
    fn init(&mut self, _ctx: &mut Context, plat: &mut impl Platform) -> Result<()> {
        if plat.power_on().is_ok() {
            self.mac = plat.mac();
            info!("online: MAC {}", self.mac);
        } else {
            warn!("online: radio unavailable at init, MAC unknown");
        }
        plat.power_off().map_err(|_| Error::WifiDisconnect)?;
        self.connected = false;
        Ok(())
    }

    fn request(
        &mut self,
        ctx: &mut Context,
        plat: &mut impl Platform,
        nvs: &impl NvsPort,
        kind: RequestKind,
        inputs: &mut [Pin],
        outputs: &mut [Pin],
        reconfig: &mut bool,
    ) -> Result<String> {
        self.connect(ctx, plat)?;

        let mut path = String::with_capacity(128);
        let _ = write!(
            path,
            "{}?vn={}&ma={}&dk={}&ut={}",
            kind.endpoint(),
            VERSION,
            self.mac,
            ctx.config.dkey,
            plat.millis() / 1000,
        );
        if kind == RequestKind::Config {
            let _ = write!(
                path,
                "&la={}&md={}&er={}",
                plat.local_ip(),
                ctx.mode,
                ctx.error.as_str(),
            );
        }

        let mut body = Vec::new();
        if kind == RequestKind::Poll {
            for pin in inputs.iter() {
                // X10 is the one pin the service expects even when
                // negative (its initial battery reading is -1).
                let always_sent =
                    pin.kind() == PinKind::Virtual && usize::from(pin.number()) == X_BAT;
                if pin.value < 0 && !always_sent {
                    continue;
                }
                let _ = write!(path, "&{}={}", pin.name, pin.value);
                if let Some(data) = &pin.data {
                    body.extend_from_slice(data);
                }
            }
        }

        let started = plat.millis();
        let reply = self.exchange(plat, &path, &body)?;
        note_bandwidth(ctx, plat, started, path.len() + body.len(), reply.body.len());

        if matches!(kind, RequestKind::Poll | RequestKind::Act) {
            for pin in outputs.iter_mut() {
                match json::extract_int(&reply.body, &pin.name) {
                    Some(value) => {
                        pin.value = value as i32;
                        ctx.write_pin(plat, pin);
                    }
                    None => pin.value = -1,
                }
            }
        }

        match ResponseCode::from_reply(&reply.body) {
            ResponseCode::Ok | ResponseCode::Debug | ResponseCode::Upgrade | ResponseCode::Test => {
            }
            ResponseCode::Update => {
                info!("online: service requests reconfiguration");
                *reconfig = true;
                ctx.configured = false;
            }
            ResponseCode::Reboot => {
                if ctx.configured {
                    ctx.restart(plat, nvs, BootReason::Normal, false);
                }
            }
            ResponseCode::Alarm => {
                if ctx.configured && ctx.config.var(Var::AlarmPeriod) > 0 {
                    ctx.alarms.write(
                        true,
                        false,
                        &ctx.config,
                        &ctx.power,
                        &mut ctx.vpins,
                        plat,
                    );
                    *reconfig = true;
                }
            }
        }

        if let Some(varsum) = json::extract_int(&reply.body, "vs") {
            ctx.varsum = varsum;
        }
        if let Some(error) = json::extract(&reply.body, "er") {
            warn!("online: service error '{error}'");
        }
        Ok(reply.body)
    }

    fn disconnect(&mut self, plat: &mut impl Platform) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        plat.power_off().map_err(|_| Error::WifiDisconnect)
    }
}

/// Update the bandwidth stat pins from one completed exchange.
fn note_bandwidth(
    ctx: &mut Context,
    plat: &impl Platform,
    started: u32,
    sent: usize,
    received: usize,
) {
    let took_ms = u64::from(elapsed_ms(plat.millis(), started).max(1));
    ctx.vpins.set(X_BW_UP, (sent as u64 * 1000 / took_ms) as i32);
    ctx.vpins
        .set(X_BW_DOWN, (received as u64 * 1000 / took_ms) as i32);
    ctx.vpins.set(X_REQUEST_MS, took_ms as i32);
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Split a Location header into optional host and path.
fn split_location(location: &str) -> (Option<&str>, &str) {
    if let Some(rest) = location.strip_prefix("http://") {
        match rest.find('/') {
            Some(at) => (Some(&rest[..at]), &rest[at..]),
            None => (Some(rest), "/"),
        }
    } else {
        (None, location)
    }
}
