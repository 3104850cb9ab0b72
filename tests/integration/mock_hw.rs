//! Mock platform for integration tests.
//!
//! Records every GPIO write, HTTP exchange, restart, and file append so
//! tests can assert on the full history without touching real hardware.
//! Time is simulated: `delay_ms` advances the clock instantly, so cycles
//! that pause for minutes run in microseconds.

use std::collections::{HashMap, VecDeque};

use netsender::app::ports::{
    FileStorePort, GpioPort, HttpPort, HttpReply, SystemPort, WifiPort,
};
use netsender::pins::{NAV_PIN, RELAY_PINS};
use netsender::{NetworkError, OfflineError};

pub struct MockPlatform {
    pub now: u32,
    // GPIO
    pub analog: HashMap<u8, i32>,
    pub levels: HashMap<u8, i32>,
    pub digital_in: HashMap<u8, i32>,
    pub pwm: HashMap<u8, i32>,
    /// Full digital write history as (pin, level).
    pub writes: Vec<(u8, i32)>,
    // WiFi
    powered: bool,
    joined: bool,
    pub join_fail: bool,
    pub power_off_fail: bool,
    // HTTP
    pub replies: VecDeque<Result<HttpReply, NetworkError>>,
    /// Every exchange as (host, path, body).
    pub requests: Vec<(String, String, Vec<u8>)>,
    pub http_fail: bool,
    // System
    pub restarts: u32,
    pub deep_sleeps: Vec<u64>,
    // File store
    pub files: HashMap<String, Vec<u8>>,
    pub fail_appends: bool,
}

#[allow(dead_code)]
impl MockPlatform {
    pub fn new() -> Self {
        Self {
            now: 0,
            analog: HashMap::new(),
            levels: HashMap::new(),
            digital_in: HashMap::new(),
            pwm: HashMap::new(),
            writes: Vec::new(),
            powered: false,
            joined: false,
            join_fail: false,
            power_off_fail: false,
            replies: VecDeque::new(),
            requests: Vec::new(),
            http_fail: false,
            restarts: 0,
            deep_sleeps: Vec::new(),
            files: HashMap::new(),
            fail_appends: false,
        }
    }

    /// Queue a 200 reply with the given body.
    pub fn push_reply(&mut self, body: &str) {
        self.replies.push_back(Ok(HttpReply {
            status: 200,
            location: None,
            body: body.to_string(),
        }));
    }

    /// Queue an arbitrary-status reply.
    pub fn push_status(&mut self, status: u16, location: Option<&str>) {
        self.replies.push_back(Ok(HttpReply {
            status,
            location: location.map(str::to_string),
            body: String::new(),
        }));
    }

    /// Rising edges seen on the nav/status pin.
    pub fn nav_flashes(&self) -> usize {
        let mut level = 0;
        let mut edges = 0;
        for &(pin, new_level) in &self.writes {
            if pin != NAV_PIN {
                continue;
            }
            if level == 0 && new_level == 1 {
                edges += 1;
            }
            level = new_level;
        }
        edges
    }

    /// Current relay levels, Power0..Power3.
    pub fn relays(&self) -> Vec<i32> {
        RELAY_PINS
            .iter()
            .map(|p| self.levels.get(p).copied().unwrap_or(0))
            .collect()
    }

    /// Paths of the requests issued so far.
    pub fn request_paths(&self) -> Vec<&str> {
        self.requests.iter().map(|(_, p, _)| p.as_str()).collect()
    }
}

impl SystemPort for MockPlatform {
    fn millis(&self) -> u32 {
        self.now
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now = self.now.wrapping_add(ms);
    }

    fn deep_sleep_ms(&mut self, ms: u64) {
        self.deep_sleeps.push(ms);
    }

    fn restart(&mut self) {
        self.restarts += 1;
    }
}

impl GpioPort for MockPlatform {
    fn analog_read(&mut self, pin: u8) -> i32 {
        self.analog.get(&pin).copied().unwrap_or(0)
    }

    fn analog_write(&mut self, pin: u8, value: i32) {
        self.pwm.insert(pin, value);
    }

    fn digital_read(&mut self, pin: u8) -> i32 {
        self.digital_in
            .get(&pin)
            .or_else(|| self.levels.get(&pin))
            .copied()
            .unwrap_or(0)
    }

    fn digital_write(&mut self, pin: u8, level: i32) {
        self.levels.insert(pin, level);
        self.writes.push((pin, level));
    }
}

impl WifiPort for MockPlatform {
    fn power_on(&mut self) -> Result<(), NetworkError> {
        self.powered = true;
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), NetworkError> {
        if self.power_off_fail {
            return Err(NetworkError::TransportFailed);
        }
        self.powered = false;
        self.joined = false;
        Ok(())
    }

    fn join(&mut self, _ssid: &str, _key: &str) -> Result<(), NetworkError> {
        if self.join_fail {
            return Err(NetworkError::ConnectFailed);
        }
        self.joined = true;
        Ok(())
    }

    fn is_joined(&self) -> bool {
        self.joined
    }

    fn mac(&self) -> heapless::String<17> {
        let mut mac = heapless::String::new();
        mac.push_str("AA:BB:CC:DD:EE:FF").unwrap();
        mac
    }

    fn local_ip(&self) -> heapless::String<15> {
        let mut ip = heapless::String::new();
        ip.push_str("10.0.0.7").unwrap();
        ip
    }
}

impl HttpPort for MockPlatform {
    fn request(&mut self, host: &str, path: &str, body: &[u8]) -> Result<HttpReply, NetworkError> {
        self.requests
            .push((host.to_string(), path.to_string(), body.to_vec()));
        if self.http_fail {
            return Err(NetworkError::TransportFailed);
        }
        self.replies.pop_front().unwrap_or_else(|| {
            Ok(HttpReply {
                status: 200,
                location: None,
                body: "{}".to_string(),
            })
        })
    }
}

impl FileStorePort for MockPlatform {
    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), OfflineError> {
        if self.fail_appends {
            return Err(OfflineError::OpenFailed);
        }
        self.files
            .entry(path.to_string())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }
}
