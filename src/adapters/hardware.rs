//! Hardware adapter — bundles the per-subsystem adapters into one value
//! satisfying the full [`Platform`](crate::app::ports::Platform) bound.
//!
//! This is the only composition point; each sub-adapter keeps its own
//! cfg-gated simulation backend, so the bundle works identically on the
//! node and on the host bench.

use crate::adapters::gpio::GpioAdapter;
use crate::adapters::http::HttpAdapter;
use crate::adapters::nvs::NvsAdapter;
use crate::adapters::sdcard::SdCardAdapter;
use crate::adapters::system::SystemAdapter;
use crate::adapters::wifi::WifiAdapter;
use crate::app::ports::{
    FileStorePort, GpioPort, HttpPort, HttpReply, SystemPort, WifiPort,
};
use crate::error::{NetworkError, OfflineError};

/// Concrete adapter bundle for the node (or the host simulation).
pub struct HardwareAdapter {
    pub system: SystemAdapter,
    pub gpio: GpioAdapter,
    pub wifi: WifiAdapter,
    pub http: HttpAdapter,
    pub sdcard: SdCardAdapter,
}

impl Default for HardwareAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareAdapter {
    pub fn new() -> Self {
        Self {
            system: SystemAdapter::new(),
            gpio: GpioAdapter::new(),
            wifi: WifiAdapter::new(),
            http: HttpAdapter::new(),
            sdcard: SdCardAdapter::new(),
        }
    }

    /// The NVS adapter is deliberately separate: persistence is passed to
    /// the service on its own so config writes can happen while the
    /// platform bundle is mutably borrowed.
    pub fn nvs() -> NvsAdapter {
        NvsAdapter::new()
    }
}

impl SystemPort for HardwareAdapter {
    fn millis(&self) -> u32 {
        self.system.millis()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.system.delay_ms(ms);
    }

    fn deep_sleep_ms(&mut self, ms: u64) {
        self.system.deep_sleep_ms(ms);
    }

    fn restart(&mut self) {
        self.system.restart();
    }
}

impl GpioPort for HardwareAdapter {
    fn analog_read(&mut self, pin: u8) -> i32 {
        self.gpio.analog_read(pin)
    }

    fn analog_write(&mut self, pin: u8, value: i32) {
        self.gpio.analog_write(pin, value);
    }

    fn digital_read(&mut self, pin: u8) -> i32 {
        self.gpio.digital_read(pin)
    }

    fn digital_write(&mut self, pin: u8, level: i32) {
        self.gpio.digital_write(pin, level);
    }
}

impl WifiPort for HardwareAdapter {
    fn power_on(&mut self) -> Result<(), NetworkError> {
        self.wifi.power_on()
    }

    fn power_off(&mut self) -> Result<(), NetworkError> {
        self.wifi.power_off()
    }

    fn join(&mut self, ssid: &str, key: &str) -> Result<(), NetworkError> {
        self.wifi.join(ssid, key)
    }

    fn is_joined(&self) -> bool {
        self.wifi.is_joined()
    }

    fn mac(&self) -> heapless::String<17> {
        self.wifi.mac()
    }

    fn local_ip(&self) -> heapless::String<15> {
        self.wifi.local_ip()
    }
}

impl HttpPort for HardwareAdapter {
    fn request(&mut self, host: &str, path: &str, body: &[u8]) -> Result<HttpReply, NetworkError> {
        self.http.request(host, path, body)
    }
}

impl FileStorePort for HardwareAdapter {
    fn exists(&self, path: &str) -> bool {
        self.sdcard.exists(path)
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), OfflineError> {
        self.sdcard.append(path, data)
    }
}
