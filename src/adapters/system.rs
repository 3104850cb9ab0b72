//! System adapter — monotonic time, delays, deep sleep, and reset.
//!
//! - **`target_os = "espidf"`** — wraps `esp_timer_get_time()` (microsecond
//!   precision, monotonic), FreeRTOS delays, and the ESP deep-sleep/reset
//!   calls.
//! - **`not(target_os = "espidf")`** — uses `std::time::Instant` and
//!   `std::thread::sleep` for host-side testing and simulation; sleep and
//!   reset requests are logged and counted instead of executed.

use crate::app::ports::SystemPort;

pub struct SystemAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    #[cfg(not(target_os = "espidf"))]
    restarts: u32,
}

impl Default for SystemAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(target_os = "espidf"))]
            restarts: 0,
        }
    }

    /// Simulation only: restarts requested so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn restarts(&self) -> u32 {
        self.restarts
    }
}

impl SystemPort for SystemAdapter {
    #[cfg(target_os = "espidf")]
    fn millis(&self) -> u32 {
        ((unsafe { esp_idf_svc::sys::esp_timer_get_time() }) / 1000) as u32
    }

    #[cfg(not(target_os = "espidf"))]
    fn millis(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }

    #[cfg(target_os = "espidf")]
    fn deep_sleep_ms(&mut self, ms: u64) {
        log::info!("deep sleep for {ms} ms");
        unsafe {
            esp_idf_svc::sys::esp_deep_sleep(ms * 1000);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn deep_sleep_ms(&mut self, ms: u64) {
        log::info!("system(sim): deep sleep {ms} ms skipped");
    }

    #[cfg(target_os = "espidf")]
    fn restart(&mut self) {
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&mut self) {
        self.restarts += 1;
        log::warn!("system(sim): restart requested ({} total)", self.restarts);
    }
}
