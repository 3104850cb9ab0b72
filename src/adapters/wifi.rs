//! WiFi station-mode adapter.
//!
//! Implements [`WifiPort`] — radio power sequencing and AP association.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver calls via raw
//!   `esp_idf_svc::sys`.
//! - **all other targets**: simulation stubs for host-side tests, with a
//!   deterministic failure every tenth join to exercise the fallback and
//!   retry paths.
//!
//! The core powers the radio off between request bursts (the ADC reads
//! noisy with it up), so power transitions happen every cycle and must be
//! cheap to call repeatedly.

#[cfg(target_os = "espidf")]
use log::error;
use log::{info, warn};

use crate::adapters::device_id;
use crate::app::ports::WifiPort;
use crate::error::NetworkError;

/// Association poll budget: 100 polls of 100 ms (~10 s).
#[cfg(target_os = "espidf")]
const JOIN_POLLS: u32 = 100;

pub struct WifiAdapter {
    powered: bool,
    joined: bool,
    #[cfg(target_os = "espidf")]
    sta_netif: *mut esp_idf_svc::sys::esp_netif_t,
    /// Simulation: counts join attempts for deterministic failures.
    #[cfg(not(target_os = "espidf"))]
    sim_join_counter: u32,
}

impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiAdapter {
    pub fn new() -> Self {
        Self {
            powered: false,
            joined: false,
            #[cfg(target_os = "espidf")]
            sta_netif: core::ptr::null_mut(),
            #[cfg(not(target_os = "espidf"))]
            sim_join_counter: 0,
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_power_on(&mut self) -> Result<(), NetworkError> {
        use esp_idf_svc::sys::*;
        unsafe {
            let ret = esp_netif_init();
            if ret != ESP_OK {
                error!("wifi: esp_netif_init failed ({ret})");
                return Err(NetworkError::ConnectFailed);
            }
            let ret = esp_event_loop_create_default();
            if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
                error!("wifi: event loop create failed ({ret})");
                return Err(NetworkError::ConnectFailed);
            }
            if self.sta_netif.is_null() {
                self.sta_netif = esp_netif_create_default_wifi_sta();
            }

            let init_cfg = wifi_init_config_t {
                ..Default::default()
            };
            let ret = esp_wifi_init(&init_cfg);
            if ret != ESP_OK && ret != ESP_ERR_WIFI_NOT_INIT {
                error!("wifi: esp_wifi_init failed ({ret})");
                return Err(NetworkError::ConnectFailed);
            }
            let ret = esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_STA);
            if ret != ESP_OK {
                error!("wifi: esp_wifi_set_mode failed ({ret})");
                return Err(NetworkError::ConnectFailed);
            }
            let ret = esp_wifi_start();
            if ret != ESP_OK {
                error!("wifi: esp_wifi_start failed ({ret})");
                return Err(NetworkError::ConnectFailed);
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_power_on(&mut self) -> Result<(), NetworkError> {
        info!("wifi(sim): powered on");
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_power_off(&mut self) -> Result<(), NetworkError> {
        use esp_idf_svc::sys::*;
        unsafe {
            esp_wifi_disconnect();
            let ret = esp_wifi_stop();
            if ret != ESP_OK && ret != ESP_ERR_WIFI_NOT_INIT {
                error!("wifi: esp_wifi_stop failed ({ret})");
                return Err(NetworkError::TransportFailed);
            }
            let ret = esp_wifi_deinit();
            if ret != ESP_OK && ret != ESP_ERR_WIFI_NOT_INIT {
                error!("wifi: esp_wifi_deinit failed ({ret})");
                return Err(NetworkError::TransportFailed);
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_power_off(&mut self) -> Result<(), NetworkError> {
        info!("wifi(sim): powered off");
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_join(&mut self, ssid: &str, key: &str) -> Result<(), NetworkError> {
        use esp_idf_svc::sys::*;
        unsafe {
            let mut wifi_cfg: wifi_config_t = core::mem::zeroed();
            let sta = &mut wifi_cfg.__bindgen_anon_1.sta;

            let ssid_bytes = ssid.as_bytes();
            let key_bytes = key.as_bytes();
            let sl = ssid_bytes.len().min(sta.ssid.len());
            let kl = key_bytes.len().min(sta.password.len());
            sta.ssid[..sl].copy_from_slice(&ssid_bytes[..sl]);
            sta.password[..kl].copy_from_slice(&key_bytes[..kl]);
            sta.threshold.authmode = if key.is_empty() {
                wifi_auth_mode_t_WIFI_AUTH_OPEN
            } else {
                wifi_auth_mode_t_WIFI_AUTH_WPA2_PSK
            };

            let ret = esp_wifi_set_config(wifi_interface_t_WIFI_IF_STA, &mut wifi_cfg);
            if ret != ESP_OK {
                error!("wifi: esp_wifi_set_config failed ({ret})");
                return Err(NetworkError::ConnectFailed);
            }
            let ret = esp_wifi_connect();
            if ret != ESP_OK {
                error!("wifi: esp_wifi_connect failed ({ret})");
                return Err(NetworkError::ConnectFailed);
            }

            for _ in 0..JOIN_POLLS {
                esp_idf_hal::delay::FreeRtos::delay_ms(100);
                if self.platform_is_joined() {
                    return Ok(());
                }
            }
        }
        warn!("wifi: association with '{ssid}' timed out");
        Err(NetworkError::Timeout)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_join(&mut self, ssid: &str, _key: &str) -> Result<(), NetworkError> {
        self.sim_join_counter = self.sim_join_counter.wrapping_add(1);
        // Every 10th attempt fails, exercising the fallback credentials.
        if self.sim_join_counter % 10 == 3 {
            warn!(
                "wifi(sim): simulated join failure (attempt {})",
                self.sim_join_counter
            );
            return Err(NetworkError::ConnectFailed);
        }
        info!(
            "wifi(sim): joined '{ssid}' (attempt {})",
            self.sim_join_counter
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_joined(&self) -> bool {
        use esp_idf_svc::sys::*;
        unsafe {
            let mut ap_info: wifi_ap_record_t = core::mem::zeroed();
            esp_wifi_sta_get_ap_info(&mut ap_info) == ESP_OK
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_joined(&self) -> bool {
        self.joined
    }
}

impl WifiPort for WifiAdapter {
    fn power_on(&mut self) -> Result<(), NetworkError> {
        if self.powered {
            return Ok(());
        }
        self.platform_power_on()?;
        self.powered = true;
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), NetworkError> {
        if !self.powered {
            return Ok(());
        }
        self.platform_power_off()?;
        self.powered = false;
        self.joined = false;
        Ok(())
    }

    fn join(&mut self, ssid: &str, key: &str) -> Result<(), NetworkError> {
        if ssid.is_empty() {
            return Err(NetworkError::ConnectFailed);
        }
        self.platform_join(ssid, key)?;
        self.joined = true;
        info!("wifi: joined '{ssid}'");
        Ok(())
    }

    fn is_joined(&self) -> bool {
        self.platform_is_joined()
    }

    fn mac(&self) -> heapless::String<17> {
        device_id::format_mac(&device_id::read_mac())
    }

    #[cfg(target_os = "espidf")]
    fn local_ip(&self) -> heapless::String<15> {
        use core::fmt::Write;
        use esp_idf_svc::sys::*;
        let mut out = heapless::String::new();
        if self.sta_netif.is_null() {
            return out;
        }
        let mut info: esp_netif_ip_info_t = unsafe { core::mem::zeroed() };
        if unsafe { esp_netif_get_ip_info(self.sta_netif, &mut info) } == ESP_OK {
            let ip = info.ip.addr.to_le_bytes();
            let _ = write!(out, "{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3]);
        }
        out
    }

    #[cfg(not(target_os = "espidf"))]
    fn local_ip(&self) -> heapless::String<15> {
        let mut out = heapless::String::new();
        if self.joined {
            let _ = out.push_str("192.168.1.2");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_without_ssid_fails() {
        let mut wifi = WifiAdapter::new();
        wifi.power_on().unwrap();
        assert_eq!(wifi.join("", ""), Err(NetworkError::ConnectFailed));
    }

    #[test]
    fn power_and_join_round_trip() {
        let mut wifi = WifiAdapter::new();
        wifi.power_on().unwrap();
        wifi.join("Shed", "secret99").unwrap();
        assert!(wifi.is_joined());
        assert_eq!(wifi.local_ip().as_str(), "192.168.1.2");
        wifi.power_off().unwrap();
        assert!(!wifi.is_joined());
        assert!(wifi.local_ip().is_empty());
    }

    #[test]
    fn mac_is_formatted() {
        let wifi = WifiAdapter::new();
        let mac = wifi.mac();
        assert_eq!(mac.len(), 17);
        assert_eq!(mac.as_bytes()[2], b':');
    }

    #[test]
    fn repeated_power_on_is_idempotent() {
        let mut wifi = WifiAdapter::new();
        wifi.power_on().unwrap();
        wifi.power_on().unwrap();
        wifi.power_off().unwrap();
        wifi.power_off().unwrap();
    }
}
