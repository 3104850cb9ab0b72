//! HTTP client adapter.
//!
//! Implements [`HttpPort`] over the ESP-IDF HTTP client. One synchronous
//! exchange per call with a fixed timeout; automatic redirect handling is
//! disabled because the online handler follows Location headers itself
//! (the service uses redirects to hand nodes between frontends).
//!
//! The host-side simulation has no network: every request fails with a
//! transport error, which exercises the retry and alarm paths on the
//! bench.

use crate::app::ports::{HttpPort, HttpReply};
use crate::error::NetworkError;

/// Fixed request timeout.
pub const HTTP_TIMEOUT_MS: u32 = 10_000;

pub struct HttpAdapter;

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl HttpPort for HttpAdapter {
    #[cfg(target_os = "espidf")]
    fn request(&mut self, host: &str, path: &str, body: &[u8]) -> Result<HttpReply, NetworkError> {
        use esp_idf_svc::sys::*;
        use std::ffi::CString;

        let url =
            CString::new(format!("http://{host}{path}")).map_err(|_| NetworkError::TransportFailed)?;

        unsafe {
            let mut config: esp_http_client_config_t = core::mem::zeroed();
            config.url = url.as_ptr();
            config.timeout_ms = HTTP_TIMEOUT_MS as i32;
            config.disable_auto_redirect = true;

            let client = esp_http_client_init(&config);
            if client.is_null() {
                return Err(NetworkError::TransportFailed);
            }

            let result = (|| {
                if !body.is_empty() {
                    esp_http_client_set_method(client, esp_http_client_method_t_HTTP_METHOD_POST);
                }
                let ret = esp_http_client_open(client, body.len() as i32);
                if ret != ESP_OK {
                    return Err(NetworkError::TransportFailed);
                }
                if !body.is_empty() {
                    let written =
                        esp_http_client_write(client, body.as_ptr() as *const _, body.len() as i32);
                    if written < body.len() as i32 {
                        return Err(NetworkError::TransportFailed);
                    }
                }
                if esp_http_client_fetch_headers(client) < 0 {
                    return Err(NetworkError::TransportFailed);
                }

                let status = esp_http_client_get_status_code(client) as u16;

                let mut location = None;
                let key = CString::new("Location").unwrap();
                let mut value: *mut core::ffi::c_char = core::ptr::null_mut();
                if esp_http_client_get_header(client, key.as_ptr(), &mut value) == ESP_OK
                    && !value.is_null()
                {
                    let text = core::ffi::CStr::from_ptr(value).to_string_lossy();
                    location = Some(text.into_owned());
                }

                let mut reply_body = Vec::new();
                let mut chunk = [0u8; 512];
                loop {
                    let n = esp_http_client_read(
                        client,
                        chunk.as_mut_ptr() as *mut _,
                        chunk.len() as i32,
                    );
                    if n < 0 {
                        return Err(NetworkError::TransportFailed);
                    }
                    if n == 0 {
                        break;
                    }
                    reply_body.extend_from_slice(&chunk[..n as usize]);
                }

                Ok(HttpReply {
                    status,
                    location,
                    body: String::from_utf8_lossy(&reply_body).into_owned(),
                })
            })();

            esp_http_client_cleanup(client);
            result
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn request(
        &mut self,
        host: &str,
        path: &str,
        _body: &[u8],
    ) -> Result<HttpReply, NetworkError> {
        log::info!("http(sim): no network for http://{host}{path}");
        Err(NetworkError::TransportFailed)
    }
}
