//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements    | Connects to                    |
//! |-------------|---------------|--------------------------------|
//! | `gpio`      | GpioPort      | ESP32 ADC, LEDC PWM, GPIO      |
//! | `http`      | HttpPort      | ESP-IDF HTTP client            |
//! | `nvs`       | NvsPort       | NVS / in-memory store          |
//! | `sdcard`    | FileStorePort | FAT filesystem on SD           |
//! | `system`    | SystemPort    | ESP32 timer, sleep, reset      |
//! | `wifi`      | WifiPort      | ESP-IDF WiFi STA               |
//!
//! Every adapter carries a host-side simulation backend so the full loop
//! runs in tests and on the bench without hardware.

pub mod device_id;
pub mod gpio;
pub mod hardware;
pub mod http;
pub mod nvs;
pub mod sdcard;
pub mod system;
pub mod wifi;
