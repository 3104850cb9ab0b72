//! Device identity derived from the ESP32 factory MAC address.
//!
//! The service keys every request on the node's MAC, formatted uppercase
//! with colon separators (`AA:BB:CC:DD:EE:FF`). The factory-burned eFuse
//! MAC is deterministic across reboots.

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Format a MAC as uppercase `AA:BB:CC:DD:EE:FF`.
pub fn format_mac(mac: &MacAddress) -> heapless::String<17> {
    let mut out = heapless::String::new();
    use core::fmt::Write;
    let _ = write!(
        out,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_format() {
        let mac = [0x00, 0x11, 0x22, 0xAA, 0xBB, 0xCC];
        assert_eq!(format_mac(&mac).as_str(), "00:11:22:AA:BB:CC");
    }

    #[test]
    fn sim_mac_deterministic() {
        assert_eq!(read_mac(), read_mac());
    }

    #[test]
    fn sim_mac_formats() {
        assert_eq!(format_mac(&read_mac()).as_str(), "DE:AD:BE:EF:CA:FE");
    }
}
