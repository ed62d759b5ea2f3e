use std::net::IpAddr;

/// Static description of the emulated device, fixed at startup
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    pub name: String,
    pub hostname: String,
    pub model: String,
    pub app: String,
    pub mac: String,
    pub firmware: String,
    pub wifi_ssid: String,
    pub address: Option<IpAddr>,
    pub port: u16,
}

impl DeviceIdentity {
    /// Gen2 style device id, e.g. `shellypro3em-aabbccddeeff`
    pub fn device_id(&self) -> String {
        format!(
            "shelly{}-{}",
            self.app.to_ascii_lowercase(),
            self.mac.to_ascii_lowercase()
        )
    }

    /// Address shown in status documents, empty when unknown
    pub fn ip_string(&self) -> String {
        self.address.map(|ip| ip.to_string()).unwrap_or_default()
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            name: "ShellyEM-EMU".to_string(),
            hostname: "shellyem-emu".to_string(),
            model: "SPEM-003CEBEU".to_string(),
            app: "Pro3EM".to_string(),
            mac: "AABBCCDDEEFF".to_string(),
            firmware: "1.0.0-emulator".to_string(),
            wifi_ssid: "EmulatedNetwork".to_string(),
            address: None,
            port: 8080,
        }
    }
}

/// Lowercases a display name into something usable as a `.local` label
pub fn hostname_from_name(name: &str) -> String {
    let mut hostname = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            hostname.push(c.to_ascii_lowercase());
        } else if !hostname.ends_with('-') {
            hostname.push('-');
        }
    }
    let trimmed = hostname.trim_matches('-');
    if trimmed.is_empty() {
        "shelly-emulator".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Uppercase hex without separators; anything else falls back to the default id
pub fn normalize_mac(raw: &str) -> String {
    let hex: String = raw
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect::<String>()
        .to_ascii_uppercase();
    if hex.len() == 12 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        hex
    } else {
        DeviceIdentity::default().mac
    }
}
