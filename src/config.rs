use crate::identity::{hostname_from_name, normalize_mac, DeviceIdentity};
use std::env;
use std::net::IpAddr;
use std::time::Duration;

/// Everything the emulator reads from the environment at startup
#[derive(Debug, Clone, PartialEq)]
pub struct EmulatorConfig {
    pub upstream: UpstreamConfig,
    pub identity: DeviceIdentity,
    pub listen_port: u16,
    pub single_phase_emulation: bool,
    pub enable_gen1: bool,
    pub enable_gen2: bool,
    pub enable_mdns: bool,
    pub enable_coap: bool,
    pub announce_interval: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamConfig {
    pub host: String,
    pub endpoint: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub stale_after_failures: u32,
}

impl UpstreamConfig {
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            self.host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", self.host.trim_end_matches('/'))
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.50".to_string(),
            endpoint: "/api/v1/data".to_string(),
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(2),
            stale_after_failures: 3,
        }
    }
}

impl EmulatorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, absent or unparsable values use the defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let upstream_defaults = UpstreamConfig::default();
        let identity_defaults = DeviceIdentity::default();

        let upstream = UpstreamConfig {
            host: get("HOMEWIZARD_HOST").unwrap_or(upstream_defaults.host),
            endpoint: get("HOMEWIZARD_ENDPOINT")
                .map(|e| {
                    if e.starts_with('/') {
                        e
                    } else {
                        format!("/{e}")
                    }
                })
                .unwrap_or(upstream_defaults.endpoint),
            timeout: parse_secs(get("HOMEWIZARD_TIMEOUT")).unwrap_or(upstream_defaults.timeout),
            poll_interval: parse_secs(get("POLL_INTERVAL"))
                .unwrap_or(upstream_defaults.poll_interval),
            stale_after_failures: get("STALE_AFTER_FAILURES")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(upstream_defaults.stale_after_failures),
        };

        let listen_port = get("HTTP_PORT")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(identity_defaults.port);

        let name = get("DEVICE_NAME").unwrap_or(identity_defaults.name);
        let hostname = get("DEVICE_HOSTNAME")
            .map(|h| hostname_from_name(&h))
            .unwrap_or_else(|| hostname_from_name(&name));
        let identity = DeviceIdentity {
            hostname,
            name,
            model: get("DEVICE_MODEL").unwrap_or(identity_defaults.model),
            app: get("DEVICE_APP").unwrap_or(identity_defaults.app),
            mac: get("DEVICE_MAC")
                .map(|m| normalize_mac(&m))
                .unwrap_or(identity_defaults.mac),
            firmware: get("DEVICE_FIRMWARE").unwrap_or(identity_defaults.firmware),
            wifi_ssid: get("WIFI_SSID").unwrap_or(identity_defaults.wifi_ssid),
            address: get("ADVERTISE_IP").and_then(|ip| ip.trim().parse::<IpAddr>().ok()),
            port: listen_port,
        };

        Self {
            upstream,
            identity,
            listen_port,
            single_phase_emulation: parse_bool_or(get("SINGLE_PHASE_EMULATION"), true),
            enable_gen1: parse_bool_or(get("ENABLE_GEN1"), true),
            enable_gen2: parse_bool_or(get("ENABLE_GEN2"), true),
            enable_mdns: parse_bool_or(get("ENABLE_MDNS"), true),
            enable_coap: parse_bool_or(get("ENABLE_COAP"), true),
            announce_interval: parse_secs(get("ANNOUNCE_INTERVAL"))
                .unwrap_or(Duration::from_secs(30)),
        }
    }
}

/// Safely parses a boolean from an optional string, falling back to `default`
fn parse_bool_or(val: Option<String>, default: bool) -> bool {
    val.and_then(|v| v.trim().to_ascii_lowercase().parse().ok())
        .unwrap_or(default)
}

/// Parses fractional seconds, rejecting zero, negative and non-finite values
fn parse_secs(val: Option<String>) -> Option<Duration> {
    let secs: f64 = val?.trim().parse().ok()?;
    if secs.is_finite() && secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}
