//! Gen1 REST documents: `/status`, `/shelly`, `/settings` and `/emeter/{n}`.

use crate::identity::DeviceIdentity;
use crate::meter_source::MeterSnapshot;
use crate::phases::{
    kwh_to_wh, phase_values, round_current, round_power, round_voltage, PhaseValues,
};
use chrono::{DateTime, Local};
use serde_derive::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const NUM_METERS: usize = 3;

/// Time inputs for the status document, passed in so the mapping stays pure
#[derive(Debug, Clone, Copy)]
pub struct StatusClock {
    pub now: DateTime<Local>,
    pub uptime: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gen1Emeter {
    pub power: f64,
    pub pf: f64,
    pub current: f64,
    pub voltage: f64,
    pub is_valid: bool,
    pub total: f64,
    pub total_returned: f64,
}

impl From<&PhaseValues> for Gen1Emeter {
    fn from(phase: &PhaseValues) -> Self {
        Self {
            power: round_power(phase.act_power_w),
            pf: phase.pf,
            current: round_current(phase.current_a),
            voltage: round_voltage(phase.voltage_v),
            is_valid: phase.populated,
            total: kwh_to_wh(phase.import_kwh),
            total_returned: kwh_to_wh(phase.export_kwh),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WifiSta {
    pub connected: bool,
    pub ssid: String,
    pub ip: String,
    pub rssi: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloudStatus {
    pub enabled: bool,
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MqttStatus {
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionsStats {
    pub skipped: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateStatus {
    pub status: String,
    pub has_update: bool,
}

/// HomeWizard values with no Shelly equivalent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct P1Extras {
    pub source: &'static str,
    pub active_tariff: i64,
    pub total_gas_m3: f64,
    pub gas_timestamp: i64,
    pub fetched_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gen1Status {
    pub wifi_sta: WifiSta,
    pub cloud: CloudStatus,
    pub mqtt: MqttStatus,
    pub time: String,
    pub unixtime: i64,
    pub serial: u32,
    pub has_update: bool,
    pub mac: String,
    pub cfg_changed_cnt: u32,
    pub actions_stats: ActionsStats,
    pub relays: Vec<Value>,
    pub emeters: Vec<Gen1Emeter>,
    pub total_power: f64,
    pub fs_size: u64,
    pub fs_free: u64,
    pub uptime: u64,
    pub ram_total: u64,
    pub ram_free: u64,
    pub update: UpdateStatus,
    pub p1: P1Extras,
}

pub fn emeters(snapshot: &MeterSnapshot, single_phase_emulation: bool) -> Vec<Gen1Emeter> {
    phase_values(snapshot.reading(), single_phase_emulation)
        .iter()
        .map(Gen1Emeter::from)
        .collect()
}

/// Single phase record, `None` for an index outside 0..=2
pub fn emeter(
    snapshot: &MeterSnapshot,
    index: usize,
    single_phase_emulation: bool,
) -> Option<Gen1Emeter> {
    if index >= NUM_METERS {
        return None;
    }
    let phases = phase_values(snapshot.reading(), single_phase_emulation);
    Some(Gen1Emeter::from(&phases[index]))
}

pub fn status(
    snapshot: &MeterSnapshot,
    identity: &DeviceIdentity,
    clock: StatusClock,
    single_phase_emulation: bool,
) -> Gen1Status {
    let reading = snapshot.reading();
    let emeters = emeters(snapshot, single_phase_emulation);
    let total_power = reading
        .map(|r| round_power(r.total_active_power_w))
        .unwrap_or_default();

    // Describes the emulator's own link, which is up whenever it answers. Upstream health is in `p1.source`.
    let wifi_sta = WifiSta {
        connected: true,
        ssid: reading
            .map(|r| r.wifi_ssid.clone())
            .filter(|ssid| !ssid.is_empty())
            .unwrap_or_else(|| identity.wifi_ssid.clone()),
        ip: identity.ip_string(),
        rssi: reading.map(|r| r.rssi()).unwrap_or_default(),
    };

    let p1 = P1Extras {
        source: snapshot.status().as_str(),
        active_tariff: reading.map(|r| r.active_tariff).unwrap_or_default(),
        total_gas_m3: reading.map(|r| r.gas_total_m3).unwrap_or_default(),
        gas_timestamp: reading.map(|r| r.gas_timestamp).unwrap_or_default(),
        fetched_at: snapshot.fetched_at.map(|t| t.timestamp()).unwrap_or_default(),
    };

    Gen1Status {
        wifi_sta,
        cloud: CloudStatus {
            enabled: false,
            connected: false,
        },
        mqtt: MqttStatus { connected: false },
        time: clock.now.format("%H:%M").to_string(),
        unixtime: clock.now.timestamp(),
        serial: 1,
        has_update: false,
        mac: identity.mac.clone(),
        cfg_changed_cnt: 0,
        actions_stats: ActionsStats { skipped: 0 },
        relays: Vec::new(),
        emeters,
        total_power,
        fs_size: 233681,
        fs_free: 150621,
        uptime: clock.uptime.as_secs(),
        ram_total: 51032,
        ram_free: 38836,
        update: UpdateStatus {
            status: "idle".to_string(),
            has_update: false,
        },
        p1,
    }
}

/// `/shelly`, identity only
pub fn device_info(identity: &DeviceIdentity) -> Value {
    json!({
        "type": identity.model,
        "mac": identity.mac,
        "auth": false,
        "fw": identity.firmware,
        "discoverable": true,
        "longid": 1,
        "num_outputs": 0,
        "num_meters": NUM_METERS,
        "profile": "triphase",
    })
}

/// `/settings`, a static echo of the configuration
pub fn settings(identity: &DeviceIdentity) -> Value {
    json!({
        "device": {
            "type": identity.model,
            "mac": identity.mac,
            "hostname": identity.hostname,
            "num_outputs": 0,
            "num_meters": NUM_METERS,
        },
        "wifi_ap": { "enabled": false },
        "wifi_sta": {
            "enabled": true,
            "ssid": identity.wifi_ssid,
            "ipv4_method": "dhcp",
        },
        "mqtt": { "enable": false },
        "sntp": { "server": "time.google.com" },
        "login": { "enabled": false },
        "pin_code": "",
        "name": identity.name,
        "fw": identity.firmware,
        "discoverable": true,
        "build_info": {
            "build_id": "emulator",
            "build_timestamp": "2025-01-01T00:00:00Z",
        },
        "cloud": { "enabled": false },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homewizard::HomeWizardData;
    use crate::reading::{split_equally, UpstreamReading};
    use chrono::TimeZone;

    fn clock() -> StatusClock {
        StatusClock {
            now: Local.timestamp_opt(1_700_000_000, 0).unwrap(),
            uptime: Duration::from_secs(42),
        }
    }

    fn live_snapshot() -> MeterSnapshot {
        MeterSnapshot {
            latest: Some(UpstreamReading {
                total_active_power_w: 1234.567,
                total_import_kwh: 13779.338,
                total_export_kwh: 0.5,
                per_phase_power_w: split_equally(1234.567),
                per_phase_voltage_v: [231.4; 3],
                per_phase_current_a: [1234.567 / 3.0 / 231.4; 3],
                voltage_v: 231.4,
                current_a: 1234.567 / 231.4,
                active_tariff: 2,
                gas_total_m3: 2569.646,
                wifi_ssid: "Attic".to_string(),
                wifi_signal_pct: 100,
                ..UpstreamReading::default()
            }),
            fetched_at: chrono::Utc.timestamp_opt(1_700_000_000, 0).single(),
            is_stale: false,
            consecutive_failures: 0,
        }
    }

    /// Collects every number found anywhere in a JSON tree
    fn numbers(value: &Value, out: &mut Vec<f64>) {
        match value {
            Value::Number(n) => out.push(n.as_f64().unwrap()),
            Value::Array(items) => items.iter().for_each(|v| numbers(v, out)),
            Value::Object(map) => map.values().for_each(|v| numbers(v, out)),
            _ => {}
        }
    }

    #[test]
    fn test_status_from_reading() {
        let identity = DeviceIdentity::default();
        let status = status(&live_snapshot(), &identity, clock(), true);

        assert_eq!(status.emeters.len(), 3);
        let a = &status.emeters[0];
        assert_eq!(a.power, 1234.57);
        assert_eq!(a.voltage, 231.4);
        assert_eq!(a.current, 5.335);
        assert!(a.is_valid);
        assert_eq!(a.total, 13779338.0);
        assert_eq!(a.total_returned, 500.0);
        assert_eq!(status.emeters[1].power, 0.0);
        assert!(!status.emeters[2].is_valid);

        assert_eq!(status.total_power, 1234.57);
        assert_eq!(status.wifi_sta.ssid, "Attic");
        assert_eq!(status.wifi_sta.rssi, -30);
        assert_eq!(status.uptime, 42);
        assert_eq!(status.unixtime, 1_700_000_000);
        assert_eq!(status.p1.source, "live");
        assert_eq!(status.p1.active_tariff, 2);
        assert!(!status.cloud.enabled);
        assert!(!status.mqtt.connected);
    }

    #[test]
    fn test_status_before_first_reading() {
        let identity = DeviceIdentity::default();
        let status = status(&MeterSnapshot::initial(), &identity, clock(), true);

        assert_eq!(status.p1.source, "init");
        assert!(status.wifi_sta.connected);
        assert_eq!(status.wifi_sta.rssi, 0);
        assert_eq!(status.wifi_sta.ssid, "EmulatedNetwork");
        assert_eq!(status.total_power, 0.0);

        let mut found = Vec::new();
        numbers(&serde_json::to_value(&status.emeters).unwrap(), &mut found);
        numbers(&serde_json::to_value(&status.p1).unwrap(), &mut found);
        assert!(!found.is_empty());
        assert!(found.iter().all(|n| *n == 0.0), "{found:?}");
    }

    #[test]
    fn test_emeter_by_index() {
        let snapshot = live_snapshot();
        assert_eq!(emeter(&snapshot, 0, true).unwrap().power, 1234.57);
        assert_eq!(emeter(&snapshot, 2, true).unwrap().power, 0.0);
        assert_eq!(emeter(&snapshot, 3, true), None);

        let split = emeter(&snapshot, 1, false).unwrap();
        assert_eq!(split.power, 411.52);
        assert!(split.is_valid);
    }

    #[test]
    fn test_emeter_before_first_reading_is_zero() {
        for index in 0..NUM_METERS {
            let doc =
                serde_json::to_value(emeter(&MeterSnapshot::initial(), index, false)).unwrap();
            let mut found = Vec::new();
            numbers(&doc, &mut found);
            assert!(found.iter().all(|n| *n == 0.0));
            assert_eq!(doc["is_valid"], false);
        }
    }

    #[test]
    fn test_static_documents_are_stable() {
        let identity = DeviceIdentity::default();
        let first = serde_json::to_string(&device_info(&identity)).unwrap();
        let second = serde_json::to_string(&device_info(&identity)).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&settings(&identity)).unwrap(),
            serde_json::to_string(&settings(&identity)).unwrap()
        );

        let info = device_info(&identity);
        assert_eq!(info["type"], "SPEM-003CEBEU");
        assert_eq!(info["num_meters"], 3);
        let settings = settings(&identity);
        assert_eq!(settings["device"]["hostname"], "shellyem-emu");
        assert_eq!(settings["name"], "ShellyEM-EMU");
    }

    #[test]
    fn test_three_phase_meter_with_single_phase_emulation() {
        let data: HomeWizardData = serde_json::from_str(
            r#"{"active_power_l1_w": 100.0, "active_power_l2_w": 200.0, "active_power_l3_w": 50.0}"#,
        )
        .unwrap();
        let snapshot = MeterSnapshot {
            latest: Some(data.into_reading()),
            ..live_snapshot()
        };

        let status = status(&snapshot, &DeviceIdentity::default(), clock(), true);
        let powers: Vec<f64> = status.emeters.iter().map(|e| e.power).collect();
        assert_eq!(powers, vec![100.0, 200.0, 50.0]);
        assert!(status.emeters.iter().all(|e| e.is_valid));
        assert_eq!(status.total_power, 350.0);
        assert_eq!(emeter(&snapshot, 2, true).unwrap().power, 50.0);
    }
}
