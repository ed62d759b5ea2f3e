use crate::error::FetchError;
use crate::reading::{derive_current, split_equally, PhaseSource, UpstreamReading, DEFAULT_VOLTAGE_V};
use serde_derive::Deserialize;
use std::time::Duration;

/// HTTP client for the HomeWizard P1 meter local API
pub struct HomeWizardClient {
    endpoint_url: String,
    client: reqwest::Client,
}

impl HomeWizardClient {
    pub fn new(base_url: &str, endpoint: &str, timeout: Duration) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint_url: format!("{}{}", base_url.trim_end_matches('/'), endpoint),
            client,
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    pub async fn read_data(&self) -> Result<HomeWizardData, FetchError> {
        let response = self.client.get(&self.endpoint_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamBadStatus(status.as_u16()));
        }
        // Body errors after a 2xx are transport problems, not schema problems
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::UpstreamUnreachable(e.to_string()))?;
        let data = serde_json::from_str(&body)?;
        Ok(data)
    }
}

/// Raw `/api/v1/data` document. Every field is optional, unknown fields are ignored.
#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HomeWizardData {
    pub wifi_ssid: Option<String>,
    pub wifi_strength: Option<f64>,
    pub active_tariff: Option<i64>,
    pub total_power_import_kwh: Option<f64>,
    pub total_power_export_kwh: Option<f64>,
    pub active_power_w: Option<f64>,
    pub active_power_l1_w: Option<f64>,
    pub active_power_l2_w: Option<f64>,
    pub active_power_l3_w: Option<f64>,
    pub active_voltage_v: Option<f64>,
    pub active_voltage_l1_v: Option<f64>,
    pub active_voltage_l2_v: Option<f64>,
    pub active_voltage_l3_v: Option<f64>,
    pub active_current_a: Option<f64>,
    pub active_current_l1_a: Option<f64>,
    pub active_current_l2_a: Option<f64>,
    pub active_current_l3_a: Option<f64>,
    pub total_gas_m3: Option<f64>,
    pub gas_timestamp: Option<i64>,
}

impl HomeWizardData {
    fn phase_powers(&self) -> Option<([f64; 3], [bool; 3])> {
        let powers = [
            self.active_power_l1_w,
            self.active_power_l2_w,
            self.active_power_l3_w,
        ];
        if powers.iter().all(Option::is_none) {
            return None;
        }
        Some((
            powers.map(Option::unwrap_or_default),
            powers.map(|p| p.is_some()),
        ))
    }

    /// Normalizes the raw document into a reading, filling gaps with the derivation rules
    pub fn into_reading(self) -> UpstreamReading {
        let measured_phases = self.phase_powers();
        let total_active_power_w = self
            .active_power_w
            .or_else(|| measured_phases.map(|(p, _)| p.iter().sum()))
            .unwrap_or_default();

        let (per_phase_power_w, phase_reported, phase_source) = match measured_phases {
            Some((phases, reported)) => (phases, reported, PhaseSource::Measured),
            None => (
                split_equally(total_active_power_w),
                [false; 3],
                PhaseSource::EqualSplit,
            ),
        };

        let voltage_v = self
            .active_voltage_v
            .or(self.active_voltage_l1_v)
            .unwrap_or(DEFAULT_VOLTAGE_V);
        let per_phase_voltage_v = [
            self.active_voltage_l1_v.unwrap_or(voltage_v),
            self.active_voltage_l2_v.unwrap_or(voltage_v),
            self.active_voltage_l3_v.unwrap_or(voltage_v),
        ];

        let current_a = self
            .active_current_a
            .unwrap_or_else(|| derive_current(total_active_power_w, voltage_v));
        let reported_currents = [
            self.active_current_l1_a,
            self.active_current_l2_a,
            self.active_current_l3_a,
        ];
        let mut per_phase_current_a = [0.0; 3];
        for phase in 0..3 {
            per_phase_current_a[phase] = reported_currents[phase].unwrap_or_else(|| {
                derive_current(per_phase_power_w[phase], per_phase_voltage_v[phase])
            });
        }

        UpstreamReading {
            total_active_power_w,
            total_import_kwh: self.total_power_import_kwh.unwrap_or_default(),
            total_export_kwh: self.total_power_export_kwh.unwrap_or_default(),
            per_phase_power_w,
            per_phase_voltage_v,
            per_phase_current_a,
            phase_source,
            phase_reported,
            voltage_v,
            current_a,
            gas_total_m3: self.total_gas_m3.unwrap_or_default(),
            gas_timestamp: self.gas_timestamp.unwrap_or_default(),
            active_tariff: self.active_tariff.unwrap_or_default(),
            wifi_ssid: self.wifi_ssid.unwrap_or_default(),
            wifi_signal_pct: self.wifi_strength.map(|s| s.round() as i64).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod test_homewizard_client {
    use super::*;

    const SINGLE_PHASE_BODY: &str = r#"
        {
            "wifi_ssid": "Attic",
            "wifi_strength": 72,
            "smr_version": 50,
            "meter_model": "ISKRA 2M550T-101",
            "active_tariff": 2,
            "total_power_import_kwh": 13779.338,
            "total_power_export_kwh": 0.5,
            "active_power_w": 1234.567,
            "active_voltage_v": 231.4,
            "total_gas_m3": 2569.646,
            "gas_timestamp": 210606140010
        }
    "#;

    fn client_for(server: &mockito::Server) -> HomeWizardClient {
        HomeWizardClient::new(&server.url(), "/api/v1/data", Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_read_data() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/data")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SINGLE_PHASE_BODY)
            .create_async()
            .await;

        let data = client_for(&server).read_data().await.unwrap();
        assert_eq!(data.active_power_w, Some(1234.567));
        assert_eq!(data.wifi_ssid.as_deref(), Some("Attic"));
        assert_eq!(data.gas_timestamp, Some(210606140010));
        assert_eq!(data.active_power_l1_w, None);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/data")
            .with_status(503)
            .create_async()
            .await;

        let err = client_for(&server).read_data().await.unwrap_err();
        assert_eq!(err, FetchError::UpstreamBadStatus(503));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/data")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let err = client_for(&server).read_data().await.unwrap_err();
        assert_eq!(err.kind(), "upstream_malformed");
    }

    #[tokio::test]
    async fn test_unreachable() {
        // Nothing listens on port 9 of localhost
        let client =
            HomeWizardClient::new("http://127.0.0.1:9", "/api/v1/data", Duration::from_secs(1))
                .unwrap();
        let err = client.read_data().await.unwrap_err();
        assert_eq!(err.kind(), "upstream_unreachable");
    }

    #[test]
    fn test_single_phase_reading() {
        let data: HomeWizardData = serde_json::from_str(SINGLE_PHASE_BODY).unwrap();
        let reading = data.into_reading();

        assert_eq!(reading.total_active_power_w, 1234.567);
        assert_eq!(reading.phase_source, PhaseSource::EqualSplit);
        let sum: f64 = reading.per_phase_power_w.iter().sum();
        assert!((sum - 1234.567).abs() < 1e-9);
        assert_eq!(reading.voltage_v, 231.4);
        assert_eq!(reading.current_a, 1234.567 / 231.4);
        assert_eq!(reading.active_tariff, 2);
        assert_eq!(reading.wifi_signal_pct, 72);
        assert_eq!(reading.rssi(), -47);
        assert_eq!(reading.gas_total_m3, 2569.646);
    }

    #[test]
    fn test_empty_document_defaults() {
        let data: HomeWizardData = serde_json::from_str("{}").unwrap();
        let reading = data.into_reading();
        assert_eq!(reading.total_active_power_w, 0.0);
        assert_eq!(reading.voltage_v, DEFAULT_VOLTAGE_V);
        assert_eq!(reading.current_a, 0.0);
        assert_eq!(reading.gas_timestamp, 0);
        assert_eq!(reading.active_tariff, 0);
    }

    #[test]
    fn test_reported_current_wins() {
        let data: HomeWizardData =
            serde_json::from_str(r#"{"active_power_w": 100.0, "active_current_a": 7.5}"#).unwrap();
        assert_eq!(data.into_reading().current_a, 7.5);
    }

    #[test]
    fn test_zero_voltage_gives_zero_current() {
        let data: HomeWizardData =
            serde_json::from_str(r#"{"active_power_w": 500.0, "active_voltage_v": 0.0}"#).unwrap();
        let reading = data.into_reading();
        assert_eq!(reading.current_a, 0.0);
        assert_eq!(reading.per_phase_current_a, [0.0; 3]);
    }

    #[test]
    fn test_three_phase_reading() {
        let data: HomeWizardData = serde_json::from_str(
            r#"{
                "active_power_l1_w": 100.0,
                "active_power_l2_w": 200.0,
                "active_power_l3_w": -50.0,
                "active_voltage_l1_v": 230.0,
                "active_voltage_l2_v": 232.0,
                "active_voltage_l3_v": 229.0,
                "active_current_l2_a": 0.9
            }"#,
        )
        .unwrap();
        let reading = data.into_reading();
        assert_eq!(reading.phase_source, PhaseSource::Measured);
        assert_eq!(reading.phase_reported, [true; 3]);
        assert_eq!(reading.per_phase_power_w, [100.0, 200.0, -50.0]);
        assert_eq!(reading.total_active_power_w, 250.0);
        assert_eq!(reading.voltage_v, 230.0);
        assert_eq!(reading.per_phase_voltage_v, [230.0, 232.0, 229.0]);
        assert_eq!(reading.per_phase_current_a[0], 100.0 / 230.0);
        assert_eq!(reading.per_phase_current_a[1], 0.9);
        assert_eq!(reading.per_phase_current_a[2], -50.0 / 229.0);
    }

    #[test]
    fn test_l1_only_meter() {
        let data: HomeWizardData =
            serde_json::from_str(r#"{"active_power_w": 640.0, "active_power_l1_w": 640.0}"#)
                .unwrap();
        let reading = data.into_reading();
        assert_eq!(reading.phase_source, PhaseSource::Measured);
        assert_eq!(reading.phase_reported, [true, false, false]);
        assert_eq!(reading.per_phase_power_w, [640.0, 0.0, 0.0]);
    }
}
