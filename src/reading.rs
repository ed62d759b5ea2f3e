/// Voltage assumed when the gateway does not report one
pub const DEFAULT_VOLTAGE_V: f64 = 230.0;

/// Apparent power is approximated from active power with a fixed power factor
pub const APPARENT_POWER_RATIO: f64 = 1.02;

/// Where the per-phase values of a reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseSource {
    /// Gateway reported L1/L2/L3 values itself
    Measured,
    /// Total divided by three
    #[default]
    EqualSplit,
}

/// One fully parsed poll of the upstream gateway.
///
/// A reading is built in one go and never patched afterwards, the snapshot
/// either holds a complete reading or the previous one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpstreamReading {
    pub total_active_power_w: f64,
    pub total_import_kwh: f64,
    pub total_export_kwh: f64,
    pub per_phase_power_w: [f64; 3],
    pub per_phase_voltage_v: [f64; 3],
    pub per_phase_current_a: [f64; 3],
    pub phase_source: PhaseSource,
    /// Phases the gateway sent a power value for, all false for an equal split
    pub phase_reported: [bool; 3],
    pub voltage_v: f64,
    pub current_a: f64,
    pub gas_total_m3: f64,
    pub gas_timestamp: i64,
    pub active_tariff: i64,
    pub wifi_ssid: String,
    pub wifi_signal_pct: i64,
}

impl UpstreamReading {
    pub fn rssi(&self) -> i64 {
        rssi_from_strength(self.wifi_signal_pct)
    }
}

/// Single-phase meters are presented as three identical phases.
/// Every phase gets the same value so the phases always add back up to the total.
pub fn split_equally(total: f64) -> [f64; 3] {
    let share = total / 3.0;
    [share, share, share]
}

/// `power / voltage`, or zero when there is no voltage to divide by
pub fn derive_current(power_w: f64, voltage_v: f64) -> f64 {
    if voltage_v == 0.0 || !voltage_v.is_finite() {
        return 0.0;
    }
    let current = power_w / voltage_v;
    if current.is_finite() {
        current
    } else {
        0.0
    }
}

pub fn apparent_power(active_power_w: f64) -> f64 {
    active_power_w * APPARENT_POWER_RATIO
}

/// Maps a 0-100 signal percentage onto a synthetic dBm value, -30 at best and -90 at worst
pub fn rssi_from_strength(pct: i64) -> i64 {
    let pct = pct.clamp(0, 100);
    let rssi = -30 - ((100 - pct) as f64 * 0.6).round() as i64;
    rssi.min(-30)
}
