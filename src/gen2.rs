//! Gen2 RPC documents. The EM component flattens the per-phase records into
//! `a_*`, `b_*` and `c_*` keys.

use crate::identity::DeviceIdentity;
use crate::meter_source::MeterSnapshot;
use crate::phases::{
    kwh_to_wh, phase_values, round_current, round_power, round_voltage, PhaseValues,
};
use serde_derive::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmStatus {
    pub id: u32,
    pub source: &'static str,
    pub a_current: f64,
    pub a_voltage: f64,
    pub a_act_power: f64,
    pub a_aprt_power: f64,
    pub a_pf: f64,
    pub a_freq: f64,
    pub b_current: f64,
    pub b_voltage: f64,
    pub b_act_power: f64,
    pub b_aprt_power: f64,
    pub b_pf: f64,
    pub b_freq: f64,
    pub c_current: f64,
    pub c_voltage: f64,
    pub c_act_power: f64,
    pub c_aprt_power: f64,
    pub c_pf: f64,
    pub c_freq: f64,
    pub n_current: f64,
    pub total_current: f64,
    pub total_act_power: f64,
    pub total_aprt_power: f64,
    pub user_calibrated_phase: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmDataStatus {
    pub id: u32,
    pub a_total_act_energy: f64,
    pub a_total_act_ret_energy: f64,
    pub b_total_act_energy: f64,
    pub b_total_act_ret_energy: f64,
    pub c_total_act_energy: f64,
    pub c_total_act_ret_energy: f64,
    pub total_act: f64,
    pub total_act_ret: f64,
}

/// Rounded record for one phase: (current, voltage, act_power, aprt_power, pf, freq)
fn rounded(phase: &PhaseValues) -> (f64, f64, f64, f64, f64, f64) {
    (
        round_current(phase.current_a),
        round_voltage(phase.voltage_v),
        round_power(phase.act_power_w),
        round_power(phase.aprt_power_w),
        phase.pf,
        phase.freq_hz,
    )
}

/// `EM.GetStatus`, also served for `Shelly.GetStatus`
pub fn em_status(snapshot: &MeterSnapshot, single_phase_emulation: bool) -> EmStatus {
    let phases = phase_values(snapshot.reading(), single_phase_emulation);
    let (a_current, a_voltage, a_act_power, a_aprt_power, a_pf, a_freq) = rounded(&phases[0]);
    let (b_current, b_voltage, b_act_power, b_aprt_power, b_pf, b_freq) = rounded(&phases[1]);
    let (c_current, c_voltage, c_act_power, c_aprt_power, c_pf, c_freq) = rounded(&phases[2]);

    let total_current: f64 = phases.iter().map(|p| p.current_a).sum();
    let total_act_power: f64 = phases.iter().map(|p| p.act_power_w).sum();
    let total_aprt_power: f64 = phases.iter().map(|p| p.aprt_power_w).sum();

    EmStatus {
        id: 0,
        source: snapshot.status().as_str(),
        a_current,
        a_voltage,
        a_act_power,
        a_aprt_power,
        a_pf,
        a_freq,
        b_current,
        b_voltage,
        b_act_power,
        b_aprt_power,
        b_pf,
        b_freq,
        c_current,
        c_voltage,
        c_act_power,
        c_aprt_power,
        c_pf,
        c_freq,
        n_current: 0.0,
        total_current: round_current(total_current),
        total_act_power: round_power(total_act_power),
        total_aprt_power: round_power(total_aprt_power),
        user_calibrated_phase: Vec::new(),
    }
}

/// `EMData.GetStatus`, energy counters in Wh
pub fn em_data_status(snapshot: &MeterSnapshot, single_phase_emulation: bool) -> EmDataStatus {
    let [a, b, c] = phase_values(snapshot.reading(), single_phase_emulation);
    let (total_import, total_export) = snapshot
        .reading()
        .map(|r| (r.total_import_kwh, r.total_export_kwh))
        .unwrap_or_default();

    EmDataStatus {
        id: 0,
        a_total_act_energy: kwh_to_wh(a.import_kwh),
        a_total_act_ret_energy: kwh_to_wh(a.export_kwh),
        b_total_act_energy: kwh_to_wh(b.import_kwh),
        b_total_act_ret_energy: kwh_to_wh(b.export_kwh),
        c_total_act_energy: kwh_to_wh(c.import_kwh),
        c_total_act_ret_energy: kwh_to_wh(c.export_kwh),
        total_act: kwh_to_wh(total_import),
        total_act_ret: kwh_to_wh(total_export),
    }
}

/// `Shelly.GetDeviceInfo`
pub fn device_info(identity: &DeviceIdentity) -> Value {
    json!({
        "name": identity.name,
        "id": identity.device_id(),
        "mac": identity.mac,
        "model": identity.model,
        "gen": 2,
        "fw_id": format!("{}/emulator", identity.firmware),
        "ver": identity.firmware,
        "app": identity.app,
        "auth_en": false,
        "auth_domain": null,
    })
}
