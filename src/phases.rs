use crate::reading::{apparent_power, PhaseSource, UpstreamReading};

/// Power factor reported for every populated phase, the inverse of the apparent power ratio
pub const POWER_FACTOR: f64 = 0.98;
pub const GRID_FREQUENCY_HZ: f64 = 50.0;

/// Per-phase quantities shared by the Gen1 and Gen2 documents, unrounded
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhaseValues {
    pub populated: bool,
    pub voltage_v: f64,
    pub current_a: f64,
    pub act_power_w: f64,
    pub aprt_power_w: f64,
    pub pf: f64,
    pub freq_hz: f64,
    pub import_kwh: f64,
    pub export_kwh: f64,
}

impl PhaseValues {
    fn populated(voltage_v: f64, current_a: f64, act_power_w: f64, import_kwh: f64, export_kwh: f64) -> Self {
        Self {
            populated: true,
            voltage_v,
            current_a,
            act_power_w,
            aprt_power_w: apparent_power(act_power_w),
            pf: POWER_FACTOR,
            freq_hz: GRID_FREQUENCY_HZ,
            import_kwh,
            export_kwh,
        }
    }
}

/// Spreads one reading over phases A, B and C.
///
/// Phases the gateway measured are always shown as measured, and the energy counters are split
/// over those phases. For a total-only reading `single_phase_emulation` puts everything on
/// phase A and leaves B/C zero; otherwise the equal split fills all three. No reading means
/// three zeroed phases.
pub fn phase_values(
    reading: Option<&UpstreamReading>,
    single_phase_emulation: bool,
) -> [PhaseValues; 3] {
    let Some(reading) = reading else {
        return [PhaseValues::default(); 3];
    };

    match (reading.phase_source, single_phase_emulation) {
        (PhaseSource::Measured, _) => per_phase(reading, reading.phase_reported),
        (PhaseSource::EqualSplit, true) => [
            PhaseValues::populated(
                reading.voltage_v,
                reading.current_a,
                reading.total_active_power_w,
                reading.total_import_kwh,
                reading.total_export_kwh,
            ),
            PhaseValues::default(),
            PhaseValues::default(),
        ],
        (PhaseSource::EqualSplit, false) => per_phase(reading, [true; 3]),
    }
}

/// Fills the selected phases from the reading's per-phase values
fn per_phase(reading: &UpstreamReading, selected: [bool; 3]) -> [PhaseValues; 3] {
    let shares = selected.iter().filter(|s| **s).count().max(1) as f64;
    let mut phases = [PhaseValues::default(); 3];
    for (i, phase) in phases.iter_mut().enumerate() {
        if selected[i] {
            *phase = PhaseValues::populated(
                reading.per_phase_voltage_v[i],
                reading.per_phase_current_a[i],
                reading.per_phase_power_w[i],
                reading.total_import_kwh / shares,
                reading.total_export_kwh / shares,
            );
        }
    }
    phases
}

fn round_to(value: f64, scale: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let rounded = (value * scale).round() / scale;
    // Avoid serializing "-0.0"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

pub fn round_power(value: f64) -> f64 {
    round_to(value, 100.0)
}

pub fn round_current(value: f64) -> f64 {
    round_to(value, 1000.0)
}

pub fn round_voltage(value: f64) -> f64 {
    round_to(value, 100.0)
}

pub fn round_energy(value: f64) -> f64 {
    round_to(value, 100.0)
}

/// kWh counters are exposed in Wh on the wire
pub fn kwh_to_wh(kwh: f64) -> f64 {
    round_energy(kwh * 1000.0)
}
