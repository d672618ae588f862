//! Timing translation from scan geometry to trigger quantities.
//!
//! [`translate`] is a pure function: it touches no hardware and derives every
//! window/pulse timing quantity a trigger controller needs from the scan
//! geometry and detector timing. The output [`TimingProfile`] is consumed once
//! by either the sequencer table builder or the gate/pulse configurator.
//!
//! The one non-obvious quantity is the gate step: the period between
//! consecutive trigger pulses. It must never be shorter than the detector can
//! accept, so it is the exposure time plus the larger of the detector dead
//! time and a configured safety buffer covering controller-internal latency.
//! The sample velocity then follows from requiring one step of travel per
//! gate step of time.

use crate::config::TimingSettings;
use crate::error::{AppResult, BeamlineError};
use crate::geometry::ScanGeometry;
use serde::{Deserialize, Serialize};

/// Derived window/pulse timing for one sweep row.
///
/// Produced by [`translate`], consumed by the table builder or the gate
/// configurator. The two offsets are lead distances the motion plan must
/// subtract from the nominal start position so the axis is at constant
/// velocity, with the shutter fully open, when the first trigger fires;
/// they are reported here so every caller applies the same values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingProfile {
    /// Constant axis velocity during the active window
    pub sample_velocity_mm_s: f64,
    /// Position at which the first trigger window opens
    pub gate_start_mm: f64,
    /// Full width of the triggered region
    pub gate_width_mm: f64,
    /// Period between consecutive trigger pulses
    pub gate_step_s: f64,
    /// Number of trigger windows (one per exposure position)
    pub num_gates: u32,
    /// Nominal pulse width; the gate configurator specializes this per
    /// detector family
    pub pulse_width_s: f64,
    /// Pulses per window
    pub pulse_max: u32,
    /// Lead distance for the axis to reach constant velocity
    pub accel_offset_mm: f64,
    /// Lead distance for the fast shutter to open fully
    pub shutter_offset_mm: f64,
}

impl TimingProfile {
    /// Wall-clock duration of one full sweep row.
    pub fn row_duration_s(&self) -> f64 {
        self.gate_step_s * f64::from(self.num_gates) * f64::from(self.pulse_max)
    }
}

/// Translate scan geometry and detector timing into a [`TimingProfile`].
///
/// Pure and total over valid inputs; no hardware access.
///
/// # Errors
///
/// Returns [`BeamlineError::InvalidGeometry`] when `exposures_per_position`
/// is zero. Geometry-level validation (step count, exposure, step size) has
/// already happened in [`ScanGeometry::new`].
pub fn translate(
    geometry: &ScanGeometry,
    exposures_per_position: u32,
    settings: &TimingSettings,
) -> AppResult<TimingProfile> {
    if exposures_per_position == 0 {
        return Err(BeamlineError::InvalidGeometry(
            "exposures_per_position must be at least 1".to_string(),
        ));
    }

    let slack_s = geometry
        .detector_dead_time_s()
        .max(settings.trigger_safety_buffer_s);
    let gate_step_s = geometry.exposure_time_s() + slack_s;

    let sample_velocity_mm_s = geometry.step_size_mm() / gate_step_s;

    let num_gates = geometry.total_images(exposures_per_position) / exposures_per_position;

    Ok(TimingProfile {
        sample_velocity_mm_s,
        gate_start_mm: geometry.axis_start_mm(),
        gate_width_mm: geometry.sweep_width_mm(),
        gate_step_s,
        num_gates,
        pulse_width_s: geometry.exposure_time_s() / 2.0,
        pulse_max: exposures_per_position,
        accel_offset_mm: sample_velocity_mm_s * settings.accel_ramp_time_s,
        shutter_offset_mm: sample_velocity_mm_s * settings.shutter_opening_time_s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SweepDirection;

    fn geometry(exposure_s: f64, dead_time_s: f64) -> ScanGeometry {
        ScanGeometry::new(
            0.5,
            0.1,
            10,
            exposure_s,
            dead_time_s,
            SweepDirection::Positive,
            200_000,
        )
        .unwrap()
    }

    #[test]
    fn test_gate_step_never_under_schedules() {
        // Property: gate_step >= exposure + dead_time for any slack source
        for dead_time in [0.0, 1e-6, 1e-4, 0.002] {
            let g = geometry(0.01, dead_time);
            let profile = translate(&g, 1, &TimingSettings::default()).unwrap();
            assert!(
                profile.gate_step_s >= g.exposure_time_s() + g.detector_dead_time_s(),
                "under-scheduled at dead_time {dead_time}"
            );
        }
    }

    #[test]
    fn test_reference_scenario() {
        // step 0.1mm, 10 steps, 10ms exposure, 1us dead time, 200k counts/mm
        let g = geometry(0.01, 1e-6);
        let profile = translate(&g, 1, &TimingSettings::default()).unwrap();

        assert!((profile.gate_step_s - 0.010_001).abs() < 1e-9);
        assert_eq!(profile.num_gates, 10);
        assert_eq!(profile.pulse_max, 1);
        assert_eq!(
            profile.num_gates * profile.pulse_max,
            g.total_images(1),
            "num_gates inconsistent with total_images / exposures_per_position"
        );
        assert!((profile.sample_velocity_mm_s - 0.1 / 0.010_001).abs() < 1e-9);
    }

    #[test]
    fn test_dead_time_dominates_safety_buffer() {
        let g = geometry(0.01, 0.002);
        let profile = translate(&g, 1, &TimingSettings::default()).unwrap();
        assert!((profile.gate_step_s - 0.012).abs() < 1e-12);
    }

    #[test]
    fn test_offsets_scale_with_velocity() {
        let settings = TimingSettings {
            trigger_safety_buffer_s: 1e-6,
            accel_ramp_time_s: 0.2,
            shutter_opening_time_s: 0.05,
        };
        let g = geometry(0.01, 1e-6);
        let profile = translate(&g, 1, &settings).unwrap();
        assert!(
            (profile.accel_offset_mm - profile.sample_velocity_mm_s * 0.2).abs() < 1e-12
        );
        assert!(
            (profile.shutter_offset_mm - profile.sample_velocity_mm_s * 0.05).abs() < 1e-12
        );
    }

    #[test]
    fn test_multiple_exposures_per_position() {
        let g = geometry(0.01, 1e-6);
        let profile = translate(&g, 4, &TimingSettings::default()).unwrap();
        assert_eq!(profile.num_gates, 10);
        assert_eq!(profile.pulse_max, 4);
        assert_eq!(profile.num_gates * profile.pulse_max, g.total_images(4));
    }

    #[test]
    fn test_zero_exposures_rejected() {
        let g = geometry(0.01, 1e-6);
        let result = translate(&g, 0, &TimingSettings::default());
        assert!(matches!(result, Err(BeamlineError::InvalidGeometry(_))));
    }

    #[test]
    fn test_row_duration() {
        let g = geometry(0.01, 1e-6);
        let profile = translate(&g, 2, &TimingSettings::default()).unwrap();
        assert!((profile.row_duration_s() - 0.010_001 * 10.0 * 2.0).abs() < 1e-9);
    }
}
