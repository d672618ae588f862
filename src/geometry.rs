//! Scan geometry for a continuously moving sample axis.
//!
//! A [`ScanGeometry`] is the validated, immutable description of one sweep
//! row: where it starts, how far apart the exposure positions sit, how many
//! there are, and how the axis position maps onto encoder counts. It is the
//! sole input (together with detector timing) to the trigger translation
//! pipeline, so validation happens once here and every downstream component
//! can assume the values are usable.

use crate::error::{AppResult, BeamlineError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of travel for the outbound sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepDirection {
    /// Axis position increases during the outbound sweep
    Positive,
    /// Axis position decreases during the outbound sweep
    Negative,
}

impl SweepDirection {
    /// Sign multiplier for distances along the sweep.
    pub fn signum(&self) -> f64 {
        match self {
            SweepDirection::Positive => 1.0,
            SweepDirection::Negative => -1.0,
        }
    }

    /// The opposite direction (the return leg of a boustrophedon sweep).
    pub fn reversed(&self) -> Self {
        match self {
            SweepDirection::Positive => SweepDirection::Negative,
            SweepDirection::Negative => SweepDirection::Positive,
        }
    }
}

impl fmt::Display for SweepDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepDirection::Positive => write!(f, "+"),
            SweepDirection::Negative => write!(f, "-"),
        }
    }
}

/// Validated description of one scan row.
///
/// Constructed via [`ScanGeometry::new`], which rejects parameter sets that
/// cannot produce a trigger program. Immutable afterwards: all access goes
/// through read-only getters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanGeometry {
    axis_start_mm: f64,
    step_size_mm: f64,
    num_steps: u32,
    exposure_time_s: f64,
    detector_dead_time_s: f64,
    direction: SweepDirection,
    encoder_counts_per_mm: i64,
}

impl ScanGeometry {
    /// Create a validated scan geometry.
    ///
    /// # Errors
    ///
    /// Returns [`BeamlineError::InvalidGeometry`] if:
    /// - `num_steps < 1`
    /// - `exposure_time_s <= 0` (or not finite)
    /// - `step_size_mm == 0` (zero-length sweep, velocity undefined)
    /// - `detector_dead_time_s < 0`
    /// - `encoder_counts_per_mm <= 0`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        axis_start_mm: f64,
        step_size_mm: f64,
        num_steps: u32,
        exposure_time_s: f64,
        detector_dead_time_s: f64,
        direction: SweepDirection,
        encoder_counts_per_mm: i64,
    ) -> AppResult<Self> {
        if num_steps < 1 {
            return Err(BeamlineError::InvalidGeometry(
                "num_steps must be at least 1".to_string(),
            ));
        }
        if !exposure_time_s.is_finite() || exposure_time_s <= 0.0 {
            return Err(BeamlineError::InvalidGeometry(format!(
                "exposure_time_s must be positive, got {exposure_time_s}"
            )));
        }
        if !step_size_mm.is_finite() || step_size_mm == 0.0 {
            return Err(BeamlineError::InvalidGeometry(
                "step_size_mm must be non-zero (zero-length sweep has undefined velocity)"
                    .to_string(),
            ));
        }
        if !detector_dead_time_s.is_finite() || detector_dead_time_s < 0.0 {
            return Err(BeamlineError::InvalidGeometry(format!(
                "detector_dead_time_s must be non-negative, got {detector_dead_time_s}"
            )));
        }
        if encoder_counts_per_mm <= 0 {
            return Err(BeamlineError::InvalidGeometry(format!(
                "encoder_counts_per_mm must be positive, got {encoder_counts_per_mm}"
            )));
        }

        Ok(Self {
            axis_start_mm,
            step_size_mm,
            num_steps,
            exposure_time_s,
            detector_dead_time_s,
            direction,
            encoder_counts_per_mm,
        })
    }

    /// Nominal start position of the sweep in millimetres.
    pub fn axis_start_mm(&self) -> f64 {
        self.axis_start_mm
    }

    /// Distance between adjacent exposure positions in millimetres.
    /// Always positive; travel direction lives in [`Self::direction`].
    pub fn step_size_mm(&self) -> f64 {
        self.step_size_mm.abs()
    }

    /// Number of exposure positions along the sweep.
    pub fn num_steps(&self) -> u32 {
        self.num_steps
    }

    /// Detector exposure time per image in seconds.
    pub fn exposure_time_s(&self) -> f64 {
        self.exposure_time_s
    }

    /// Minimum time the detector needs between consecutive exposures.
    pub fn detector_dead_time_s(&self) -> f64 {
        self.detector_dead_time_s
    }

    /// Direction of travel for the outbound sweep.
    pub fn direction(&self) -> SweepDirection {
        self.direction
    }

    /// Encoder resolution of the sweep axis.
    pub fn encoder_counts_per_mm(&self) -> i64 {
        self.encoder_counts_per_mm
    }

    /// Full width of the sweep in millimetres (`step * num_steps`).
    pub fn sweep_width_mm(&self) -> f64 {
        self.step_size_mm() * f64::from(self.num_steps)
    }

    /// Position of the last exposure along the sweep, relative to the start
    /// and signed by direction.
    pub fn last_step_offset_mm(&self) -> f64 {
        self.direction.signum() * self.step_size_mm() * f64::from(self.num_steps - 1)
    }

    /// Convert an absolute axis position in millimetres to encoder counts.
    pub fn to_counts(&self, position_mm: f64) -> i64 {
        #[allow(clippy::cast_possible_truncation)]
        let counts = (position_mm * self.encoder_counts_per_mm as f64).round() as i64;
        counts
    }

    /// Total number of detector images for the sweep.
    pub fn total_images(&self, exposures_per_position: u32) -> u32 {
        self.num_steps * exposures_per_position
    }
}
