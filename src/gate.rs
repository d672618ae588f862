//! Gate/pulse configuration for logic-gate trigger controllers.
//!
//! The simpler of the two supported controller families has no stored
//! program: it is configured with a gate (start/width/step/count), a pulse
//! train within each gate, and a routing matrix connecting logical signals
//! to physical TTL outputs. [`configure`] produces that configuration for
//! each experiment topology; [`GateConfig::quiescent`] is the documented
//! safe state written back after every collection.
//!
//! Which physical output drives the detector and which the shutter depends
//! on the detector family - the two families are cabled opposite ways. That
//! mapping lives in one lookup table ([`DetectorKind::trigger_profile`]); no
//! call site branches on the detector kind for routing.

use crate::error::{AppResult, BeamlineError};
use crate::geometry::{ScanGeometry, SweepDirection};
use crate::hardware::io::{SignalId, SignalValue};
use crate::signals::{EncoderSource, LogicalSignal, OutputLine};
use crate::timing::TimingProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Margin dropped from the end of a sawtooth pulse so its trailing edge
/// lands inside the trigger period.
pub const TRAILING_EDGE_MARGIN_S: f64 = 1e-4;

/// Source driving the gate or pulse generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceSelect {
    /// Free-running on the controller's internal clock
    Time,
    /// Derived from the selected encoder position
    Position,
    /// Driven by an external input
    External,
}

/// Detector families supported by the beamline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorKind {
    Eiger,
    Pilatus,
}

/// How a detector family is wired to the trigger controller.
///
/// The two families are cabled with detector and shutter swapped between
/// the first two TTL outputs, and differ in the pulse shape they need:
/// the Eiger re-triggers on a rising edge and needs the pulse to drop just
/// before the next period (sawtooth), while the Pilatus integrates for the
/// asserted duration and takes a half-period pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorTriggerProfile {
    /// Output line carrying detector exposure pulses
    pub detector_line: OutputLine,
    /// Output line holding the fast shutter open
    pub shutter_line: OutputLine,
    /// Whether pulses must drop just before the next period
    pub sawtooth_pulse: bool,
}

impl DetectorKind {
    /// Fixed routing/pulse-shape lookup for this detector family.
    pub fn trigger_profile(&self) -> DetectorTriggerProfile {
        match self {
            DetectorKind::Eiger => DetectorTriggerProfile {
                detector_line: OutputLine::Ttl1,
                shutter_line: OutputLine::Ttl2,
                sawtooth_pulse: true,
            },
            DetectorKind::Pilatus => DetectorTriggerProfile {
                detector_line: OutputLine::Ttl2,
                shutter_line: OutputLine::Ttl1,
                sawtooth_pulse: false,
            },
        }
    }
}

/// Experiment topology the gate program is built for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Topology {
    /// Single exposure window, no sample motion
    StaticShot,
    /// Move-settle-expose grid
    StepScan,
    /// Constant-velocity sweep across a grid row
    ContinuousSweep,
    /// One continuous angular window over a full rotation
    Rotation,
    /// Stimulus pulse followed by a delayed probe exposure at each position
    PumpProbe {
        /// Dwell of the stimulus pulse in seconds
        pump_duration_s: f64,
        /// Delay from stimulus to probe exposure in seconds
        pump_to_probe_delay_s: f64,
    },
}

/// Second, independently delayed pulse train (pump-probe only).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuxPulse {
    /// Delay from the primary pulse's rising edge
    pub delay_s: f64,
    /// Width of the delayed pulse
    pub width_s: f64,
}

/// Complete configuration for a gate/pulse trigger controller.
///
/// Units of `gate_start`/`gate_width`/`gate_step` follow `gate_source`
/// (seconds for `Time`, millimetres or degrees for `Position`), and likewise
/// for the pulse fields - the controller's registers are unit-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub gate_source: SourceSelect,
    pub pulse_source: SourceSelect,
    pub gate_start: f64,
    pub gate_width: f64,
    pub gate_step: f64,
    pub num_gates: u32,
    pub pulse_width: f64,
    pub pulse_step: f64,
    pub pulse_max: u32,
    /// Delayed second pulse train, pump-probe only
    pub aux_pulse: Option<AuxPulse>,
    /// Encoder selected as the position source
    pub encoder: EncoderSource,
    /// Direction of position comparison for the gate
    pub gate_direction: SweepDirection,
    /// Logical signal to physical output assignment
    pub output_routing: BTreeMap<LogicalSignal, OutputLine>,
}

impl GateConfig {
    /// The documented quiescent state: time-sourced single gate, pulses
    /// disconnected, every output unrouted, default encoder and direction.
    ///
    /// Idempotent by construction - it depends on nothing.
    pub fn quiescent() -> Self {
        Self {
            gate_source: SourceSelect::Time,
            pulse_source: SourceSelect::Time,
            gate_start: 0.0,
            gate_width: 0.0,
            gate_step: 0.0,
            num_gates: 1,
            pulse_width: 0.0,
            pulse_step: 0.0,
            pulse_max: 0,
            aux_pulse: None,
            encoder: EncoderSource::default_source(),
            gate_direction: SweepDirection::Positive,
            output_routing: BTreeMap::new(),
        }
    }

    /// The output line a logical signal is routed to, if any.
    pub fn routed_line(&self, signal: LogicalSignal) -> Option<OutputLine> {
        self.output_routing.get(&signal).copied()
    }

    /// Flatten the configuration into register writes for the controller.
    pub fn to_writes(&self) -> Vec<(SignalId, SignalValue)> {
        let source_name = |source: SourceSelect| match source {
            SourceSelect::Time => "time",
            SourceSelect::Position => "position",
            SourceSelect::External => "external",
        };

        let mut writes = vec![
            (
                SignalId::new("PC:GATE:SELECT"),
                SignalValue::Text(source_name(self.gate_source).to_string()),
            ),
            (
                SignalId::new("PC:PULSE:SELECT"),
                SignalValue::Text(source_name(self.pulse_source).to_string()),
            ),
            (SignalId::new("PC:GATE:START"), SignalValue::Float(self.gate_start)),
            (SignalId::new("PC:GATE:WIDTH"), SignalValue::Float(self.gate_width)),
            (SignalId::new("PC:GATE:STEP"), SignalValue::Float(self.gate_step)),
            (
                SignalId::new("PC:GATE:NGATES"),
                SignalValue::Int(i64::from(self.num_gates)),
            ),
            (SignalId::new("PC:PULSE:WIDTH"), SignalValue::Float(self.pulse_width)),
            (SignalId::new("PC:PULSE:STEP"), SignalValue::Float(self.pulse_step)),
            (
                SignalId::new("PC:PULSE:MAX"),
                SignalValue::Int(i64::from(self.pulse_max)),
            ),
            (
                SignalId::new("PC:ENC"),
                SignalValue::Text(self.encoder.to_string()),
            ),
            (
                SignalId::new("PC:DIR"),
                SignalValue::Text(self.gate_direction.to_string()),
            ),
        ];

        match self.aux_pulse {
            Some(aux) => {
                writes.push((SignalId::new("PULSE2:DELAY"), SignalValue::Float(aux.delay_s)));
                writes.push((SignalId::new("PULSE2:WIDTH"), SignalValue::Float(aux.width_s)));
            }
            None => {
                writes.push((SignalId::new("PULSE2:DELAY"), SignalValue::Float(0.0)));
                writes.push((SignalId::new("PULSE2:WIDTH"), SignalValue::Float(0.0)));
            }
        }

        // Every output line is written on every apply: routed lines get
        // their logical source, the rest are explicitly disconnected.
        for line in [
            OutputLine::Ttl1,
            OutputLine::Ttl2,
            OutputLine::Ttl3,
            OutputLine::Ttl4,
        ] {
            let source = self
                .output_routing
                .iter()
                .find(|(_, routed)| **routed == line)
                .map_or("disconnected".to_string(), |(signal, _)| signal.to_string());
            writes.push((
                SignalId::new(format!("OUT:{line}")),
                SignalValue::Text(source),
            ));
        }

        writes
    }
}

/// Build the gate/pulse configuration for one sweep.
///
/// # Errors
///
/// Returns [`BeamlineError::InvalidGeometry`] for pump-probe parameters that
/// cannot be programmed (non-positive stimulus dwell, negative delay).
pub fn configure(
    geometry: &ScanGeometry,
    profile: &TimingProfile,
    topology: &Topology,
    detector: DetectorKind,
) -> AppResult<GateConfig> {
    let trigger_profile = detector.trigger_profile();

    let mut routing = BTreeMap::new();
    routing.insert(LogicalSignal::DetectorPulse, trigger_profile.detector_line);
    routing.insert(LogicalSignal::Shutter, trigger_profile.shutter_line);

    // Exposures shorter than twice the margin fall back to the symmetric
    // shape rather than producing a vanishing pulse.
    let scan_pulse_width = if trigger_profile.sawtooth_pulse
        && geometry.exposure_time_s() > 2.0 * TRAILING_EDGE_MARGIN_S
    {
        geometry.exposure_time_s() - TRAILING_EDGE_MARGIN_S
    } else {
        geometry.exposure_time_s() / 2.0
    };

    let mut config = GateConfig {
        gate_direction: geometry.direction(),
        ..GateConfig::quiescent()
    };

    match topology {
        Topology::StaticShot => {
            routing.insert(LogicalSignal::FluorescenceDisable, OutputLine::Ttl3);
            config.gate_source = SourceSelect::Time;
            config.pulse_source = SourceSelect::Time;
            config.gate_start = 0.0;
            config.gate_width = profile.gate_step_s * f64::from(profile.pulse_max);
            config.gate_step = 0.0;
            config.num_gates = 1;
            config.pulse_width = profile.pulse_width_s;
            config.pulse_step = profile.gate_step_s;
            config.pulse_max = profile.pulse_max;
        }

        Topology::StepScan | Topology::ContinuousSweep => {
            routing.insert(LogicalSignal::FluorescenceDisable, OutputLine::Ttl3);
            let per_gate_width = if matches!(topology, Topology::StepScan) {
                // The axis settles inside each window; half a step keeps the
                // window clear of the neighbouring positions.
                geometry.step_size_mm() / 2.0
            } else {
                geometry.step_size_mm()
            };
            config.gate_source = SourceSelect::Position;
            config.pulse_source = SourceSelect::Time;
            config.gate_start = profile.gate_start_mm;
            config.gate_width = per_gate_width;
            config.gate_step = geometry.step_size_mm();
            config.num_gates = profile.num_gates;
            config.pulse_width = scan_pulse_width;
            config.pulse_step = profile.gate_step_s;
            config.pulse_max = profile.pulse_max;
        }

        Topology::Rotation => {
            routing.insert(LogicalSignal::FluorescenceDisable, OutputLine::Ttl3);
            config.gate_source = SourceSelect::Position;
            config.pulse_source = SourceSelect::Position;
            config.gate_start = profile.gate_start_mm;
            config.gate_width = profile.gate_width_mm + profile.shutter_offset_mm.abs();
            config.gate_step = 0.0;
            config.num_gates = 1;
            // Position-sourced pulses: one per angular step, dropping at the
            // half-step point.
            config.pulse_width = geometry.step_size_mm() / 2.0;
            config.pulse_step = geometry.step_size_mm();
            config.pulse_max = profile.num_gates * profile.pulse_max;
        }

        Topology::PumpProbe {
            pump_duration_s,
            pump_to_probe_delay_s,
        } => {
            if !pump_duration_s.is_finite() || *pump_duration_s <= 0.0 {
                return Err(BeamlineError::InvalidGeometry(format!(
                    "pump_duration_s must be positive, got {pump_duration_s}"
                )));
            }
            if !pump_to_probe_delay_s.is_finite() || *pump_to_probe_delay_s < 0.0 {
                return Err(BeamlineError::InvalidGeometry(format!(
                    "pump_to_probe_delay_s must be non-negative, got {pump_to_probe_delay_s}"
                )));
            }
            // Both pump outputs are ANDed with the shared position gate in
            // the controller's logic fabric.
            routing.insert(LogicalSignal::PumpPulse1, OutputLine::Ttl3);
            routing.insert(LogicalSignal::PumpPulse2, OutputLine::Ttl4);
            config.gate_source = SourceSelect::Position;
            config.pulse_source = SourceSelect::Time;
            config.gate_start = profile.gate_start_mm;
            config.gate_width = geometry.step_size_mm();
            config.gate_step = geometry.step_size_mm();
            config.num_gates = profile.num_gates;
            config.pulse_width = *pump_duration_s;
            config.pulse_step = profile.gate_step_s;
            config.pulse_max = profile.pulse_max;
            config.aux_pulse = Some(AuxPulse {
                delay_s: *pump_to_probe_delay_s,
                width_s: geometry.exposure_time_s(),
            });
        }
    }

    config.output_routing = routing;
    Ok(config)
}
