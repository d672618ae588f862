//! Logical and physical trigger lines.
//!
//! Trigger programs are written against *logical* signals (what a line means
//! to the experiment) and *physical* lines (where the cable goes). The
//! mapping between the two is detector-dependent and owned by the gate
//! configurator; everything else in the crate speaks in these enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A physical TTL output line on the trigger controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OutputLine {
    Ttl1,
    Ttl2,
    Ttl3,
    Ttl4,
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputLine::Ttl1 => write!(f, "TTL1"),
            OutputLine::Ttl2 => write!(f, "TTL2"),
            OutputLine::Ttl3 => write!(f, "TTL3"),
            OutputLine::Ttl4 => write!(f, "TTL4"),
        }
    }
}

/// What a routed output line means to the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogicalSignal {
    /// Opens the fast shutter for the duration of the active window
    Shutter,
    /// Exposure trigger pulses to the detector
    DetectorPulse,
    /// Holds the fluorescence detector off while diffraction data is taken
    FluorescenceDisable,
    /// First pump-probe stimulus pulse
    PumpPulse1,
    /// Second (delayed) pump-probe pulse
    PumpPulse2,
}

impl fmt::Display for LogicalSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalSignal::Shutter => write!(f, "shutter"),
            LogicalSignal::DetectorPulse => write!(f, "detector_pulse"),
            LogicalSignal::FluorescenceDisable => write!(f, "fluorescence_disable"),
            LogicalSignal::PumpPulse1 => write!(f, "pump_pulse_1"),
            LogicalSignal::PumpPulse2 => write!(f, "pump_pulse_2"),
        }
    }
}

/// Physical input bits consumed by sequencer wait rows.
///
/// Both are asserted by the motion controller; this crate only waits on
/// them, it never drives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerInput {
    /// Pulsed at the start of each sweep row
    SweepStart,
    /// Pulsed when the axis reverses for the return leg
    DirectionChanged,
}

impl fmt::Display for TriggerInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerInput::SweepStart => write!(f, "sweep_start"),
            TriggerInput::DirectionChanged => write!(f, "direction_changed"),
        }
    }
}

/// Encoder input selected as the position source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncoderSource {
    Enc1,
    Enc2,
    Enc3,
    Enc4,
}

impl EncoderSource {
    /// The quiescent default written by `return_to_normal`.
    pub fn default_source() -> Self {
        EncoderSource::Enc1
    }
}

impl fmt::Display for EncoderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderSource::Enc1 => write!(f, "ENC1"),
            EncoderSource::Enc2 => write!(f, "ENC2"),
            EncoderSource::Enc3 => write!(f, "ENC3"),
            EncoderSource::Enc4 => write!(f, "ENC4"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_line_display() {
        assert_eq!(OutputLine::Ttl1.to_string(), "TTL1");
        assert_eq!(OutputLine::Ttl4.to_string(), "TTL4");
    }

    #[test]
    fn test_logical_signal_ordering_is_stable() {
        // Routing tables are BTreeMaps keyed on this enum; ordering is part
        // of the serialized register layout.
        let mut signals = vec![
            LogicalSignal::PumpPulse1,
            LogicalSignal::Shutter,
            LogicalSignal::DetectorPulse,
        ];
        signals.sort();
        assert_eq!(
            signals,
            vec![
                LogicalSignal::Shutter,
                LogicalSignal::DetectorPulse,
                LogicalSignal::PumpPulse1,
            ]
        );
    }
}
