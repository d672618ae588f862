//! Sequencer table builder for stored-program trigger controllers.
//!
//! A sequencer-capable controller executes a small stored program of rows
//! against live encoder and digital-input signals: each row waits for its
//! trigger condition, then asserts its output lines for a number of clock
//! ticks. [`build_table`] encodes a bidirectional boustrophedon sweep as
//! exactly six such rows, which the hardware loops until disarmed:
//!
//! 1. wait for the motion controller's "sweep start" bit;
//! 2. wait until the axis passes the window start, then pulse the detector
//!    and shutter lines at the trigger cadence;
//! 3. wait until the axis passes the end of the row (plus leeway), outputs
//!    off;
//! 4. wait for the "direction changed" bit;
//! 5. mirror of row 2 for the return leg (inverted comparison);
//! 6. mirror of row 3, after which the table loops back to row 1.
//!
//! The cutoff thresholds (rows 3 and 6) sit half a step beyond the opposite
//! leg's active threshold. That leeway absorbs encoder jitter at the row
//! ends: too tight and the final trigger of a row can be missed, too loose
//! and a spurious extra trigger fires on the turnaround. Because the right
//! margin depends on encoder resolution it is a tunable
//! ([`crate::config::SequencerSettings::leeway_fraction`]), applied
//! symmetrically to both cutoffs.

use crate::config::SequencerSettings;
use crate::error::{AppResult, BeamlineError};
use crate::geometry::{ScanGeometry, SweepDirection};
use crate::hardware::io::{SignalId, SignalValue};
use crate::signals::{OutputLine, TriggerInput};
use crate::timing::TimingProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Number of rows in a bidirectional sweep table.
pub const TABLE_ROWS: usize = 6;

/// Output line that carries detector exposure pulses from the sequencer.
///
/// Fixed by the patch panel on sequencer-equipped installations; the
/// per-detector routing flexibility of the gate/pulse controller does not
/// apply here.
pub const SEQUENCER_DETECTOR_LINE: OutputLine = OutputLine::Ttl1;

/// Output line that holds the fast shutter open from the sequencer.
pub const SEQUENCER_SHUTTER_LINE: OutputLine = OutputLine::Ttl2;

/// Wait condition of one sequencer row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowTrigger {
    /// Proceed when the named physical input bit pulses
    PhysicalBit(TriggerInput),
    /// Proceed when the encoder position exceeds the threshold (counts)
    PositionAbove(i64),
    /// Proceed when the encoder position falls below the threshold (counts)
    PositionBelow(i64),
}

impl RowTrigger {
    /// Position threshold in encoder counts, if this row has one.
    pub fn threshold_counts(&self) -> Option<i64> {
        match self {
            RowTrigger::PhysicalBit(_) => None,
            RowTrigger::PositionAbove(c) | RowTrigger::PositionBelow(c) => Some(*c),
        }
    }
}

/// One row of the stored sequencer program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerRow {
    /// Condition the hardware waits on before activating this row
    pub trigger: RowTrigger,
    /// Clock ticks the asserted outputs are held per repeat
    pub hold_ticks: u64,
    /// Output lines driven high while the row is active
    pub asserted_outputs: BTreeSet<OutputLine>,
}

impl SequencerRow {
    fn wait(trigger: RowTrigger) -> Self {
        Self {
            trigger,
            hold_ticks: 0,
            asserted_outputs: BTreeSet::new(),
        }
    }

    fn active(trigger: RowTrigger, hold_ticks: u64) -> Self {
        let mut outputs = BTreeSet::new();
        outputs.insert(SEQUENCER_DETECTOR_LINE);
        outputs.insert(SEQUENCER_SHUTTER_LINE);
        Self {
            trigger,
            hold_ticks,
            asserted_outputs: outputs,
        }
    }
}

/// Ordered six-row program for one bidirectional sweep.
///
/// The hardware repeats the table indefinitely (repeat count 0) until the
/// controller is disarmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerTable {
    rows: Vec<SequencerRow>,
}

impl SequencerTable {
    /// The rows in execution order.
    pub fn rows(&self) -> &[SequencerRow] {
        &self.rows
    }

    /// Flatten the table into register writes for the controller.
    ///
    /// The register names follow the controller's own map; values are opaque
    /// to this crate.
    pub fn to_writes(&self) -> Vec<(SignalId, SignalValue)> {
        let mut writes = Vec::new();
        writes.push((
            SignalId::new("SEQ1:REPEATS"),
            // 0 = repeat until disarm
            SignalValue::Int(0),
        ));
        for (index, row) in self.rows.iter().enumerate() {
            let n = index + 1;
            let trigger_name = match row.trigger {
                RowTrigger::PhysicalBit(input) => format!("bit:{input}"),
                RowTrigger::PositionAbove(_) => "position_above".to_string(),
                RowTrigger::PositionBelow(_) => "position_below".to_string(),
            };
            writes.push((
                SignalId::new(format!("SEQ1:ROW{n}:TRIGGER")),
                SignalValue::Text(trigger_name),
            ));
            if let Some(counts) = row.trigger.threshold_counts() {
                writes.push((
                    SignalId::new(format!("SEQ1:ROW{n}:POSITION")),
                    SignalValue::Int(counts),
                ));
            }
            #[allow(clippy::cast_possible_wrap)]
            writes.push((
                SignalId::new(format!("SEQ1:ROW{n}:TIME")),
                SignalValue::Int(row.hold_ticks as i64),
            ));
            for line in [
                OutputLine::Ttl1,
                OutputLine::Ttl2,
                OutputLine::Ttl3,
                OutputLine::Ttl4,
            ] {
                writes.push((
                    SignalId::new(format!("SEQ1:ROW{n}:OUT:{line}")),
                    SignalValue::Int(i64::from(row.asserted_outputs.contains(&line))),
                ));
            }
        }
        writes
    }
}

/// Build the six-row bidirectional sweep table.
///
/// # Errors
///
/// Returns [`BeamlineError::InvalidGeometry`] when `num_steps < 2`: a
/// bidirectional table over a single position is meaningless, and emitting a
/// degenerate one would arm the hardware with thresholds that can never
/// fire in order.
pub fn build_table(
    geometry: &ScanGeometry,
    profile: &TimingProfile,
    settings: &SequencerSettings,
) -> AppResult<SequencerTable> {
    if geometry.num_steps() < 2 {
        return Err(BeamlineError::InvalidGeometry(format!(
            "bidirectional sweep table needs at least 2 steps, got {}",
            geometry.num_steps()
        )));
    }

    let sign = geometry.direction().signum();
    let start_mm = profile.gate_start_mm;
    let last_mm = start_mm + geometry.last_step_offset_mm();
    let leeway_mm = geometry.step_size_mm() * settings.leeway_fraction;

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let hold_ticks = (profile.gate_step_s * settings.tick_hz as f64).round() as u64;

    let outbound = |threshold_mm: f64| -> RowTrigger {
        let counts = geometry.to_counts(threshold_mm);
        match geometry.direction() {
            SweepDirection::Positive => RowTrigger::PositionAbove(counts),
            SweepDirection::Negative => RowTrigger::PositionBelow(counts),
        }
    };
    let inbound = |threshold_mm: f64| -> RowTrigger {
        let counts = geometry.to_counts(threshold_mm);
        match geometry.direction() {
            SweepDirection::Positive => RowTrigger::PositionBelow(counts),
            SweepDirection::Negative => RowTrigger::PositionAbove(counts),
        }
    };

    let rows = vec![
        SequencerRow::wait(RowTrigger::PhysicalBit(TriggerInput::SweepStart)),
        SequencerRow::active(outbound(start_mm), hold_ticks),
        SequencerRow::wait(outbound(last_mm + sign * leeway_mm)),
        SequencerRow::wait(RowTrigger::PhysicalBit(TriggerInput::DirectionChanged)),
        SequencerRow::active(inbound(last_mm), hold_ticks),
        SequencerRow::wait(inbound(start_mm - sign * leeway_mm)),
    ];

    Ok(SequencerTable { rows })
}
