//! Sweep orchestration.
//!
//! [`run_sweep`] drives one triggered collection end to end against the
//! trigger actor:
//!
//! 1. load the trigger program (grouped setup writes, awaited together);
//! 2. wait for the beam-refill admission gate;
//! 3. arm, and wait for hardware confirmation;
//! 4. wait for the externally driven motion to complete;
//! 5. disarm and restore the quiescent configuration - **always**, on every
//!    exit path, via [`CleanupRegistry`].
//!
//! The ordering constraints are load-bearing: setup writes complete before
//! arm is requested, the admission gate passes before arm (arming first and
//! losing the beam mid-sweep silently truncates the dataset), and arm is
//! confirmed before triggered motion starts. Cleanup is registered as soon
//! as the program is loaded, so even an admission failure leaves the
//! controller back in its default configuration.

use crate::admission::AdmissionGate;
use crate::cleanup::CleanupRegistry;
use crate::config::Settings;
use crate::error::{AppResult, BeamlineError};
use crate::gate::GateConfig;
use crate::messages::SweepCommand;
use crate::sequencer::SequencerTable;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

/// Trigger program for one sweep, for whichever controller the experiment
/// uses. The two are mutually exclusive per sweep.
#[derive(Debug, Clone)]
pub enum TriggerProgram {
    /// Stored-program table for a sequencer-capable controller
    Sequencer(SequencerTable),
    /// Gate/pulse configuration for a logic-gate controller
    Gate(GateConfig),
}

/// Everything [`run_sweep`] needs besides the hardware handles.
#[derive(Debug)]
pub struct SweepPlan {
    /// Program to load before arming
    pub program: TriggerProgram,
    /// Planned beam-on time of the whole sweep
    pub total_exposure_s: f64,
    /// Safety margin handed to the admission gate
    pub margin_s: f64,
    /// Bound on arm confirmation
    pub arm_timeout: Duration,
    /// Bound on disarm confirmation during cleanup
    pub disarm_timeout: Duration,
}

impl SweepPlan {
    /// Build a plan with timeouts and margin taken from configuration.
    pub fn with_settings(
        program: TriggerProgram,
        total_exposure_s: f64,
        settings: &Settings,
    ) -> Self {
        Self {
            program,
            total_exposure_s,
            margin_s: settings.admission.margin.as_secs_f64(),
            arm_timeout: settings.arming.arm_timeout,
            disarm_timeout: settings.arming.disarm_timeout,
        }
    }
}

/// Record of one completed sweep.
#[derive(Debug, Clone)]
pub struct SweepReport {
    /// Unique identifier for this collection
    pub run_id: String,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Wall-clock end (after cleanup)
    pub finished_at: DateTime<Utc>,
}

/// Send a command to the trigger actor and await its response.
async fn dispatch<T>(
    commands: &mpsc::Sender<SweepCommand>,
    command: SweepCommand,
    response: oneshot::Receiver<T>,
) -> AppResult<T> {
    commands
        .send(command)
        .await
        .map_err(|_| BeamlineError::Aborted("trigger actor unavailable".to_string()))?;
    response
        .await
        .map_err(|_| BeamlineError::Aborted("trigger actor dropped response".to_string()))
}

/// Run one triggered sweep.
///
/// `motion` is the externally driven part of the collection: the future
/// completes when the motion plan reports the sweep's moves are done (the
/// motion controller produces the physical triggers; this crate never
/// drives it directly). Dropping the returned future is the abort path -
/// the actor itself stays alive, and the caller must still issue cleanup,
/// which is why aborts are normally delivered by failing the motion future
/// instead.
///
/// # Errors
///
/// The first error from the body (admission, arm, motion) wins; cleanup
/// failures are surfaced only when the body itself succeeded. In every case
/// disarm and return-to-normal have been attempted before this returns.
pub async fn run_sweep<F>(
    commands: &mpsc::Sender<SweepCommand>,
    admission: &dyn AdmissionGate,
    plan: SweepPlan,
    motion: F,
) -> AppResult<SweepReport>
where
    F: Future<Output = AppResult<()>> + Send,
{
    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    info!(%run_id, "starting sweep");

    // Load the trigger program. The actor groups these writes and waits for
    // the barrier, so when this returns the program is fully resident.
    let (command, response) = match plan.program {
        TriggerProgram::Sequencer(table) => SweepCommand::apply_sequencer_table(table),
        TriggerProgram::Gate(config) => SweepCommand::apply_gate_config(config),
    };
    dispatch(commands, command, response).await??;

    // From here on the controller may hold non-default state: guarantee the
    // reset path before anything can fail. LIFO order runs disarm first,
    // then the routing reset.
    let mut cleanup = CleanupRegistry::new();
    {
        let commands = commands.clone();
        cleanup.register(
            "return_to_normal",
            Box::new(move || {
                Box::pin(async move {
                    let (command, response) = SweepCommand::return_to_normal();
                    dispatch(&commands, command, response).await?
                })
            }),
        );
    }
    {
        let commands = commands.clone();
        let timeout = plan.disarm_timeout;
        cleanup.register(
            "disarm",
            Box::new(move || {
                Box::pin(async move {
                    let (command, response) = SweepCommand::disarm(timeout);
                    dispatch(&commands, command, response).await?
                })
            }),
        );
    }

    let body = async {
        // Admission strictly before arm: an armed controller interrupted by
        // a refill mid-sweep truncates the dataset with no error.
        admission
            .await_safe_window(plan.total_exposure_s, plan.margin_s)
            .await?;

        let (command, response) = SweepCommand::arm(plan.arm_timeout);
        dispatch(commands, command, response).await??;

        motion.await
    };
    let body_result = body.await;

    // Cleanup runs on every path; failures are collected, not short-circuited.
    let failures = cleanup.run_all().await;

    match body_result {
        Ok(()) => {
            if let Some((action, error)) = failures.into_iter().next() {
                warn!(%run_id, action = %action, "sweep succeeded but cleanup failed");
                return Err(error);
            }
            let finished_at = Utc::now();
            info!(%run_id, "sweep complete");
            Ok(SweepReport {
                run_id,
                started_at,
                finished_at,
            })
        }
        Err(error) => {
            for (action, cleanup_error) in failures {
                warn!(%run_id, action = %action, %cleanup_error, "cleanup failure after sweep error");
            }
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::TriggerActor;
    use crate::arming::ArmSignals;
    use crate::config::{ArmingSettings, IoSettings};
    use crate::hardware::mock::{EventLog, MockController};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Admission gate that records its invocation in a shared event log.
    struct LoggedGate {
        events: EventLog,
        fail: bool,
    }

    #[async_trait]
    impl AdmissionGate for LoggedGate {
        async fn await_safe_window(&self, _total: f64, _margin: f64) -> AppResult<()> {
            self.events.lock().unwrap().push("admission".to_string());
            if self.fail {
                Err(BeamlineError::Aborted("beam down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn harness(
        events: EventLog,
    ) -> (Arc<MockController>, mpsc::Sender<SweepCommand>) {
        let mock = Arc::new(MockController::new().with_event_log(events));
        let (tx, _handle) = TriggerActor::spawn(
            mock.clone(),
            ArmSignals::default(),
            &ArmingSettings {
                poll_interval: Duration::from_millis(5),
                ..ArmingSettings::default()
            },
            &IoSettings::default(),
        );
        (mock, tx)
    }

    fn plan() -> SweepPlan {
        SweepPlan {
            program: TriggerProgram::Gate(GateConfig::quiescent()),
            total_exposure_s: 1.0,
            margin_s: 0.5,
            arm_timeout: Duration::from_secs(1),
            disarm_timeout: Duration::from_secs(1),
        }
    }

    fn index_of(events: &[String], needle: &str) -> usize {
        events
            .iter()
            .position(|e| e.contains(needle))
            .unwrap_or_else(|| panic!("event '{needle}' not found in {events:?}"))
    }

    #[tokio::test]
    async fn test_admission_passes_before_arm() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let (_mock, tx) = harness(events.clone());
        let gate = LoggedGate {
            events: events.clone(),
            fail: false,
        };

        run_sweep(&tx, &gate, plan(), async { Ok(()) })
            .await
            .unwrap();

        let log = events.lock().unwrap().clone();
        assert!(
            index_of(&log, "admission") < index_of(&log, "write:PC:ARM=1"),
            "arm issued before admission gate passed: {log:?}"
        );
    }

    #[tokio::test]
    async fn test_motion_failure_still_disarms_and_resets() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let (mock, tx) = harness(events.clone());
        let gate = LoggedGate {
            events,
            fail: false,
        };

        let result = run_sweep(&tx, &gate, plan(), async {
            Err(BeamlineError::Aborted("motion fault".to_string()))
        })
        .await;

        assert!(matches!(result, Err(BeamlineError::Aborted(_))));

        let log = mock.write_log();
        // Disarm write happened after the failure
        assert!(log
            .iter()
            .any(|(id, v)| id.as_str() == "PC:ARM" && *v == crate::hardware::SignalValue::Int(0)));
        // Quiescent routing restored
        assert_eq!(
            mock.register(&crate::hardware::SignalId::new("OUT:TTL1")),
            Some(crate::hardware::SignalValue::Text("disconnected".to_string()))
        );
    }

    #[tokio::test]
    async fn test_admission_failure_prevents_arm_but_resets() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let (mock, tx) = harness(events.clone());
        let gate = LoggedGate {
            events: events.clone(),
            fail: true,
        };

        let result = run_sweep(&tx, &gate, plan(), async { Ok(()) }).await;
        assert!(matches!(result, Err(BeamlineError::Aborted(_))));

        // Never armed
        assert!(!mock
            .write_log()
            .iter()
            .any(|(id, v)| id.as_str() == "PC:ARM"
                && *v == crate::hardware::SignalValue::Int(1)));
        // Still reset to defaults
        assert_eq!(
            mock.register(&crate::hardware::SignalId::new("OUT:TTL1")),
            Some(crate::hardware::SignalValue::Text("disconnected".to_string()))
        );
    }

    #[tokio::test]
    async fn test_successful_sweep_reports_run() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let (_mock, tx) = harness(events.clone());
        let gate = LoggedGate {
            events,
            fail: false,
        };

        let report = run_sweep(&tx, &gate, plan(), async { Ok(()) })
            .await
            .unwrap();
        assert!(!report.run_id.is_empty());
        assert!(report.finished_at >= report.started_at);
    }
}
