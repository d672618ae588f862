//! Arm/disarm state machine for trigger controllers.
//!
//! Arming is the one place where software state and hardware state can
//! silently diverge: the controller only *reports* armed some time after the
//! request, and a trigger program that starts before confirmation - or a
//! second arm request fired at unconfirmed hardware - can double-trigger and
//! corrupt a dataset. [`ArmControl`] therefore treats every transition as
//! request-then-confirm: it writes the request, polls the hardware read-back
//! at a fixed interval, and fails hard if confirmation does not arrive
//! within the bounded timeout. A timed-out transition leaves the state
//! `ArmPending`/`DisarmPending`, which is unsafe to proceed from and is
//! never retried here.

use crate::config::ArmingSettings;
use crate::error::{AppResult, BeamlineError};
use crate::hardware::io::{SignalId, SignalIo, SignalValue};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Lifecycle state of the trigger controller's arm flag.
///
/// ```text
/// Disarmed ──arm()──> ArmPending ──readback──> Armed
///     ▲                                          │
///     └──readback── DisarmPending <──disarm()────┘
/// ```
///
/// Timed-out transitions stay in their pending state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    /// Controller confirmed disarmed
    Disarmed,
    /// Arm requested, confirmation outstanding
    ArmPending,
    /// Controller confirmed armed
    Armed,
    /// Disarm requested, confirmation outstanding
    DisarmPending,
}

impl fmt::Display for ArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArmState::Disarmed => write!(f, "Disarmed"),
            ArmState::ArmPending => write!(f, "ArmPending"),
            ArmState::Armed => write!(f, "Armed"),
            ArmState::DisarmPending => write!(f, "DisarmPending"),
        }
    }
}

impl ArmState {
    /// Whether a new arm request may be issued from this state.
    ///
    /// Arming from an unconfirmed state risks double-triggering, so only
    /// the confirmed states qualify. Disarm has no such restriction: it is
    /// the safe direction and is accepted from any state.
    pub fn can_arm(&self) -> bool {
        matches!(self, ArmState::Disarmed | ArmState::Armed)
    }
}

/// Register pair driving the arm state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmSignals {
    /// Write 1 to request arm, 0 to request disarm
    pub request: SignalId,
    /// Hardware-reported armed flag
    pub readback: SignalId,
}

impl Default for ArmSignals {
    fn default() -> Self {
        Self {
            request: SignalId::new("PC:ARM"),
            readback: SignalId::new("PC:ARM:STATUS"),
        }
    }
}

/// Sole owner of a controller's arm state.
///
/// Exactly one `ArmControl` exists per controller, held by the trigger
/// actor; serializing all arm/disarm requests through it is what guarantees
/// no two sweeps interleave their transitions.
pub struct ArmControl {
    io: Arc<dyn SignalIo>,
    signals: ArmSignals,
    poll_interval: Duration,
    state: ArmState,
}

impl ArmControl {
    /// Create a controller handle in the `Disarmed` state.
    pub fn new(io: Arc<dyn SignalIo>, signals: ArmSignals, settings: &ArmingSettings) -> Self {
        Self {
            io,
            signals,
            poll_interval: settings.poll_interval,
            state: ArmState::Disarmed,
        }
    }

    /// Current software-tracked state.
    pub fn state(&self) -> ArmState {
        self.state
    }

    /// Request arm and wait for the hardware to confirm.
    ///
    /// No-op (and no hardware write) when already `Armed`.
    ///
    /// # Errors
    ///
    /// - [`BeamlineError::ArmTimeout`] when the read-back does not report
    ///   armed within `timeout`; the state remains `ArmPending`.
    /// - [`BeamlineError::HardwareIo`] from the I/O layer.
    pub async fn arm(&mut self, timeout: Duration) -> AppResult<()> {
        if self.state == ArmState::Armed {
            debug!("arm requested while already armed, no-op");
            return Ok(());
        }
        if !self.state.can_arm() {
            return Err(BeamlineError::Aborted(format!(
                "arm requested in unconfirmed {} state",
                self.state
            )));
        }

        self.io
            .write(&self.signals.request, SignalValue::Int(1))
            .await?;
        self.state = ArmState::ArmPending;
        debug!(timeout_s = timeout.as_secs_f64(), "arm requested, polling read-back");

        if self.await_readback(true, timeout).await? {
            self.state = ArmState::Armed;
            info!("controller armed");
            Ok(())
        } else {
            warn!(
                timeout_s = timeout.as_secs_f64(),
                "arm not confirmed, state unknown"
            );
            Err(BeamlineError::ArmTimeout {
                timeout_s: timeout.as_secs_f64(),
            })
        }
    }

    /// Request disarm and wait for the hardware to confirm.
    ///
    /// No-op (and no hardware write) when already `Disarmed`.
    ///
    /// # Errors
    ///
    /// - [`BeamlineError::DisarmTimeout`] when the read-back still reports
    ///   armed after `timeout`; the state remains `DisarmPending`.
    /// - [`BeamlineError::HardwareIo`] from the I/O layer.
    pub async fn disarm(&mut self, timeout: Duration) -> AppResult<()> {
        if self.state == ArmState::Disarmed {
            debug!("disarm requested while already disarmed, no-op");
            return Ok(());
        }

        self.io
            .write(&self.signals.request, SignalValue::Int(0))
            .await?;
        self.state = ArmState::DisarmPending;
        debug!(
            timeout_s = timeout.as_secs_f64(),
            "disarm requested, polling read-back"
        );

        if self.await_readback(false, timeout).await? {
            self.state = ArmState::Disarmed;
            info!("controller disarmed");
            Ok(())
        } else {
            warn!(
                timeout_s = timeout.as_secs_f64(),
                "disarm not confirmed, state unknown"
            );
            Err(BeamlineError::DisarmTimeout {
                timeout_s: timeout.as_secs_f64(),
            })
        }
    }

    /// Poll the read-back until it matches `want`.
    ///
    /// Returns `Ok(true)` on confirmation, `Ok(false)` on timeout; I/O
    /// failures propagate.
    async fn await_readback(&self, want: bool, timeout: Duration) -> AppResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let value = self.io.read(&self.signals.readback).await?;
            if value.as_flag() == want {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{ConfirmBehavior, MockController};

    fn settings() -> ArmingSettings {
        ArmingSettings {
            poll_interval: Duration::from_millis(10),
            ..ArmingSettings::default()
        }
    }

    #[tokio::test]
    async fn test_arm_confirms_after_polls() {
        let io = Arc::new(
            MockController::new().with_arm_behavior(ConfirmBehavior::AfterPolls(3)),
        );
        let mut control = ArmControl::new(io.clone(), ArmSignals::default(), &settings());

        control.arm(Duration::from_secs(1)).await.unwrap();
        assert_eq!(control.state(), ArmState::Armed);
        assert_eq!(io.write_count(&ArmSignals::default().request), 1);
    }

    #[tokio::test]
    async fn test_arm_while_armed_is_no_op() {
        let io = Arc::new(MockController::new());
        let mut control = ArmControl::new(io.clone(), ArmSignals::default(), &settings());

        control.arm(Duration::from_secs(1)).await.unwrap();
        control.arm(Duration::from_secs(1)).await.unwrap();

        // One hardware write despite two arm calls
        assert_eq!(io.write_count(&ArmSignals::default().request), 1);
        assert_eq!(control.state(), ArmState::Armed);
    }

    #[tokio::test]
    async fn test_arm_timeout_leaves_pending_state() {
        let io = Arc::new(MockController::new().with_arm_behavior(ConfirmBehavior::Never));
        let mut control = ArmControl::new(io, ArmSignals::default(), &settings());

        let started = Instant::now();
        let result = control.arm(Duration::from_millis(500)).await;

        assert!(matches!(result, Err(BeamlineError::ArmTimeout { .. })));
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_ne!(control.state(), ArmState::Armed);
        assert_eq!(control.state(), ArmState::ArmPending);
    }

    #[tokio::test]
    async fn test_arm_rejected_from_pending_state() {
        let io = Arc::new(MockController::new().with_arm_behavior(ConfirmBehavior::Never));
        let mut control = ArmControl::new(io, ArmSignals::default(), &settings());

        let _ = control.arm(Duration::from_millis(50)).await;
        assert_eq!(control.state(), ArmState::ArmPending);

        let result = control.arm(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(BeamlineError::Aborted(_))));
    }

    #[tokio::test]
    async fn test_disarm_round_trip() {
        let io = Arc::new(MockController::new());
        let mut control = ArmControl::new(io.clone(), ArmSignals::default(), &settings());

        control.arm(Duration::from_secs(1)).await.unwrap();
        control.disarm(Duration::from_secs(1)).await.unwrap();
        assert_eq!(control.state(), ArmState::Disarmed);

        // Disarm again: no-op, no extra write
        let writes_before = io.write_count(&ArmSignals::default().request);
        control.disarm(Duration::from_secs(1)).await.unwrap();
        assert_eq!(io.write_count(&ArmSignals::default().request), writes_before);
    }

    #[tokio::test]
    async fn test_disarm_accepted_after_arm_timeout() {
        // Disarm is the safe direction: it must work from ArmPending so the
        // cleanup path can recover a wedged arm.
        let io = Arc::new(MockController::new().with_arm_behavior(ConfirmBehavior::Never));
        let mut control = ArmControl::new(io, ArmSignals::default(), &settings());

        let _ = control.arm(Duration::from_millis(50)).await;
        assert_eq!(control.state(), ArmState::ArmPending);

        control.disarm(Duration::from_secs(1)).await.unwrap();
        assert_eq!(control.state(), ArmState::Disarmed);
    }

    #[tokio::test]
    async fn test_disarm_timeout() {
        let io = Arc::new(
            MockController::new().with_disarm_behavior(ConfirmBehavior::Never),
        );
        let mut control = ArmControl::new(io, ArmSignals::default(), &settings());

        control.arm(Duration::from_secs(1)).await.unwrap();
        let result = control.disarm(Duration::from_millis(100)).await;
        assert!(matches!(result, Err(BeamlineError::DisarmTimeout { .. })));
        assert_eq!(control.state(), ArmState::DisarmPending);
    }
}
