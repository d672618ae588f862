//! Mock hardware implementations.
//!
//! Provides a simulated trigger controller for testing without beamline
//! hardware. The mock keeps an in-memory register map, records every write
//! in order, and scripts the armed read-back so tests can exercise the
//! confirm-after-N-polls and never-confirms paths of the arm state machine.
//!
//! All operations are async-safe; locks are held only across map accesses,
//! never across an await point.

use crate::arming::ArmSignals;
use crate::error::{AppResult, BeamlineError};
use crate::hardware::io::{SignalId, SignalIo, SignalValue, WriteGroup};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How the mock's armed read-back responds to an arm/disarm request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmBehavior {
    /// Read-back reflects the request immediately
    Immediate,
    /// Read-back flips after this many polls
    AfterPolls(u32),
    /// Read-back never changes (simulates a wedged controller)
    Never,
}

#[derive(Debug, Clone, Copy)]
struct PendingTransition {
    target: i64,
    polls_left: u32,
}

/// Shared, ordered record of externally visible events.
///
/// Tests hand the same log to the mock controller and a mock admission gate
/// to assert cross-component ordering (admission before arm, cleanup after
/// failure).
pub type EventLog = Arc<Mutex<Vec<String>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated trigger controller register map.
pub struct MockController {
    registers: Mutex<HashMap<SignalId, SignalValue>>,
    write_log: Mutex<Vec<(SignalId, SignalValue)>>,
    groups: Mutex<HashMap<String, Vec<SignalId>>>,
    failing: Mutex<HashSet<SignalId>>,
    arm_signals: ArmSignals,
    arm_behavior: ConfirmBehavior,
    disarm_behavior: ConfirmBehavior,
    pending: Mutex<Option<PendingTransition>>,
    events: Option<EventLog>,
}

impl MockController {
    /// Create a mock whose arm and disarm confirm immediately.
    pub fn new() -> Self {
        Self {
            registers: Mutex::new(HashMap::new()),
            write_log: Mutex::new(Vec::new()),
            groups: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            arm_signals: ArmSignals::default(),
            arm_behavior: ConfirmBehavior::Immediate,
            disarm_behavior: ConfirmBehavior::Immediate,
            pending: Mutex::new(None),
            events: None,
        }
    }

    /// Script the armed read-back's response to arm requests.
    pub fn with_arm_behavior(mut self, behavior: ConfirmBehavior) -> Self {
        self.arm_behavior = behavior;
        self
    }

    /// Script the armed read-back's response to disarm requests.
    pub fn with_disarm_behavior(mut self, behavior: ConfirmBehavior) -> Self {
        self.disarm_behavior = behavior;
        self
    }

    /// Use non-default arm request/read-back registers.
    pub fn with_arm_signals(mut self, signals: ArmSignals) -> Self {
        self.arm_signals = signals;
        self
    }

    /// Make every access to `signal` fail with a hardware I/O error.
    pub fn with_failing_signal(self, signal: SignalId) -> Self {
        lock(&self.failing).insert(signal);
        self
    }

    /// Mirror writes and group waits into a shared event log.
    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// Every write issued, in order.
    pub fn write_log(&self) -> Vec<(SignalId, SignalValue)> {
        lock(&self.write_log).clone()
    }

    /// Number of writes issued to one signal.
    pub fn write_count(&self, signal: &SignalId) -> usize {
        lock(&self.write_log)
            .iter()
            .filter(|(id, _)| id == signal)
            .count()
    }

    /// Current value of a register, if anything was written to it.
    pub fn register(&self, signal: &SignalId) -> Option<SignalValue> {
        lock(&self.registers).get(signal).cloned()
    }

    /// Signals written under a group tag, in order.
    pub fn group_signals(&self, group: &WriteGroup) -> Vec<SignalId> {
        lock(&self.groups)
            .get(group.as_str())
            .cloned()
            .unwrap_or_default()
    }

    fn note(&self, event: String) {
        if let Some(events) = &self.events {
            lock(events).push(event);
        }
    }

    fn apply_write(&self, signal: &SignalId, value: SignalValue) -> AppResult<()> {
        if lock(&self.failing).contains(signal) {
            return Err(BeamlineError::hardware_io(
                signal.as_str(),
                "simulated write failure",
            ));
        }

        self.note(format!("write:{signal}={value}"));
        lock(&self.write_log).push((signal.clone(), value.clone()));

        if *signal == self.arm_signals.request {
            if let SignalValue::Int(v) = value {
                let (behavior, target) = if v != 0 {
                    (self.arm_behavior, 1)
                } else {
                    (self.disarm_behavior, 0)
                };
                match behavior {
                    ConfirmBehavior::Immediate => {
                        lock(&self.registers)
                            .insert(self.arm_signals.readback.clone(), SignalValue::Int(target));
                        *lock(&self.pending) = None;
                    }
                    ConfirmBehavior::AfterPolls(polls) => {
                        *lock(&self.pending) = Some(PendingTransition {
                            target,
                            polls_left: polls,
                        });
                    }
                    ConfirmBehavior::Never => {
                        *lock(&self.pending) = None;
                    }
                }
            }
        }

        lock(&self.registers).insert(signal.clone(), value);
        Ok(())
    }
}

impl Default for MockController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalIo for MockController {
    async fn read(&self, signal: &SignalId) -> AppResult<SignalValue> {
        if lock(&self.failing).contains(signal) {
            return Err(BeamlineError::hardware_io(
                signal.as_str(),
                "simulated read failure",
            ));
        }

        if *signal == self.arm_signals.readback {
            let mut pending = lock(&self.pending);
            if let Some(transition) = pending.as_mut() {
                if transition.polls_left > 0 {
                    transition.polls_left -= 1;
                }
                if transition.polls_left == 0 {
                    lock(&self.registers).insert(
                        self.arm_signals.readback.clone(),
                        SignalValue::Int(transition.target),
                    );
                    *pending = None;
                }
            }
        }

        Ok(lock(&self.registers)
            .get(signal)
            .cloned()
            .unwrap_or(SignalValue::Int(0)))
    }

    async fn write(&self, signal: &SignalId, value: SignalValue) -> AppResult<()> {
        self.apply_write(signal, value)
    }

    async fn write_grouped(
        &self,
        signal: &SignalId,
        value: SignalValue,
        group: &WriteGroup,
    ) -> AppResult<()> {
        self.apply_write(signal, value)?;
        lock(&self.groups)
            .entry(group.as_str().to_string())
            .or_default()
            .push(signal.clone());
        Ok(())
    }

    async fn wait_group(&self, group: &WriteGroup, _timeout: Duration) -> AppResult<()> {
        // Mock writes complete synchronously, so the barrier is immediate.
        self.note(format!("wait_group:{group}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registers_default_to_zero() {
        let mock = MockController::new();
        let value = mock.read(&SignalId::new("PC:GATE:START")).await.unwrap();
        assert_eq!(value, SignalValue::Int(0));
    }

    #[tokio::test]
    async fn test_writes_are_logged_in_order() {
        let mock = MockController::new();
        mock.write(&SignalId::new("A"), SignalValue::Int(1))
            .await
            .unwrap();
        mock.write(&SignalId::new("B"), SignalValue::Float(2.5))
            .await
            .unwrap();

        let log = mock.write_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].0, SignalId::new("A"));
        assert_eq!(log[1].0, SignalId::new("B"));
    }

    #[tokio::test]
    async fn test_arm_confirms_after_scripted_polls() {
        let mock = MockController::new().with_arm_behavior(ConfirmBehavior::AfterPolls(2));
        let signals = ArmSignals::default();

        mock.write(&signals.request, SignalValue::Int(1))
            .await
            .unwrap();
        assert!(!mock.read(&signals.readback).await.unwrap().as_flag());
        assert!(mock.read(&signals.readback).await.unwrap().as_flag());
    }

    #[tokio::test]
    async fn test_never_behavior_keeps_readback_low() {
        let mock = MockController::new().with_arm_behavior(ConfirmBehavior::Never);
        let signals = ArmSignals::default();

        mock.write(&signals.request, SignalValue::Int(1))
            .await
            .unwrap();
        for _ in 0..10 {
            assert!(!mock.read(&signals.readback).await.unwrap().as_flag());
        }
    }

    #[tokio::test]
    async fn test_failing_signal_errors() {
        let mock = MockController::new().with_failing_signal(SignalId::new("BROKEN"));
        let result = mock
            .write(&SignalId::new("BROKEN"), SignalValue::Int(1))
            .await;
        assert!(matches!(result, Err(BeamlineError::HardwareIo { .. })));
    }

    #[tokio::test]
    async fn test_grouped_writes_tracked() {
        let mock = MockController::new();
        let group = WriteGroup::named("setup");

        mock.write_grouped(&SignalId::new("A"), SignalValue::Int(1), &group)
            .await
            .unwrap();
        mock.write_grouped(&SignalId::new("B"), SignalValue::Int(2), &group)
            .await
            .unwrap();
        mock.wait_group(&group, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(
            mock.group_signals(&group),
            vec![SignalId::new("A"), SignalId::new("B")]
        );
    }
}
