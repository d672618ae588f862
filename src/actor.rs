//! Trigger actor: sole owner of a controller's hardware state.
//!
//! One `TriggerActor` task exists per trigger controller. It holds the
//! [`ArmControl`] and the I/O handle, and processes [`SweepCommand`]s
//! strictly one at a time from its mpsc queue. That single-consumer loop is
//! the concurrency story for the whole subsystem: overlapping sweeps cannot
//! interleave arm sequences or trigger programs because their commands
//! queue behind each other.
//!
//! Programming commands are refused unless the controller is confirmed
//! disarmed - rewriting a trigger program under an armed controller is
//! exactly the kind of silent corruption this subsystem exists to prevent.
//! The quiescent reset is exempt: cleanup must be able to restore defaults
//! even when a disarm has timed out and the state is unknown.

use crate::arming::{ArmControl, ArmSignals, ArmState};
use crate::config::{ArmingSettings, IoSettings};
use crate::error::{AppResult, BeamlineError};
use crate::gate::GateConfig;
use crate::hardware::io::{SignalId, SignalIo, SignalValue, WriteGroup};
use crate::messages::{SweepCommand, SweepStatus};
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Capacity of the actor's command queue.
const COMMAND_QUEUE_DEPTH: usize = 32;

/// Actor task owning one trigger controller.
pub struct TriggerActor {
    io: Arc<dyn SignalIo>,
    arm: ArmControl,
    group_timeout: Duration,
    writes_issued: usize,
    last_error: Option<String>,
    command_rx: mpsc::Receiver<SweepCommand>,
}

impl TriggerActor {
    /// Spawn the actor task and return its command channel.
    ///
    /// The returned sender is the only way to reach the controller; clone
    /// it freely, the actor serializes everything.
    pub fn spawn(
        io: Arc<dyn SignalIo>,
        signals: ArmSignals,
        arming: &ArmingSettings,
        io_settings: &IoSettings,
    ) -> (mpsc::Sender<SweepCommand>, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let actor = Self {
            io: io.clone(),
            arm: ArmControl::new(io, signals, arming),
            group_timeout: io_settings.group_timeout,
            writes_issued: 0,
            last_error: None,
            command_rx,
        };
        let handle = tokio::spawn(actor.run());
        (command_tx, handle)
    }

    async fn run(mut self) {
        info!("trigger actor started");
        while let Some(command) = self.command_rx.recv().await {
            if self.handle_command(command).await {
                break;
            }
        }
        info!("trigger actor stopped");
    }

    /// Process one command. Returns `true` when the actor should exit.
    async fn handle_command(&mut self, command: SweepCommand) -> bool {
        match command {
            SweepCommand::ApplySequencerTable { table, response } => {
                let result = self.apply_program(table.to_writes()).await;
                let _ = response.send(result);
            }

            SweepCommand::ApplyGateConfig { config, response } => {
                let result = self.apply_program(config.to_writes()).await;
                let _ = response.send(result);
            }

            SweepCommand::Arm { timeout, response } => {
                let result = self.arm.arm(timeout).await;
                self.record(&result);
                let _ = response.send(result);
            }

            SweepCommand::Disarm { timeout, response } => {
                let result = self.arm.disarm(timeout).await;
                self.record(&result);
                let _ = response.send(result);
            }

            SweepCommand::ReturnToNormal { response } => {
                // No disarmed-state guard here: cleanup restores defaults
                // even when a disarm timed out and the state is unknown.
                let result = self.apply_writes(GateConfig::quiescent().to_writes()).await;
                self.record(&result);
                let _ = response.send(result);
            }

            SweepCommand::Status { response } => {
                let _ = response.send(SweepStatus {
                    arm_state: self.arm.state(),
                    writes_issued: self.writes_issued,
                    last_error: self.last_error.clone(),
                });
            }

            SweepCommand::Shutdown { response } => {
                debug!("shutdown requested");
                let _ = response.send(());
                return true;
            }
        }
        false
    }

    /// Apply a trigger program, refusing unless confirmed disarmed.
    async fn apply_program(&mut self, writes: Vec<(SignalId, SignalValue)>) -> AppResult<()> {
        if self.arm.state() != ArmState::Disarmed {
            let result = Err(BeamlineError::Aborted(format!(
                "cannot load a trigger program in {} state",
                self.arm.state()
            )));
            self.record(&result);
            return result;
        }
        let result = self.apply_writes(writes).await;
        self.record(&result);
        result
    }

    /// Issue a set of register writes as one group and wait for the barrier.
    ///
    /// The writes are in flight concurrently; `wait_group` is the barrier
    /// that makes the whole program resident before anything depends on it.
    async fn apply_writes(&mut self, writes: Vec<(SignalId, SignalValue)>) -> AppResult<()> {
        let group = WriteGroup::new();
        let count = writes.len();
        try_join_all(
            writes
                .into_iter()
                .map(|(signal, value)| {
                    let io = self.io.clone();
                    let group = group.clone();
                    async move { io.write_grouped(&signal, value, &group).await }
                }),
        )
        .await?;
        self.writes_issued += count;
        self.io.wait_group(&group, self.group_timeout).await?;
        debug!(count, group = %group, "setup writes complete");
        Ok(())
    }

    fn record(&mut self, result: &AppResult<()>) {
        if let Err(e) = result {
            error!(%e, "command failed");
            self.last_error = Some(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockController;

    fn spawn_with_mock() -> (
        Arc<MockController>,
        mpsc::Sender<SweepCommand>,
        JoinHandle<()>,
    ) {
        let mock = Arc::new(MockController::new());
        let (tx, handle) = TriggerActor::spawn(
            mock.clone(),
            ArmSignals::default(),
            &ArmingSettings {
                poll_interval: Duration::from_millis(5),
                ..ArmingSettings::default()
            },
            &IoSettings::default(),
        );
        (mock, tx, handle)
    }

    #[tokio::test]
    async fn test_apply_gate_config_writes_registers() {
        let (mock, tx, _handle) = spawn_with_mock();

        let (cmd, rx) = SweepCommand::apply_gate_config(GateConfig::quiescent());
        tx.send(cmd).await.unwrap();
        rx.await.unwrap().unwrap();

        assert_eq!(
            mock.register(&SignalId::new("PC:GATE:SELECT")),
            Some(SignalValue::Text("time".to_string()))
        );
    }

    #[tokio::test]
    async fn test_status_counts_writes() {
        let (_mock, tx, _handle) = spawn_with_mock();

        let (cmd, rx) = SweepCommand::apply_gate_config(GateConfig::quiescent());
        tx.send(cmd).await.unwrap();
        rx.await.unwrap().unwrap();

        let (cmd, rx) = SweepCommand::status();
        tx.send(cmd).await.unwrap();
        let status = rx.await.unwrap();
        assert_eq!(status.arm_state, ArmState::Disarmed);
        assert_eq!(status.writes_issued, GateConfig::quiescent().to_writes().len());
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_programming_refused_while_armed() {
        let (_mock, tx, _handle) = spawn_with_mock();

        let (cmd, rx) = SweepCommand::arm(Duration::from_secs(1));
        tx.send(cmd).await.unwrap();
        rx.await.unwrap().unwrap();

        let (cmd, rx) = SweepCommand::apply_gate_config(GateConfig::quiescent());
        tx.send(cmd).await.unwrap();
        let result = rx.await.unwrap();
        assert!(matches!(result, Err(BeamlineError::Aborted(_))));
    }

    #[tokio::test]
    async fn test_return_to_normal_allowed_while_armed() {
        let (mock, tx, _handle) = spawn_with_mock();

        let (cmd, rx) = SweepCommand::arm(Duration::from_secs(1));
        tx.send(cmd).await.unwrap();
        rx.await.unwrap().unwrap();

        let (cmd, rx) = SweepCommand::return_to_normal();
        tx.send(cmd).await.unwrap();
        rx.await.unwrap().unwrap();

        assert_eq!(
            mock.register(&SignalId::new("OUT:TTL1")),
            Some(SignalValue::Text("disconnected".to_string()))
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_actor() {
        let (_mock, tx, handle) = spawn_with_mock();

        let (cmd, rx) = SweepCommand::shutdown();
        tx.send(cmd).await.unwrap();
        rx.await.unwrap();
        handle.await.unwrap();
    }
}
