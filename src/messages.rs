//! Message types for the trigger actor's command protocol.
//!
//! This module defines the command and response types used for
//! message-passing between sweep orchestration and the [`crate::actor`]
//! task that owns the trigger controller.
//!
//! # Architecture
//!
//! The controller's hardware state is a single mutable resource, so all
//! access is serialized through one actor task. Commands are sent via an
//! mpsc channel and each carries a `oneshot::Sender` for its response:
//!
//! ```text
//! Sweep Task                        Trigger Actor
//! ----------                        -------------
//! 1. Create command with oneshot
//! 2. Send via mpsc channel   ------>
//!                                   3. Receive command
//!                                   4. Perform hardware writes
//!                                   5. Send response
//! 6. Await oneshot receiver  <------
//! 7. Handle result
//! ```
//!
//! Because the actor processes one command at a time, two sweeps can never
//! interleave their arm sequences: a second arm request queues behind the
//! first and observes its completed state.
//!
//! # Helper Methods
//!
//! Each command variant has a helper method that creates the command and
//! returns the oneshot receiver:
//!
//! ```rust
//! use beamline_daq::messages::SweepCommand;
//! use std::time::Duration;
//!
//! let (cmd, rx) = SweepCommand::arm(Duration::from_secs(10));
//! // command_tx.send(cmd).await?;
//! // let result = rx.await?;
//! ```

use crate::arming::ArmState;
use crate::error::AppResult;
use crate::gate::GateConfig;
use crate::sequencer::SequencerTable;
use std::time::Duration;
use tokio::sync::oneshot;

/// Snapshot of the trigger actor's state.
#[derive(Debug, Clone)]
pub struct SweepStatus {
    /// Current arm state machine position
    pub arm_state: ArmState,
    /// Hardware writes issued since the actor started
    pub writes_issued: usize,
    /// Most recent command failure, if any
    pub last_error: Option<String>,
}

/// Commands accepted by the trigger actor.
///
/// Each variant includes a `oneshot::Sender` for the response. Use the
/// helper constructors ([`arm`](Self::arm), [`disarm`](Self::disarm), ...)
/// to create commands with receivers.
#[derive(Debug)]
pub enum SweepCommand {
    /// Write a sequencer table to the controller as one grouped set.
    ///
    /// # Response
    ///
    /// - `Ok(())`: every register write completed
    /// - `Err`: I/O failure or group timeout; the program is incomplete and
    ///   must not be armed
    ApplySequencerTable {
        /// Six-row program to load
        table: SequencerTable,
        /// Response channel for the write result
        response: oneshot::Sender<AppResult<()>>,
    },

    /// Write a gate/pulse configuration to the controller as one grouped
    /// set.
    ///
    /// # Response
    ///
    /// As for [`Self::ApplySequencerTable`].
    ApplyGateConfig {
        /// Configuration to load
        config: GateConfig,
        /// Response channel for the write result
        response: oneshot::Sender<AppResult<()>>,
    },

    /// Request arm and wait for hardware confirmation.
    ///
    /// # Response
    ///
    /// - `Ok(())`: controller confirmed armed
    /// - `Err(ArmTimeout)`: no confirmation within the timeout; unsafe to
    ///   proceed
    Arm {
        /// Bound on waiting for the armed read-back
        timeout: Duration,
        /// Response channel for the arm result
        response: oneshot::Sender<AppResult<()>>,
    },

    /// Request disarm and wait for hardware confirmation.
    ///
    /// # Response
    ///
    /// Symmetric to [`Self::Arm`].
    Disarm {
        /// Bound on waiting for the read-back to drop
        timeout: Duration,
        /// Response channel for the disarm result
        response: oneshot::Sender<AppResult<()>>,
    },

    /// Restore the documented quiescent configuration.
    ///
    /// Idempotent: applying it twice writes the same values twice.
    ///
    /// # Response
    ///
    /// - `Ok(())`: defaults written
    /// - `Err`: I/O failure
    ReturnToNormal {
        /// Response channel for the reset result
        response: oneshot::Sender<AppResult<()>>,
    },

    /// Read the actor's current status.
    ///
    /// Read-only; does not touch hardware.
    Status {
        /// Response channel for the status snapshot
        response: oneshot::Sender<SweepStatus>,
    },

    /// Stop the actor after the current command.
    ///
    /// # Response
    ///
    /// Acknowledged once the actor is about to exit its loop.
    Shutdown {
        /// Response channel acknowledging shutdown
        response: oneshot::Sender<()>,
    },
}

impl SweepCommand {
    /// Helper to create an ApplySequencerTable command.
    pub fn apply_sequencer_table(
        table: SequencerTable,
    ) -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::ApplySequencerTable {
                table,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create an ApplyGateConfig command.
    pub fn apply_gate_config(config: GateConfig) -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::ApplyGateConfig {
                config,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create an Arm command.
    pub fn arm(timeout: Duration) -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Arm {
                timeout,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a Disarm command.
    pub fn disarm(timeout: Duration) -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Disarm {
                timeout,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a ReturnToNormal command.
    pub fn return_to_normal() -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::ReturnToNormal { response: tx }, rx)
    }

    /// Helper to create a Status command.
    pub fn status() -> (Self, oneshot::Receiver<SweepStatus>) {
        let (tx, rx) = oneshot::channel();
        (Self::Status { response: tx }, rx)
    }

    /// Helper to create a Shutdown command.
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}
