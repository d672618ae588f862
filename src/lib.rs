//! # Beamline Trigger Sequencing Library
//!
//! This crate is the hardware trigger-sequencing core for synchrotron X-ray
//! diffraction data collection: it translates a logical scan description
//! (step size, step count, exposure time, axis velocity, direction) into
//! trigger programs for two controller families, and drives the arm/disarm
//! lifecycle and beam-refill admission wait around each sweep. Missed or
//! extra triggers silently corrupt a dataset, so everything here is built
//! around request-then-confirm hardware access and guaranteed cleanup.
//!
//! ## Crate Structure
//!
//! - **`geometry`**: Validated, immutable scan description
//!   ([`geometry::ScanGeometry`]) and encoder-count conversion.
//! - **`timing`**: Pure translation from geometry and detector timing to
//!   window/pulse quantities ([`timing::TimingProfile`]).
//! - **`sequencer`**: Six-row boustrophedon table for stored-program trigger
//!   controllers.
//! - **`gate`**: Gate/pulse configuration and detector-dependent output
//!   routing for logic-gate trigger controllers.
//! - **`arming`**: Request-then-confirm arm/disarm state machine with
//!   bounded-timeout polling.
//! - **`admission`**: Beam-refill admission gate contract and a periodic
//!   reference provider.
//! - **`actor`** / **`messages`**: Command/result protocol and the single
//!   actor task that owns each controller's hardware state.
//! - **`sweep`**: End-to-end sweep orchestration with guaranteed disarm and
//!   return-to-normal.
//! - **`cleanup`**: LIFO async cleanup registry backing the sweep's
//!   guaranteed-cleanup path.
//! - **`hardware`**: Device I/O contract ([`hardware::SignalIo`]) and the
//!   mock controller used by tests and the demo binary.
//! - **`config`**: Figment-based settings; every hardware constant and
//!   timeout is injected, never a module global.
//! - **`logging`**: Tracing initialization.
//! - **`error`**: Central [`error::BeamlineError`] taxonomy.

pub mod actor;
pub mod admission;
pub mod arming;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod gate;
pub mod geometry;
pub mod hardware;
pub mod logging;
pub mod messages;
pub mod sequencer;
pub mod signals;
pub mod sweep;
pub mod timing;
