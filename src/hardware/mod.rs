//! Hardware access layer.
//!
//! The device I/O contract ([`io::SignalIo`]) and the simulated controller
//! used by tests and the demo binary ([`mock::MockController`]).

pub mod io;
pub mod mock;

pub use io::{SignalId, SignalIo, SignalValue, WriteGroup};
pub use mock::{ConfirmBehavior, EventLog, MockController};
