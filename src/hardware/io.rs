//! Device I/O layer contract.
//!
//! All hardware access in this crate goes through the [`SignalIo`] trait: an
//! opaque register map of named signals read and written asynchronously. The
//! wire format is the controller's own register layout; this layer treats it
//! as key-value writes and nothing more.
//!
//! # Contract
//!
//! - `read`/`write` complete when the controller has accepted the value, not
//!   merely when the request was queued.
//! - `write_grouped` tags a write with a [`WriteGroup`]; grouped writes are
//!   issued concurrently and complete independently. `wait_group` blocks
//!   until every write in the group has completed, or fails with a group
//!   timeout.
//! - Failure modes (disconnected signal, rejected write) surface as
//!   [`crate::error::BeamlineError::HardwareIo`]; there is no local retry.

use crate::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Name of one register/field on a trigger controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalId(String);

impl SignalId {
    /// Create a signal id from a register name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The raw register name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SignalId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value written to or read from a controller register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl SignalValue {
    /// Interpret the value as a boolean flag (non-zero integer).
    pub fn as_flag(&self) -> bool {
        matches!(self, SignalValue::Int(v) if *v != 0)
    }

    /// Interpret the value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SignalValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Int(v) => write!(f, "{v}"),
            SignalValue::Float(v) => write!(f, "{v}"),
            SignalValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for SignalValue {
    fn from(v: i64) -> Self {
        SignalValue::Int(v)
    }
}

impl From<f64> for SignalValue {
    fn from(v: f64) -> Self {
        SignalValue::Float(v)
    }
}

impl From<&str> for SignalValue {
    fn from(v: &str) -> Self {
        SignalValue::Text(v.to_string())
    }
}

/// Tag identifying a set of writes awaited together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WriteGroup(String);

impl WriteGroup {
    /// Create a fresh, unique group tag.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a named group tag (useful in logs and tests).
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The tag as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WriteGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WriteGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asynchronous access to a trigger controller's register map.
///
/// Implemented by the channel-access transport in production and by
/// [`crate::hardware::mock::MockController`] in tests.
#[async_trait]
pub trait SignalIo: Send + Sync {
    /// Read the current value of a signal.
    async fn read(&self, signal: &SignalId) -> AppResult<SignalValue>;

    /// Write a value and wait for the controller to accept it.
    async fn write(&self, signal: &SignalId, value: SignalValue) -> AppResult<()>;

    /// Issue a write tagged with `group` without waiting for completion.
    ///
    /// Grouped writes from one setup phase are in flight concurrently;
    /// `wait_group` provides the completion barrier.
    async fn write_grouped(
        &self,
        signal: &SignalId,
        value: SignalValue,
        group: &WriteGroup,
    ) -> AppResult<()>;

    /// Wait until every write tagged with `group` has completed.
    async fn wait_group(&self, group: &WriteGroup, timeout: Duration) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_value_flag() {
        assert!(SignalValue::Int(1).as_flag());
        assert!(SignalValue::Int(-3).as_flag());
        assert!(!SignalValue::Int(0).as_flag());
        assert!(!SignalValue::Float(1.0).as_flag());
    }

    #[test]
    fn test_write_group_tags_are_unique() {
        assert_ne!(WriteGroup::new(), WriteGroup::new());
        assert_eq!(WriteGroup::named("setup"), WriteGroup::named("setup"));
    }
}
