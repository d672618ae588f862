//! Custom error types for the application.
//!
//! This module defines the primary error type, `BeamlineError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the failure modes of trigger programming, from bad
//! scan parameters to unconfirmed hardware state changes.
//!
//! ## Error Hierarchy
//!
//! `BeamlineError` is an enum that consolidates the error sources:
//!
//! - **`InvalidGeometry`**: The scan description cannot be turned into a
//!   trigger program (zero-length sweep, non-positive exposure, too few steps
//!   for a bidirectional table). These are caller mistakes and are never
//!   retried - the parameters must be fixed.
//! - **`ArmTimeout`** / **`DisarmTimeout`**: The controller did not confirm a
//!   requested state change within the bounded timeout. Fatal to the current
//!   collection; the state is unknown and a second attempt on unconfirmed
//!   state risks double-triggering, so these are never silently retried.
//! - **`HardwareIo`**: A failure from the device I/O layer (disconnected
//!   signal, rejected write). Surfaced immediately with no local recovery.
//! - **`Config`**: Wraps errors from the `figment` configuration pipeline.
//! - **`Io`**: Wraps standard `std::io::Error` for the binary's file handling.
//!
//! By using `#[from]`, `BeamlineError` can be seamlessly created from
//! underlying error types, simplifying error handling throughout the
//! application with the `?` operator. All variants propagate to the calling
//! experiment plan, which runs cleanup (disarm + return-to-normal) before
//! re-raising; nothing here is swallowed silently.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, BeamlineError>;

#[derive(Error, Debug)]
pub enum BeamlineError {
    #[error("Invalid scan geometry: {0}")]
    InvalidGeometry(String),

    #[error("Controller did not confirm arm within {timeout_s:.3}s")]
    ArmTimeout { timeout_s: f64 },

    #[error("Controller did not confirm disarm within {timeout_s:.3}s")]
    DisarmTimeout { timeout_s: f64 },

    #[error("Hardware I/O error on '{signal}': {message}")]
    HardwareIo { signal: String, message: String },

    #[error("Grouped write set '{group}' incomplete after {timeout_s:.3}s")]
    GroupTimeout { group: String, timeout_s: f64 },

    #[error("Sweep aborted: {0}")]
    Aborted(String),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BeamlineError {
    /// Build a `HardwareIo` error for a named signal.
    pub fn hardware_io(signal: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HardwareIo {
            signal: signal.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the failed operation with the same inputs could ever
    /// succeed. Arm/disarm timeouts and geometry errors are terminal for the
    /// current collection.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BeamlineError::GroupTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_timeout_message_includes_bound() {
        let err = BeamlineError::ArmTimeout { timeout_s: 0.5 };
        assert!(err.to_string().contains("0.500"));
    }

    #[test]
    fn geometry_errors_are_not_retryable() {
        let err = BeamlineError::InvalidGeometry("zero-length sweep".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn hardware_io_helper_names_signal() {
        let err = BeamlineError::hardware_io("SEQ1:ENABLE", "write rejected");
        assert!(err.to_string().contains("SEQ1:ENABLE"));
        assert!(err.to_string().contains("write rejected"));
    }
}
