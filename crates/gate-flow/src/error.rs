//! Gate error types.

use crate::GateStep;
use thiserror::Error;

/// Errors returned by the gate state machine.
///
/// Provider failures never surface here: they are shown inline through
/// `GateView::error`. These errors mean the caller drove the machine
/// incorrectly.
#[derive(Error, Debug)]
pub enum GateError {
    /// A user-input method was called in the wrong step
    #[error("Expected the gate in {expected:?}, but it is in {actual:?}")]
    UnexpectedStep { expected: GateStep, actual: GateStep },

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// The gate is open without a request
    #[error("No active gate request")]
    NoActiveRequest,
}

/// Result type alias using GateError.
pub type GateResult<T> = Result<T, GateError>;

/// Profile sync failures. Logged and otherwise ignored by the gate.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Backend answered with a non-success status
    #[error("Profile sync rejected with status {status} ({body_summary})")]
    Rejected { status: u16, body_summary: String },

    /// HTTP request error
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid endpoint
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type alias using SyncError.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_step_message() {
        let err = GateError::UnexpectedStep {
            expected: GateStep::Otp,
            actual: GateStep::Login,
        };
        assert_eq!(err.to_string(), "Expected the gate in Otp, but it is in Login");
    }

    #[test]
    fn test_rejected_message_omits_body() {
        let err = SyncError::Rejected {
            status: 500,
            body_summary: "len=12,digest=00000000000000ff".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Profile sync rejected with status 500 (len=12,digest=00000000000000ff)"
        );
    }
}
