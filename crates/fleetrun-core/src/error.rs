//! Error classification and contract-violation errors.

use crate::ids::EndpointId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed attempt against one endpoint.
///
/// Retryability is the behavioral contract here: callers must be able
/// to distinguish "will never succeed" (bad credentials, cancellation)
/// from "might succeed later" (unreachable host, slow device).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Host unreachable, connection refused, DNS failure.
    #[error("connect failed: {message}")]
    ConnectFailure { message: String },

    /// Credentials rejected. Never retried: retrying a bad password
    /// wastes a slot and risks account lockout.
    #[error("authentication failed: {message}")]
    AuthFailure { message: String },

    /// The attempt exceeded its per-attempt timeout.
    #[error("attempt timed out")]
    Timeout,

    /// The device returned an error for a command.
    #[error("command {command:?} failed: {message}")]
    CommandFailure { command: String, message: String },

    /// Batch-level cancellation was requested before the task could
    /// reach a natural terminal state.
    #[error("batch cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Returns true if a failure of this kind may succeed on a later
    /// attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailure { .. } | Self::Timeout | Self::CommandFailure { .. }
        )
    }

    /// Shorthand constructor for connect failures.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::ConnectFailure {
            message: message.into(),
        }
    }

    /// Shorthand constructor for auth failures.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::AuthFailure {
            message: message.into(),
        }
    }

    /// Shorthand constructor for command failures.
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailure {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Contract violations around batch bookkeeping.
///
/// Unlike [`ErrorKind`], these are programming errors in the caller and
/// fail loudly instead of landing in the report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// The same endpoint id was submitted twice, or an outcome was
    /// recorded twice for one endpoint.
    #[error("duplicate endpoint id: {0}")]
    DuplicateEndpoint(EndpointId),

    /// `finalize` was called before every submitted endpoint reached a
    /// terminal state.
    #[error("incomplete batch: {recorded} of {expected} endpoints recorded")]
    IncompleteBatch { recorded: usize, expected: usize },
}
