//! Task state machine.

use serde::{Deserialize, Serialize};

/// State of one per-endpoint task.
///
/// Transitions: `Pending -> Running -> {Succeeded | RetryScheduled -> Pending | Failed}`.
/// `Pending` is the only initial state; `Succeeded` and `Failed` are
/// the only terminal states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Waiting for a free concurrency slot.
    #[default]
    Pending,
    /// One attempt is actively executing.
    Running,
    /// Last attempt failed retryably; sleeping the retry delay.
    RetryScheduled,
    /// All commands completed on some attempt.
    Succeeded,
    /// Attempts exhausted or a non-retryable failure occurred.
    Failed,
}

impl TaskState {
    /// Returns true if no further transitions occur from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(!TaskState::RetryScheduled.is_terminal());
    }
}
