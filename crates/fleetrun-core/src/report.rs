//! Batch report - the aggregated result of one fan-out run.

use crate::endpoint::CommandOutcome;
use crate::error::ErrorKind;
use crate::ids::{BatchId, EndpointId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Terminal outcome of one endpoint's task, as fed to the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Every command of some attempt completed.
    Success(Vec<CommandOutcome>),
    /// The task reached `Failed`.
    Failure {
        kind: ErrorKind,
        /// Attempts consumed before giving up.
        attempts: u32,
    },
}

/// Final error and attempt count for one failed endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Classification of the final failure.
    pub kind: ErrorKind,

    /// Attempts consumed before the task reached `Failed`.
    pub attempts: u32,
}

/// Aggregated result of one batch.
///
/// Invariant: the key sets of `succeeded` and `failed` partition the
/// submitted endpoint ids exactly - every endpoint appears in exactly
/// one of the two maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Identity of this run.
    pub batch_id: BatchId,

    /// When the batch was submitted.
    pub started_at: DateTime<Utc>,

    /// When the last task reached a terminal state.
    pub finished_at: DateTime<Utc>,

    /// Endpoints whose task succeeded, with their command outputs.
    pub succeeded: BTreeMap<EndpointId, Vec<CommandOutcome>>,

    /// Endpoints whose task failed, with the final classified error.
    pub failed: BTreeMap<EndpointId, TaskFailure>,
}

impl BatchReport {
    /// Total number of endpoints covered by this report.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Returns true if every endpoint succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// Wall-clock duration of the batch.
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
