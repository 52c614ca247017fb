//! Result aggregator - collects terminal task outcomes into a report.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use chrono::Utc;
use fleetrun_core::{
    BatchError, BatchId, BatchReport, CommandOutcome, Endpoint, EndpointId, TaskFailure,
    TaskOutcome,
};

/// Single writer for the batch report.
///
/// Pure bookkeeping: no I/O, no capability calls. Workers call
/// [`record`](Self::record) in arbitrary completion order; the mutex
/// around the maps is the one piece of shared mutable state in the
/// engine.
pub struct BatchAggregator {
    batch_id: BatchId,
    started_at: chrono::DateTime<Utc>,
    inner: Mutex<Inner>,
}

struct Inner {
    /// Submitted ids not yet recorded.
    pending: BTreeSet<EndpointId>,
    expected: usize,
    succeeded: BTreeMap<EndpointId, Vec<CommandOutcome>>,
    failed: BTreeMap<EndpointId, TaskFailure>,
}

impl BatchAggregator {
    /// Create an aggregator for the given submission set.
    ///
    /// Rejects duplicate endpoint ids: two concurrent sessions to the
    /// same logical target is a caller bug, not a scheduling decision.
    pub fn new(endpoints: &[Endpoint]) -> Result<Self, BatchError> {
        let mut pending = BTreeSet::new();
        for endpoint in endpoints {
            if !pending.insert(endpoint.id.clone()) {
                return Err(BatchError::DuplicateEndpoint(endpoint.id.clone()));
            }
        }

        Ok(Self {
            batch_id: BatchId::generate(),
            started_at: Utc::now(),
            inner: Mutex::new(Inner {
                expected: pending.len(),
                pending,
                succeeded: BTreeMap::new(),
                failed: BTreeMap::new(),
            }),
        })
    }

    /// Identity of the batch being aggregated.
    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    /// Record the terminal outcome for one endpoint.
    ///
    /// Called exactly once per submitted endpoint; a second call for
    /// the same id is a programming error and is reported, not
    /// silently overwritten.
    pub fn record(&self, id: &EndpointId, outcome: TaskOutcome) -> Result<(), BatchError> {
        let mut inner = self.inner.lock().expect("aggregator mutex poisoned");

        if !inner.pending.remove(id) {
            return Err(BatchError::DuplicateEndpoint(id.clone()));
        }

        match outcome {
            TaskOutcome::Success(outputs) => {
                inner.succeeded.insert(id.clone(), outputs);
            }
            TaskOutcome::Failure { kind, attempts } => {
                inner.failed.insert(id.clone(), TaskFailure { kind, attempts });
            }
        }
        Ok(())
    }

    /// Consume the aggregator and produce the immutable report.
    ///
    /// Only valid once every submitted endpoint has been recorded.
    pub fn finalize(self) -> Result<BatchReport, BatchError> {
        let inner = self.inner.into_inner().expect("aggregator mutex poisoned");

        if !inner.pending.is_empty() {
            return Err(BatchError::IncompleteBatch {
                recorded: inner.expected - inner.pending.len(),
                expected: inner.expected,
            });
        }

        Ok(BatchReport {
            batch_id: self.batch_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            succeeded: inner.succeeded,
            failed: inner.failed,
        })
    }
}
