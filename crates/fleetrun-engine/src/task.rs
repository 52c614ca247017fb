//! Per-endpoint task: one attempt loop plus retry state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

use fleetrun_core::{CommandOutcome, Endpoint, ErrorKind, TaskOutcome, TaskState};

use crate::session::SessionFactory;

/// Mutable run state bound 1:1 to an endpoint. Created by the
/// scheduler when the endpoint is admitted, discarded once its outcome
/// has been folded into the aggregator.
pub(crate) struct TaskRun {
    pub endpoint: Arc<Endpoint>,
    pub attempt: u32,
    pub max_attempts: u32,
    pub state: TaskState,
    pub last_error: Option<ErrorKind>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRun {
    pub fn new(endpoint: Arc<Endpoint>, max_attempts: u32) -> Self {
        Self {
            endpoint,
            attempt: 0,
            max_attempts,
            state: TaskState::Pending,
            last_error: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Enter `Running` for the next attempt.
    pub fn start_attempt(&mut self) {
        debug_assert!(!self.state.is_terminal());
        self.state = TaskState::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Leave `Running`. Consumes exactly one attempt.
    pub fn finish_attempt(&mut self, error: Option<ErrorKind>) {
        self.attempt += 1;
        self.last_error = error;
    }

    /// True if a retryable failure still has attempts left.
    pub fn can_retry(&self) -> bool {
        match &self.last_error {
            Some(kind) => kind.is_retryable() && self.attempt < self.max_attempts,
            None => false,
        }
    }

    /// Move to a terminal state and build the aggregator outcome.
    pub fn succeed(&mut self, outputs: Vec<CommandOutcome>) -> TaskOutcome {
        self.state = TaskState::Succeeded;
        self.finished_at = Some(Utc::now());
        TaskOutcome::Success(outputs)
    }

    /// Move to `Failed` with the given final classification.
    pub fn fail(&mut self, kind: ErrorKind) -> TaskOutcome {
        self.state = TaskState::Failed;
        self.finished_at = Some(Utc::now());
        TaskOutcome::Failure {
            kind,
            attempts: self.attempt,
        }
    }

    /// Wall-clock milliseconds from first attempt to terminal state.
    pub fn elapsed_ms(&self) -> i64 {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => (finished - started).num_milliseconds(),
            _ => 0,
        }
    }
}

/// Run one attempt: connect, execute the commands in order, close.
///
/// The whole attempt races a single deadline of `attempt_timeout`;
/// expiry anywhere classifies the attempt as `Timeout`. Close is
/// attempted exactly once per successful connect, on every exit path,
/// and its failures never escalate the attempt's outcome.
pub(crate) async fn run_attempt(
    factory: &Arc<dyn SessionFactory>,
    endpoint: &Endpoint,
    attempt_timeout: Duration,
) -> Result<Vec<CommandOutcome>, ErrorKind> {
    let deadline = Instant::now() + attempt_timeout;

    let mut session = match timeout_at(deadline, factory.connect(endpoint)).await {
        Ok(Ok(session)) => session,
        Ok(Err(kind)) => return Err(kind),
        Err(_) => return Err(ErrorKind::Timeout),
    };

    // Fail fast within the attempt: the first command error ends it,
    // so a retry re-runs the full sequence on a fresh session.
    let mut outputs = Vec::with_capacity(endpoint.commands.len());
    let mut failure = None;

    for command in &endpoint.commands {
        match timeout_at(deadline, session.execute(command)).await {
            Ok(Ok(output)) => {
                debug!(endpoint = %endpoint.id, command = %command, "command completed");
                outputs.push(CommandOutcome::ok(command.as_str(), output));
            }
            Ok(Err(kind)) => {
                outputs.push(CommandOutcome::failed(command.as_str(), kind.clone()));
                failure = Some(kind);
                break;
            }
            Err(_) => {
                outputs.push(CommandOutcome::failed(command.as_str(), ErrorKind::Timeout));
                failure = Some(ErrorKind::Timeout);
                break;
            }
        }
    }

    // Best-effort teardown, bounded so a hanging close cannot wedge a
    // worker slot past the attempt budget.
    match timeout(attempt_timeout, session.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            warn!(endpoint = %endpoint.id, %error, "session close failed");
        }
        Err(_) => {
            warn!(endpoint = %endpoint.id, "session close timed out");
        }
    }

    match failure {
        Some(kind) => Err(kind),
        None => Ok(outputs),
    }
}
