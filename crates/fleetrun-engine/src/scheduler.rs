//! Scheduler - fans endpoints out to bounded concurrent workers.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleetrun_core::{BatchError, BatchReport, Endpoint, ErrorKind, TaskOutcome, TaskState};

use crate::aggregator::BatchAggregator;
use crate::config::RunConfig;
use crate::session::SessionFactory;
use crate::task::{run_attempt, TaskRun};

/// Scheduler errors.
///
/// Per-endpoint failures never surface here - they land in the
/// [`BatchReport`]. These are contract violations and infrastructure
/// faults only.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Contract(#[from] BatchError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("worker task panicked: {0}")]
    WorkerPanic(String),
}

/// Bounded-concurrency fan-out scheduler.
///
/// Admission is strictly FIFO in submission order; a task re-entering
/// the queue after its retry delay competes for a slot on equal
/// footing with fresh tasks. At most `max_concurrency` attempts run at
/// any instant, and retry-delay sleeps hold no slot.
pub struct Scheduler {
    config: RunConfig,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Create a new Scheduler.
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels the batch when triggered. After cancellation
    /// no new attempts start; in-flight attempts finish their deadline
    /// and `run` still returns a complete report.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every endpoint's command sequence to a terminal state and
    /// return the aggregated report.
    ///
    /// Returns an error only for contract violations (duplicate ids,
    /// invalid configuration) - partial failures, timeouts, and
    /// cancellation are normal batch outcomes carried in the report.
    pub async fn run(
        &self,
        endpoints: Vec<Endpoint>,
        factory: Arc<dyn SessionFactory>,
    ) -> Result<BatchReport, SchedulerError> {
        if self.config.max_concurrency == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.config.max_attempts == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }

        let aggregator = Arc::new(BatchAggregator::new(&endpoints)?);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut workers = JoinSet::new();

        info!(
            batch_id = %aggregator.batch_id(),
            endpoints = endpoints.len(),
            max_concurrency = self.config.max_concurrency,
            "starting batch"
        );

        for endpoint in endpoints {
            let endpoint = Arc::new(endpoint);

            // First-attempt slots are taken here, in submission order,
            // which makes admission strictly FIFO. An endpoint still
            // waiting for its first slot when cancellation fires never
            // starts an attempt.
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(endpoint = %endpoint.id, "cancelled before first attempt");
                    aggregator.record(
                        &endpoint.id,
                        TaskOutcome::Failure {
                            kind: ErrorKind::Cancelled,
                            attempts: 0,
                        },
                    )?;
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => {
                    permit.expect("semaphore is never closed")
                }
            };

            let task = TaskRun::new(endpoint, self.config.max_attempts);
            workers.spawn(drive(
                task,
                permit,
                factory.clone(),
                self.config.clone(),
                semaphore.clone(),
                self.cancel.clone(),
                aggregator.clone(),
            ));
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(contract)) => return Err(SchedulerError::Contract(contract)),
                Err(join_error) => {
                    return Err(SchedulerError::WorkerPanic(join_error.to_string()))
                }
            }
        }

        let aggregator =
            Arc::into_inner(aggregator).expect("all workers joined, aggregator no longer shared");
        let report = aggregator.finalize()?;

        info!(
            batch_id = %report.batch_id,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "batch finished"
        );
        Ok(report)
    }
}

/// Drive one task to a terminal state and record it.
///
/// The worker holds a concurrency permit only while an attempt is
/// running; it is released before the retry-delay sleep and reacquired
/// at the back of the FIFO queue afterwards.
async fn drive(
    mut task: TaskRun,
    first_permit: OwnedSemaphorePermit,
    factory: Arc<dyn SessionFactory>,
    config: RunConfig,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    aggregator: Arc<BatchAggregator>,
) -> Result<(), BatchError> {
    let mut permit = first_permit;

    loop {
        task.start_attempt();
        debug!(
            endpoint = %task.endpoint.id,
            attempt = task.attempt + 1,
            max_attempts = task.max_attempts,
            "attempt starting"
        );

        let result = run_attempt(&factory, &task.endpoint, config.per_attempt_timeout).await;

        // Attempt over - give the slot back before any retry sleep.
        drop(permit);

        match result {
            Ok(outputs) => {
                task.finish_attempt(None);
                let outcome = task.succeed(outputs);
                info!(
                    endpoint = %task.endpoint.id,
                    attempts = task.attempt,
                    elapsed_ms = task.elapsed_ms(),
                    "endpoint succeeded"
                );
                return aggregator.record(&task.endpoint.id, outcome);
            }
            Err(kind) => {
                task.finish_attempt(Some(kind.clone()));

                if !task.can_retry() {
                    warn!(
                        endpoint = %task.endpoint.id,
                        attempts = task.attempt,
                        error = %kind,
                        retryable = kind.is_retryable(),
                        "endpoint failed"
                    );
                    let outcome = task.fail(kind);
                    return aggregator.record(&task.endpoint.id, outcome);
                }

                // The attempt was already in flight when cancellation
                // arrived: its natural outcome was not terminal, so the
                // task resolves as cancelled instead of retrying.
                if cancel.is_cancelled() {
                    let outcome = task.fail(ErrorKind::Cancelled);
                    return aggregator.record(&task.endpoint.id, outcome);
                }

                task.state = TaskState::RetryScheduled;
                debug!(
                    endpoint = %task.endpoint.id,
                    attempt = task.attempt,
                    delay_ms = config.retry_delay.as_millis() as u64,
                    error = %kind,
                    "retry scheduled"
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let outcome = task.fail(ErrorKind::Cancelled);
                        return aggregator.record(&task.endpoint.id, outcome);
                    }
                    _ = tokio::time::sleep(config.retry_delay) => {}
                }

                task.state = TaskState::Pending;
                permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let outcome = task.fail(ErrorKind::Cancelled);
                        return aggregator.record(&task.endpoint.id, outcome);
                    }
                    permit = semaphore.clone().acquire_owned() => {
                        permit.expect("semaphore is never closed")
                    }
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use async_trait::async_trait;
    use fleetrun_core::EndpointId;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Behavior of one endpoint's capability across the batch.
    #[derive(Clone)]
    enum Script {
        /// Connect and every command succeed.
        Ok,
        /// Connect succeeds, close reports an error.
        OkCloseFails,
        /// Connect is rejected with AuthFailure.
        AuthFail,
        /// First N connects fail with ConnectFailure, then succeed.
        ConnectFailTimes(u32),
        /// Connect succeeds, first command fails.
        CommandFail,
        /// Connect succeeds, execute never returns.
        Hang,
    }

    #[derive(Default)]
    struct Counters {
        connects: AtomicUsize,
        closes: AtomicUsize,
        open: AtomicUsize,
        max_open: AtomicUsize,
        connect_order: Mutex<Vec<String>>,
    }

    struct MockFactory {
        scripts: HashMap<String, Script>,
        counters: Arc<Counters>,
        connect_failures_seen: Mutex<HashMap<String, u32>>,
    }

    impl MockFactory {
        fn new(scripts: &[(&str, Script)]) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts
                    .iter()
                    .map(|(id, s)| (id.to_string(), s.clone()))
                    .collect(),
                counters: Arc::new(Counters::default()),
                connect_failures_seen: Mutex::new(HashMap::new()),
            })
        }
    }

    enum Behavior {
        Ok,
        CloseFails,
        CommandFail,
        Hang,
    }

    struct MockSession {
        behavior: Behavior,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl Session for MockSession {
        async fn execute(&mut self, command: &str) -> Result<String, ErrorKind> {
            match self.behavior {
                Behavior::Ok | Behavior::CloseFails => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(format!("output of {command}"))
                }
                Behavior::CommandFail => Err(ErrorKind::command(command, "% Invalid input")),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(86400)).await;
                    unreachable!("hung execute should be timed out first")
                }
            }
        }

        async fn close(&mut self) -> Result<(), ErrorKind> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            self.counters.open.fetch_sub(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::CloseFails => Err(ErrorKind::command("close", "teardown failed")),
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl SessionFactory for MockFactory {
        async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Session>, ErrorKind> {
            self.counters.connects.fetch_add(1, Ordering::SeqCst);
            self.counters
                .connect_order
                .lock()
                .unwrap()
                .push(endpoint.id.as_str().to_string());

            let script = self
                .scripts
                .get(endpoint.id.as_str())
                .cloned()
                .unwrap_or(Script::Ok);

            let behavior = match script {
                Script::AuthFail => return Err(ErrorKind::auth("bad credentials")),
                Script::ConnectFailTimes(n) => {
                    let mut seen = self.connect_failures_seen.lock().unwrap();
                    let count = seen.entry(endpoint.id.as_str().to_string()).or_insert(0);
                    if *count < n {
                        *count += 1;
                        return Err(ErrorKind::connect("connection refused"));
                    }
                    Behavior::Ok
                }
                Script::Ok => Behavior::Ok,
                Script::OkCloseFails => Behavior::CloseFails,
                Script::CommandFail => Behavior::CommandFail,
                Script::Hang => Behavior::Hang,
            };

            let open = self.counters.open.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.max_open.fetch_max(open, Ordering::SeqCst);

            Ok(Box::new(MockSession {
                behavior,
                counters: self.counters.clone(),
            }))
        }
    }

    fn endpoint(id: &str) -> Endpoint {
        Endpoint::new(
            id,
            vec!["show version".to_string(), "show ip int brief".to_string()],
        )
    }

    fn config(max_concurrency: usize, max_attempts: u32) -> RunConfig {
        RunConfig {
            max_concurrency,
            per_attempt_timeout: Duration::from_secs(30),
            max_attempts,
            retry_delay: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_succeed_on_first_attempt() {
        let factory = MockFactory::new(&[("a", Script::Ok), ("b", Script::Ok)]);
        let scheduler = Scheduler::new(config(4, 3));

        let report = scheduler
            .run(vec![endpoint("a"), endpoint("b")], factory.clone())
            .await
            .unwrap();

        assert_eq!(report.succeeded.len(), 2);
        assert!(report.all_succeeded());
        let outputs = &report.succeeded[&EndpointId::new("a")];
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].output, "output of show version");
        assert!(outputs[0].error.is_none());

        // One attempt per endpoint, one close per connect.
        assert_eq!(factory.counters.connects.load(Ordering::SeqCst), 2);
        assert_eq!(factory.counters.closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_is_not_retried() {
        let factory = MockFactory::new(&[("a", Script::AuthFail)]);
        let scheduler = Scheduler::new(config(2, 5));

        let report = scheduler.run(vec![endpoint("a")], factory.clone()).await.unwrap();

        let failure = &report.failed[&EndpointId::new("a")];
        assert!(matches!(failure.kind, ErrorKind::AuthFailure { .. }));
        assert_eq!(failure.attempts, 1);
        assert_eq!(factory.counters.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_retry_until_success() {
        // Fails maxAttempts - 1 times, then succeeds on the last slot.
        let factory = MockFactory::new(&[("a", Script::ConnectFailTimes(2))]);
        let scheduler = Scheduler::new(config(2, 3));

        let report = scheduler.run(vec![endpoint("a")], factory.clone()).await.unwrap();

        assert!(report.succeeded.contains_key(&EndpointId::new("a")));
        assert_eq!(factory.counters.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_reports_final_error() {
        let factory = MockFactory::new(&[("a", Script::ConnectFailTimes(99))]);
        let scheduler = Scheduler::new(config(2, 3));

        let report = scheduler.run(vec![endpoint("a")], factory.clone()).await.unwrap();

        let failure = &report.failed[&EndpointId::new("a")];
        assert!(matches!(failure.kind, ErrorKind::ConnectFailure { .. }));
        assert_eq!(failure.attempts, 3);
        assert_eq!(factory.counters.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_cap() {
        let ids: Vec<String> = (0..20).map(|i| format!("sw-{i:02}")).collect();
        let endpoints: Vec<Endpoint> = ids.iter().map(|id| endpoint(id)).collect();
        let factory = MockFactory::new(&[]);
        let scheduler = Scheduler::new(config(3, 1));

        let report = scheduler.run(endpoints, factory.clone()).await.unwrap();

        assert_eq!(report.succeeded.len(), 20);
        assert!(factory.counters.max_open.load(Ordering::SeqCst) <= 3);
        assert_eq!(factory.counters.open.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_admission_order() {
        let endpoints = vec![endpoint("a"), endpoint("b"), endpoint("c")];
        let factory = MockFactory::new(&[]);
        let scheduler = Scheduler::new(config(1, 1));

        scheduler.run(endpoints, factory.clone()).await.unwrap();

        let order = factory.counters.connect_order.lock().unwrap().clone();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_runs_on_command_failure_and_timeout() {
        let factory = MockFactory::new(&[("cmd", Script::CommandFail), ("hang", Script::Hang)]);
        let scheduler = Scheduler::new(config(2, 1));

        let report = scheduler
            .run(vec![endpoint("cmd"), endpoint("hang")], factory.clone())
            .await
            .unwrap();

        assert!(matches!(
            report.failed[&EndpointId::new("cmd")].kind,
            ErrorKind::CommandFailure { .. }
        ));
        assert_eq!(report.failed[&EndpointId::new("hang")].kind, ErrorKind::Timeout);

        // Every successful connect got exactly one close, even on the
        // failure paths.
        assert_eq!(factory.counters.connects.load(Ordering::SeqCst), 2);
        assert_eq!(factory.counters.closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_failure_does_not_change_outcome() {
        let factory = MockFactory::new(&[("a", Script::OkCloseFails)]);
        let scheduler = Scheduler::new(config(1, 1));

        let report = scheduler.run(vec![endpoint("a")], factory.clone()).await.unwrap();

        assert!(report.succeeded.contains_key(&EndpointId::new("a")));
        assert_eq!(factory.counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_failure_aborts_remaining_commands() {
        let factory = MockFactory::new(&[("a", Script::CommandFail)]);
        let scheduler = Scheduler::new(config(1, 1));

        let report = scheduler.run(vec![endpoint("a")], factory.clone()).await.unwrap();

        // Two commands were submitted; the attempt stopped at the first.
        let failure = &report.failed[&EndpointId::new("a")];
        assert!(matches!(
            &failure.kind,
            ErrorKind::CommandFailure { command, .. } if command == "show version"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_yields_complete_report() {
        let mut scripts = vec![("held", Script::Hang)];
        let ids = ["w1", "w2", "w3"];
        for id in ids {
            scripts.push((id, Script::Ok));
        }
        let factory = MockFactory::new(&scripts);

        let mut endpoints = vec![endpoint("held")];
        endpoints.extend(ids.iter().map(|id| endpoint(id)));

        let scheduler = Scheduler::new(config(1, 3));
        let token = scheduler.cancellation_token();

        let handle =
            tokio::spawn(async move { scheduler.run(endpoints, factory).await });

        // Let the first endpoint get in flight, then cancel the batch.
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let report = handle.await.unwrap().unwrap();

        // Every endpoint is covered: the in-flight one resolves as
        // Cancelled after its attempt deadline, the queued ones without
        // ever starting an attempt.
        assert_eq!(report.total(), 4);
        assert_eq!(report.failed.len(), 4);
        for id in ["held", "w1", "w2", "w3"] {
            assert_eq!(report.failed[&EndpointId::new(id)].kind, ErrorKind::Cancelled);
        }
        assert_eq!(report.failed[&EndpointId::new("w1")].attempts, 0);
        assert_eq!(report.failed[&EndpointId::new("held")].attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_endpoints_one_auth_failure() {
        let factory = MockFactory::new(&[("bad", Script::AuthFail)]);
        let endpoints = vec![
            endpoint("sw-01"),
            endpoint("sw-02"),
            endpoint("bad"),
            endpoint("sw-03"),
            endpoint("sw-04"),
        ];
        let scheduler = Scheduler::new(config(2, 3));

        let report = scheduler.run(endpoints, factory.clone()).await.unwrap();

        assert_eq!(report.succeeded.len(), 4);
        assert_eq!(report.failed.len(), 1);
        let failure = &report.failed[&EndpointId::new("bad")];
        assert!(matches!(failure.kind, ErrorKind::AuthFailure { .. }));
        assert_eq!(failure.attempts, 1);
        // No retry delay was consumed anywhere.
        assert_eq!(factory.counters.connects.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_duplicate_endpoint_ids_rejected() {
        let factory = MockFactory::new(&[]);
        let scheduler = Scheduler::new(config(2, 1));

        let result = scheduler
            .run(vec![endpoint("a"), endpoint("a")], factory)
            .await;

        assert!(matches!(
            result,
            Err(SchedulerError::Contract(BatchError::DuplicateEndpoint(id))) if id.as_str() == "a"
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let factory = MockFactory::new(&[]);

        let scheduler = Scheduler::new(config(0, 1));
        assert!(matches!(
            scheduler.run(vec![endpoint("a")], factory.clone()).await,
            Err(SchedulerError::InvalidConfig(_))
        ));

        let scheduler = Scheduler::new(config(1, 0));
        assert!(matches!(
            scheduler.run(vec![endpoint("a")], factory).await,
            Err(SchedulerError::InvalidConfig(_))
        ));
    }
}
