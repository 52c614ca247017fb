//! Scheduler configuration.

use std::time::Duration;

/// Configuration for one fan-out run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Upper bound on simultaneously running attempts (and therefore
    /// on open transport sessions). Pending and retry-sleeping tasks
    /// are not counted.
    pub max_concurrency: usize,

    /// Wall-clock ceiling for one attempt, covering connect and every
    /// command execution.
    pub per_attempt_timeout: Duration,

    /// Retry ceiling per endpoint. Must be at least 1.
    pub max_attempts: u32,

    /// Fixed delay between attempts. No exponential growth.
    pub retry_delay: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            per_attempt_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}
