//! Worker and producer configuration.

use std::time::Duration;

use jobs_core::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Configuration for the polling worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Time between poll ticks.
    pub poll_interval_ms: u64,
    /// Longest `stop()` waits for in-flight jobs.
    pub drain_timeout_ms: u64,
    /// How often `stop()` re-checks the in-flight set.
    pub drain_check_interval_ms: u64,
    /// Minimum time between two logged store errors.
    pub error_log_window_ms: u64,
    /// Pending rows read per claim attempt.
    pub claim_candidates: usize,
    /// Backoff between failed attempts.
    pub retry: RetryPolicy,
    /// Store error fragments that halt polling instead of retrying.
    pub fatal_error_signatures: Vec<String>,
    /// Settle jobs left `processing` when the worker is spawned. Only safe
    /// while no other worker uses the same store.
    pub recover_on_spawn: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            drain_timeout_ms: 30_000,
            drain_check_interval_ms: 1_000,
            error_log_window_ms: 60_000,
            claim_candidates: 8,
            retry: RetryPolicy::default(),
            fatal_error_signatures: vec![
                "billing".to_string(),
                "suspended".to_string(),
                "payment required".to_string(),
                "quota exceeded".to_string(),
            ],
            recover_on_spawn: true,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn drain_check_interval(&self) -> Duration {
        Duration::from_millis(self.drain_check_interval_ms.max(1))
    }

    pub fn error_log_window(&self) -> Duration {
        Duration::from_millis(self.error_log_window_ms)
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the drain window and how often it is checked.
    pub fn with_drain(mut self, timeout: Duration, check_interval: Duration) -> Self {
        self.drain_timeout_ms = timeout.as_millis() as u64;
        self.drain_check_interval_ms = check_interval.as_millis() as u64;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Configuration for the recurring maintenance producers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Period of the purge job; the first one is enqueued at spawn.
    pub purge_period_ms: u64,
    /// Retention passed to the purge job.
    pub retention_days: u32,
    /// Tables that get per-table maintenance.
    pub tables: Vec<String>,
    /// Offset between consecutive tables within one batch.
    pub stagger_ms: u64,
    /// Delay before the first per-table batch.
    pub table_start_delay_ms: u64,
    /// Period of the statistics refresh batch.
    pub refresh_period_ms: u64,
    /// Period of the compaction batch.
    pub compaction_period_ms: u64,
    /// Attempt ceiling for produced jobs.
    pub max_attempts: u32,
}

const HOUR_MS: u64 = 60 * 60 * 1_000;

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            purge_period_ms: 24 * HOUR_MS,
            retention_days: 30,
            tables: vec![
                "audit_logs".to_string(),
                "assessments".to_string(),
                "responses".to_string(),
                "evidence".to_string(),
            ],
            stagger_ms: 5_000,
            table_start_delay_ms: 10_000,
            refresh_period_ms: 24 * HOUR_MS,
            compaction_period_ms: 7 * 24 * HOUR_MS,
            max_attempts: jobs_core::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ProducerConfig {
    pub fn purge_period(&self) -> Duration {
        Duration::from_millis(self.purge_period_ms.max(1))
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn table_start_delay(&self) -> Duration {
        Duration::from_millis(self.table_start_delay_ms)
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_period_ms.max(1))
    }

    pub fn compaction_period(&self) -> Duration {
        Duration::from_millis(self.compaction_period_ms.max(1))
    }
}
