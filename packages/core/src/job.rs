//! Job domain types for deferred work items.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::{Generator, Ulid};

/// Default ceiling on execution attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Ids minted in the same millisecond still increase.
static ID_GENERATOR: Mutex<Generator> = Mutex::new(Generator::new());

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID, ordered after every ID this process
    /// created before it.
    pub fn new() -> Self {
        let id = ID_GENERATOR
            .lock()
            .ok()
            .and_then(|mut generator| generator.generate().ok());
        Self(id.unwrap_or_else(Ulid::new))
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning tenant of a job.
///
/// Maintenance work is owned by the reserved [`TenantId::SYSTEM`] tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Reserved tenant for system maintenance jobs.
    pub const SYSTEM: &'static str = "system";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The system sentinel tenant.
    pub fn system() -> Self {
        Self(Self::SYSTEM.to_string())
    }

    pub fn is_system(&self) -> bool {
        self.0 == Self::SYSTEM
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Priority level for job execution order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl Priority {
    /// Numeric rank used for ordering in the store; higher is claimed first.
    pub fn rank(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Current status of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting to be claimed.
    #[default]
    Pending,
    /// Job has been claimed and is executing or waiting out a retry backoff.
    Processing,
    /// Job completed successfully.
    Completed,
    /// Job exhausted its attempts or can never succeed.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Get a simple status string for display and queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected enqueue arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("job type must not be empty")]
    EmptyJobType,
    #[error("max attempts must be at least 1, got {0}")]
    MaxAttemptsTooLow(u32),
}

/// A job represents a unit of deferred work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Type of job (used for routing to handlers).
    pub job_type: String,
    /// Job payload passed verbatim to the handler.
    pub payload: serde_json::Value,
    /// Execution priority.
    pub priority: Priority,
    /// Current status.
    pub status: JobStatus,
    /// Number of attempts so far.
    #[serde(default)]
    pub attempts: u32,
    /// Ceiling on attempts before permanent failure.
    pub max_attempts: u32,
    /// Handler output, set on completion.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Last failure message.
    #[serde(default)]
    pub error: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(
        tenant_id: TenantId,
        job_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            tenant_id,
            job_type: job_type.into(),
            payload,
            priority: Priority::default(),
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the priority for this job.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the attempt ceiling for this job.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Check the arguments a job may be enqueued with.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.job_type.trim().is_empty() {
            return Err(ValidationError::EmptyJobType);
        }
        if self.max_attempts < 1 {
            return Err(ValidationError::MaxAttemptsTooLow(self.max_attempts));
        }
        Ok(())
    }

    /// Whether another attempt is allowed after a failure.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}
