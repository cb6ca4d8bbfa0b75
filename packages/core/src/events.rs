//! Event types for in-process observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId, WorkerState};

/// Events emitted by the job system. Stored job fields remain authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new job was enqueued.
    JobEnqueued { job: Job, timestamp: DateTime<Utc> },
    /// A job was claimed and an attempt started.
    JobStarted {
        job_id: JobId,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: JobId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// An attempt failed.
    JobFailed {
        job_id: JobId,
        error: String,
        attempts: u32,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    /// A job was re-admitted after its backoff.
    JobRetrying {
        job_id: JobId,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    /// A worker moved between lifecycle states.
    WorkerStateChanged {
        old_state: WorkerState,
        new_state: WorkerState,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobEnqueued { timestamp, .. } => *timestamp,
            JobEvent::JobStarted { timestamp, .. } => *timestamp,
            JobEvent::JobCompleted { timestamp, .. } => *timestamp,
            JobEvent::JobFailed { timestamp, .. } => *timestamp,
            JobEvent::JobRetrying { timestamp, .. } => *timestamp,
            JobEvent::WorkerStateChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobEnqueued { job, .. } => Some(job.id),
            JobEvent::JobStarted { job_id, .. } => Some(*job_id),
            JobEvent::JobCompleted { job_id, .. } => Some(*job_id),
            JobEvent::JobFailed { job_id, .. } => Some(*job_id),
            JobEvent::JobRetrying { job_id, .. } => Some(*job_id),
            JobEvent::WorkerStateChanged { .. } => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobEnqueued { job, .. } => {
                format!("Job {} ({}) enqueued for {}", job.id, job.job_type, job.tenant_id)
            }
            JobEvent::JobStarted {
                job_id, attempt, ..
            } => format!("Job {} started (attempt {})", job_id, attempt),
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            JobEvent::JobFailed {
                job_id,
                error,
                will_retry,
                ..
            } => {
                let retry = if *will_retry { " (will retry)" } else { "" };
                format!("Job {} failed: {}{}", job_id, error, retry)
            }
            JobEvent::JobRetrying {
                job_id, attempt, ..
            } => format!("Job {} retrying (attempt {})", job_id, attempt),
            JobEvent::WorkerStateChanged {
                old_state,
                new_state,
                ..
            } => format!("Worker {} -> {}", old_state, new_state),
        }
    }
}
