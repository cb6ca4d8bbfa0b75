//! Core domain types for the background job system.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus and Priority for work items
//! - RetryPolicy for backoff between attempts
//! - WorkerState and QueueStats for queue-level state
//! - Events for in-process observers

mod events;
mod job;
mod queue;
mod retry;

pub use events::JobEvent;
pub use job::{DEFAULT_MAX_ATTEMPTS, Job, JobId, JobStatus, Priority, TenantId, ValidationError};
pub use queue::{QueueStats, WorkerState};
pub use retry::RetryPolicy;
