//! Error taxonomy for the queue service and worker.

use db::DbError;
use jobs_core::{JobId, ValidationError};
use thiserror::Error;

/// Errors raised by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Bad enqueue arguments; nothing was written.
    #[error("Invalid job: {0}")]
    Validation(#[from] ValidationError),

    /// No handler is registered for the job's type.
    #[error("Unregistered job type: {0}")]
    UnregisteredJobType(String),

    /// The handler ran and reported a failure.
    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Store error: {0}")]
    Store(#[from] DbError),

    #[error("Worker error: {0}")]
    Worker(String),
}

/// How the polling loop reacts to a failed claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retry silently on the next tick.
    Transient,
    /// Stop polling until someone intervenes.
    Fatal,
}

impl QueueError {
    /// Classify a polling failure.
    ///
    /// Store errors whose message contains one of `fatal_signatures`
    /// (case-insensitive) are fatal; so are worker errors, which mean the
    /// loop itself is gone. Everything else is transient.
    pub fn classify(&self, fatal_signatures: &[String]) -> FailureClass {
        match self {
            QueueError::Worker(_) => FailureClass::Fatal,
            QueueError::Store(err) => {
                let message = err.to_string().to_lowercase();
                if fatal_signatures
                    .iter()
                    .any(|sig| !sig.is_empty() && message.contains(&sig.to_lowercase()))
                {
                    FailureClass::Fatal
                } else {
                    FailureClass::Transient
                }
            }
            _ => FailureClass::Transient,
        }
    }

    /// The message a handler failure should be recorded with.
    pub fn failure_message(&self) -> String {
        match self {
            QueueError::Handler(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
