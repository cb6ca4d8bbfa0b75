//! Execution of a single claimed job.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use db::DbError;
use jobs_core::{Job, JobEvent, JobId, JobStatus, RetryPolicy};

use crate::error::QueueError;
use crate::service::JobQueueService;

/// How one execution of a claimed job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The handler succeeded; the job is `completed`.
    Completed { attempts: u32 },
    /// The handler failed with attempts left; a re-queue is scheduled.
    RetryScheduled { attempts: u32, delay: Duration },
    /// The job is `failed` and will not run again.
    Failed { attempts: u32, error: String },
}

/// Run one attempt of a claimed job and record its result.
///
/// The attempt is counted before the handler runs. A retry re-queue is
/// scheduled as a detached task so this returns without waiting for the
/// backoff.
pub async fn process_job(
    service: &Arc<JobQueueService>,
    job: Job,
    retry: RetryPolicy,
) -> Result<JobOutcome, QueueError> {
    let started = Instant::now();
    let job = match service.increment_attempts(job.id).await {
        Ok(job) => job,
        // The previous attempt died before it could record a result.
        Err(QueueError::Store(DbError::AttemptsExhausted { max_attempts, .. })) => {
            let error = match &job.error {
                Some(last) => format!("exceeded {} attempts: {}", max_attempts, last),
                None => format!("exceeded {} attempts", max_attempts),
            };
            return fail_permanently(service, &job, error).await;
        }
        Err(e) => return Err(e),
    };
    let attempts = job.attempts;

    tracing::debug!(
        "Running job {} ({}) attempt {}/{}",
        job.id,
        job.job_type,
        attempts,
        job.max_attempts
    );

    match service.execute_job(&job).await {
        Ok(output) => {
            service
                .update_status(job.id, JobStatus::Completed, Some(output), None)
                .await?;

            service.broadcast(JobEvent::JobCompleted {
                job_id: job.id,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });

            tracing::info!("Job {} ({}) completed", job.id, job.job_type);
            Ok(JobOutcome::Completed { attempts })
        }

        // Retrying cannot make a handler appear.
        Err(err @ QueueError::UnregisteredJobType(_)) => {
            let error = err.failure_message();
            fail_permanently(service, &job, error).await
        }

        Err(err) => {
            let message = err.failure_message();

            if !job.has_attempts_left() {
                let error = format!("failed after {} attempts: {}", attempts, message);
                return fail_permanently(service, &job, error).await;
            }

            // Keep the error visible while the job waits out its backoff.
            service
                .update_status(job.id, JobStatus::Processing, None, Some(message.clone()))
                .await?;

            let delay = retry.delay_for(attempts);
            service.broadcast(JobEvent::JobFailed {
                job_id: job.id,
                error: message.clone(),
                attempts,
                will_retry: true,
                timestamp: Utc::now(),
            });

            tracing::warn!(
                "Job {} ({}) attempt {}/{} failed: {}; retrying in {:?}",
                job.id,
                job.job_type,
                attempts,
                job.max_attempts,
                message,
                delay
            );

            schedule_retry(Arc::clone(service), job.id, delay);
            Ok(JobOutcome::RetryScheduled { attempts, delay })
        }
    }
}

async fn fail_permanently(
    service: &Arc<JobQueueService>,
    job: &Job,
    error: String,
) -> Result<JobOutcome, QueueError> {
    service
        .update_status(job.id, JobStatus::Failed, None, Some(error.clone()))
        .await?;

    service.broadcast(JobEvent::JobFailed {
        job_id: job.id,
        error: error.clone(),
        attempts: job.attempts,
        will_retry: false,
        timestamp: Utc::now(),
    });

    tracing::error!("Job {} ({}) failed: {}", job.id, job.job_type, error);
    Ok(JobOutcome::Failed {
        attempts: job.attempts,
        error,
    })
}

/// Re-admit `id` once `delay` has elapsed.
///
/// Until then the row stays `processing`; if the process dies first,
/// startup recovery re-admits it.
pub fn schedule_retry(
    service: Arc<JobQueueService>,
    id: JobId,
    delay: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match service.retry_job(id).await {
            Ok(true) => tracing::debug!("Job {} re-queued", id),
            Ok(false) => tracing::debug!("Job {} was not waiting on a retry", id),
            Err(e) => tracing::warn!("Failed to re-queue job {}: {}", id, e),
        }
    })
}
