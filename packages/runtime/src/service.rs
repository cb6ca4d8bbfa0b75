//! Job queue service: the only writer of job rows.

use chrono::Utc;
use db::DbError;
use db::repositories::{JobFilter, JobRepository};
use jobs_core::{Job, JobEvent, JobId, JobStatus, Priority, QueueStats, TenantId};
use tokio::sync::{Mutex, broadcast};

use crate::error::QueueError;
use crate::handler::{JobContext, JobHandlerRegistry};

/// Owns the job state machine and the handler registry.
pub struct JobQueueService {
    repo: JobRepository,
    handlers: JobHandlerRegistry,
    /// Serializes claims made from this process.
    claim_lock: Mutex<()>,
    claim_candidates: usize,
    event_tx: Option<broadcast::Sender<JobEvent>>,
}

impl JobQueueService {
    pub fn new(repo: JobRepository, handlers: JobHandlerRegistry) -> Self {
        Self {
            repo,
            handlers,
            claim_lock: Mutex::new(()),
            claim_candidates: 8,
            event_tx: None,
        }
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Set how many pending rows a claim looks at.
    pub fn with_claim_candidates(mut self, candidates: usize) -> Self {
        self.claim_candidates = candidates.max(1);
        self
    }

    /// Subscribe to job events, if a broadcaster is configured.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<JobEvent>> {
        self.event_tx.as_ref().map(|tx| tx.subscribe())
    }

    pub(crate) fn broadcast(&self, event: JobEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Store access for application handlers (e.g. retention purges).
    pub fn repository(&self) -> &JobRepository {
        &self.repo
    }

    /// Insert a new pending job.
    pub async fn enqueue(
        &self,
        tenant_id: TenantId,
        job_type: impl Into<String>,
        payload: serde_json::Value,
        priority: Priority,
        max_attempts: u32,
    ) -> Result<JobId, QueueError> {
        let job = Job::new(tenant_id, job_type, payload)
            .with_priority(priority)
            .with_max_attempts(max_attempts);
        self.enqueue_job(job).await
    }

    /// Insert a prepared job. Status and bookkeeping fields are reset.
    pub async fn enqueue_job(&self, mut job: Job) -> Result<JobId, QueueError> {
        job.validate()?;

        let now = Utc::now();
        job.status = JobStatus::Pending;
        job.attempts = 0;
        job.result = None;
        job.error = None;
        job.created_at = now;
        job.updated_at = now;

        let job = self.repo.create(&job).await?;
        tracing::debug!(
            "Enqueued job {} ({}) for tenant {}",
            job.id,
            job.job_type,
            job.tenant_id
        );

        let id = job.id;
        self.broadcast(JobEvent::JobEnqueued {
            job,
            timestamp: now,
        });

        Ok(id)
    }

    /// Claim the highest-priority, oldest pending job.
    ///
    /// `Ok(None)` means the queue is empty.
    pub async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        let _guard = self.claim_lock.lock().await;
        Ok(self.repo.claim_next(self.claim_candidates).await?)
    }

    /// Count an attempt against a claimed job before its handler runs.
    pub async fn increment_attempts(&self, id: JobId) -> Result<Job, QueueError> {
        let job = self.repo.increment_attempts(id).await.map_err(not_found(id))?;

        self.broadcast(JobEvent::JobStarted {
            job_id: id,
            attempt: job.attempts,
            timestamp: job.updated_at,
        });

        Ok(job)
    }

    /// Run the registered handler for `job`.
    ///
    /// A missing registration is [`QueueError::UnregisteredJobType`]; a
    /// handler error or panic is [`QueueError::Handler`].
    pub async fn execute_job(&self, job: &Job) -> Result<serde_json::Value, QueueError> {
        let handler = self
            .handlers
            .get(&job.job_type)
            .ok_or_else(|| QueueError::UnregisteredJobType(job.job_type.clone()))?;

        let future = handler.handle(JobContext::from_job(job));
        match tokio::spawn(future).await {
            Ok(result) => result.map_err(QueueError::Handler),
            Err(join_err) => Err(QueueError::Handler(format!("handler panicked: {}", join_err))),
        }
    }

    /// Write a status with its result and error.
    ///
    /// `Pending` re-queues; terminal rows are left as they are.
    pub async fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<Job, QueueError> {
        self.repo
            .update_status(id, status, result, error)
            .await
            .map_err(not_found(id))
    }

    /// Re-admit a job whose backoff has elapsed.
    ///
    /// Returns `false` when the job was not waiting on a retry, so a
    /// duplicate call for the same retry changes nothing.
    pub async fn retry_job(&self, id: JobId) -> Result<bool, QueueError> {
        match self.repo.requeue(id).await? {
            Some(job) => {
                self.broadcast(JobEvent::JobRetrying {
                    job_id: id,
                    attempt: job.attempts + 1,
                    timestamp: job.updated_at,
                });
                Ok(true)
            }
            None => {
                // Distinguish "already re-admitted" from "no such job".
                self.repo.get(id).await.map_err(not_found(id))?;
                Ok(false)
            }
        }
    }

    /// Hand a claimed job back to the queue after its attempt could not be
    /// recorded. The next claim runs it again, or fails it once its attempts
    /// are spent. Returns `false` if the job was no longer `processing`.
    pub async fn release(&self, id: JobId) -> Result<bool, QueueError> {
        Ok(self.repo.requeue(id).await?.is_some())
    }

    /// Job types with a registered handler, sorted.
    pub fn registered_handlers(&self) -> Vec<String> {
        self.handlers.job_types()
    }

    pub fn has_handler(&self, job_type: &str) -> bool {
        self.handlers.has_handler(job_type)
    }

    pub async fn get_job(&self, id: JobId) -> Result<Job, QueueError> {
        self.repo.get(id).await.map_err(not_found(id))
    }

    pub async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, QueueError> {
        Ok(self.repo.list(filter).await?)
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        Ok(self.repo.stats().await?)
    }

    /// Settle jobs a dead process left in `processing`: re-queue those with
    /// attempts left, fail the rest.
    pub async fn recover_abandoned(&self) -> Result<usize, QueueError> {
        let recovered = self.repo.recover_abandoned().await?;
        for job in &recovered {
            tracing::warn!(
                "Recovered abandoned job {} ({}) as {} after {}/{} attempts",
                job.id,
                job.job_type,
                job.status,
                job.attempts,
                job.max_attempts
            );
        }
        Ok(recovered.len())
    }
}

fn not_found(id: JobId) -> impl Fn(DbError) -> QueueError {
    move |err| match err {
        DbError::NotFound(_) => QueueError::NotFound(id),
        other => QueueError::Store(other),
    }
}
