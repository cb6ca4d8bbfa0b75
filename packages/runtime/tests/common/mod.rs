#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use db::repositories::JobRepository;
use db::{Database, DbConfig};
use jobs_core::{Job, JobId, JobStatus, RetryPolicy};
use jobs_runtime::{JobHandlerRegistry, JobQueueService, QueueError, WorkerConfig};
use serde_json::json;

pub struct TestQueue {
    pub db: Database,
    pub service: Arc<JobQueueService>,
}

/// A queue service over its own in-memory store.
pub async fn setup_queue(handlers: JobHandlerRegistry) -> Result<TestQueue, QueueError> {
    let db = db::init(&DbConfig::memory()).await?;
    let (event_tx, _) = tokio::sync::broadcast::channel(256);
    let service = JobQueueService::new(JobRepository::new(db.clone()), handlers)
        .with_event_tx(event_tx);
    Ok(TestQueue {
        db,
        service: Arc::new(service),
    })
}

/// Millisecond-scale timings so lifecycle tests finish quickly.
pub fn fast_config() -> WorkerConfig {
    WorkerConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_drain(Duration::from_secs(5), Duration::from_millis(10))
        .with_retry(RetryPolicy::new(
            Duration::from_millis(1),
            Duration::from_millis(4),
        ))
}

/// Poll the store until `id` reaches `status`.
pub async fn wait_for_status(
    service: &JobQueueService,
    id: JobId,
    status: JobStatus,
    timeout: Duration,
) -> Job {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = service.get_job(id).await.expect("job readable");
        if job.status == status {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} stuck in {} (wanted {}), attempts {}",
            id,
            job.status,
            status,
            job.attempts
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Plant a pending critical row whose id cannot be parsed, so the next
/// claim errors.
pub async fn plant_unreadable_job(db: &Database) -> Result<(), db::DbError> {
    let now = chrono::Utc::now();
    db.query("CREATE type::thing('job', $id) CONTENT $row")
        .bind(("id", "not-a-ulid"))
        .bind((
            "row",
            json!({
                "job_id": "not-a-ulid",
                "tenant_id": "acme",
                "job_type": "echo",
                "payload": {},
                "priority": "critical",
                "priority_rank": 3,
                "status": "pending",
                "attempts": 0,
                "max_attempts": 3,
                "enqueued_seq": 0,
                "created_at": now,
                "updated_at": now,
            }),
        ))
        .await?
        .check()?;
    Ok(())
}
