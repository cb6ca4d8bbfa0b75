#![allow(clippy::disallowed_methods)]

mod common;

use std::collections::HashSet;
use std::error::Error;

use chrono::{Duration, Utc};
use jobs_core::{Job, JobStatus, Priority, TenantId};
use serde_json::json;

use db::{DbError, repositories::JobFilter};

fn tenant_job(job_type: &str) -> Job {
    Job::new(TenantId::new("acme"), job_type, json!({"msg": job_type}))
}

#[tokio::test]
async fn create_and_get_round_trip_fields() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;

    let job = tenant_job("send_invoice")
        .with_priority(Priority::High)
        .with_max_attempts(5);
    let created = repo.create(&job).await?;
    assert_eq!(created.id, job.id);
    assert_eq!(created.status, JobStatus::Pending);

    let loaded = repo.get(job.id).await?;
    assert_eq!(loaded.tenant_id, TenantId::new("acme"));
    assert_eq!(loaded.job_type, "send_invoice");
    assert_eq!(loaded.payload, json!({"msg": "send_invoice"}));
    assert_eq!(loaded.priority, Priority::High);
    assert_eq!(loaded.max_attempts, 5);
    assert_eq!(loaded.attempts, 0);
    assert!(loaded.result.is_none());
    assert!(loaded.error.is_none());

    let missing = repo.get(jobs_core::JobId::new()).await;
    assert!(matches!(missing, Err(DbError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn claim_prefers_priority_then_age() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;

    let old_low = tenant_job("a").with_priority(Priority::Low);
    repo.create(&old_low).await?;
    let first_normal = tenant_job("b");
    repo.create(&first_normal).await?;
    let second_normal = tenant_job("c");
    repo.create(&second_normal).await?;
    let high = tenant_job("d").with_priority(Priority::High);
    repo.create(&high).await?;

    let order: Vec<_> = [
        repo.claim_next(8).await?,
        repo.claim_next(8).await?,
        repo.claim_next(8).await?,
        repo.claim_next(8).await?,
    ]
    .into_iter()
    .map(|job| job.map(|j| j.id))
    .collect();

    assert_eq!(
        order,
        vec![
            Some(high.id),
            Some(first_normal.id),
            Some(second_normal.id),
            Some(old_low.id)
        ]
    );
    assert!(repo.claim_next(8).await?.is_none());

    let claimed = repo.get(high.id).await?;
    assert_eq!(claimed.status, JobStatus::Processing);

    Ok(())
}

#[tokio::test]
async fn claim_on_empty_store_is_none() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;
    assert!(repo.claim_next(8).await?.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_hand_out_each_job_once() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;

    let mut ids = HashSet::new();
    for i in 0..5 {
        let job = tenant_job(&format!("job_{i}"));
        ids.insert(job.id);
        repo.create(&job).await?;
    }

    let claims = futures_util::future::join_all((0..5).map(|_| {
        let repo = repo.clone();
        async move { repo.claim_next(8).await }
    }))
    .await;

    let mut seen = HashSet::new();
    for claim in claims {
        // A lost race surfaces as a transaction conflict or as `None`, never as a duplicate.
        if let Ok(Some(job)) = claim {
            assert!(seen.insert(job.id), "job {} claimed twice", job.id);
        }
    }
    assert!(seen.is_subset(&ids));

    Ok(())
}

#[tokio::test]
async fn attempts_never_exceed_the_ceiling() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;

    let job = tenant_job("flaky").with_max_attempts(2);
    repo.create(&job).await?;

    // Not yet claimed: attempts only count against processing rows.
    assert!(matches!(
        repo.increment_attempts(job.id).await,
        Err(DbError::Conflict(_))
    ));

    repo.claim_next(1).await?;
    assert_eq!(repo.increment_attempts(job.id).await?.attempts, 1);
    assert_eq!(repo.increment_attempts(job.id).await?.attempts, 2);
    assert!(matches!(
        repo.increment_attempts(job.id).await,
        Err(DbError::AttemptsExhausted { max_attempts: 2, .. })
    ));
    assert_eq!(repo.get(job.id).await?.attempts, 2);

    Ok(())
}

#[tokio::test]
async fn terminal_rows_are_not_rewritten() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;

    let job = tenant_job("report");
    repo.create(&job).await?;
    repo.claim_next(1).await?;
    repo.increment_attempts(job.id).await?;

    let done = repo
        .update_status(job.id, JobStatus::Completed, Some(json!({"rows": 3})), None)
        .await?;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.result, Some(json!({"rows": 3})));

    let again = repo
        .update_status(job.id, JobStatus::Completed, Some(json!({"rows": 99})), None)
        .await?;
    assert_eq!(again.result, Some(json!({"rows": 3})));
    assert_eq!(again.attempts, 1);

    let failed = repo
        .update_status(job.id, JobStatus::Failed, None, Some("late".into()))
        .await?;
    assert_eq!(failed.status, JobStatus::Completed);
    assert!(failed.error.is_none());

    Ok(())
}

#[tokio::test]
async fn requeue_only_moves_processing_rows() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;

    let job = tenant_job("retry_me");
    repo.create(&job).await?;
    assert!(repo.requeue(job.id).await?.is_none());

    repo.claim_next(1).await?;
    repo.update_status(job.id, JobStatus::Processing, None, Some("boom".into()))
        .await?;

    let requeued = repo.requeue(job.id).await?.expect("processing row requeued");
    assert_eq!(requeued.status, JobStatus::Pending);
    assert_eq!(requeued.error.as_deref(), Some("boom"));

    assert!(repo.requeue(job.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn recover_abandoned_returns_processing_rows_to_pending() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;

    let stuck = tenant_job("stuck");
    repo.create(&stuck).await?;
    let waiting = tenant_job("waiting").with_priority(Priority::Low);
    repo.create(&waiting).await?;

    repo.claim_next(1).await?;
    repo.increment_attempts(stuck.id).await?;

    let recovered = repo.recover_abandoned().await?;
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].id, stuck.id);

    let reloaded = repo.get(stuck.id).await?;
    assert_eq!(reloaded.status, JobStatus::Pending);
    assert_eq!(reloaded.attempts, 1);

    Ok(())
}

#[tokio::test]
async fn recover_abandoned_fails_rows_without_attempts_left() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;

    let last_try = tenant_job("last_try").with_max_attempts(1);
    repo.create(&last_try).await?;
    repo.claim_next(1).await?;
    repo.increment_attempts(last_try.id).await?;

    let recovered = repo.recover_abandoned().await?;
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].status, JobStatus::Failed);

    let reloaded = repo.get(last_try.id).await?;
    assert_eq!(reloaded.status, JobStatus::Failed);
    assert_eq!(reloaded.attempts, 1);
    assert_eq!(reloaded.error.as_deref(), Some("exceeded 1 attempts"));
    assert!(repo.claim_next(4).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn unreadable_claims_are_failed_not_stranded() -> Result<(), Box<dyn Error>> {
    let (db_conn, repo) = common::setup_store().await?;
    common::plant_unreadable_job(&db_conn).await?;

    assert!(matches!(
        repo.claim_next(4).await,
        Err(DbError::Serialization(_))
    ));

    let stats = repo.stats().await?;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.processing, 0);
    assert!(repo.claim_next(4).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn equal_timestamps_keep_enqueue_order() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;
    let at = Utc::now();

    let mut ids = Vec::new();
    for _ in 0..20 {
        let mut job = tenant_job("batch");
        job.created_at = at;
        job.updated_at = at;
        repo.create(&job).await?;
        ids.push(job.id);
    }

    let mut claimed = Vec::new();
    while let Some(job) = repo.claim_next(4).await? {
        claimed.push(job.id);
    }
    assert_eq!(claimed, ids);

    Ok(())
}

#[tokio::test]
async fn list_stats_and_purge() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;

    let mut old_done = tenant_job("old");
    old_done.created_at = Utc::now() - Duration::days(40);
    old_done.status = JobStatus::Completed;
    old_done.result = Some(json!("ok"));
    repo.create(&old_done).await?;

    let mut old_failed = Job::new(TenantId::system(), "old_failed", json!({}));
    old_failed.created_at = Utc::now() - Duration::days(40);
    old_failed.status = JobStatus::Failed;
    old_failed.error = Some("boom".into());
    repo.create(&old_failed).await?;

    let mut old_pending = tenant_job("old_pending");
    old_pending.created_at = Utc::now() - Duration::days(40);
    repo.create(&old_pending).await?;

    let mut fresh_done = tenant_job("fresh");
    fresh_done.status = JobStatus::Completed;
    repo.create(&fresh_done).await?;

    let stats = repo.stats().await?;
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 1);

    let acme = repo
        .list(JobFilter {
            tenant_id: Some(TenantId::new("acme")),
            ..Default::default()
        })
        .await?;
    assert_eq!(acme.len(), 3);

    let failed = repo
        .list(JobFilter {
            status: Some(JobStatus::Failed),
            ..Default::default()
        })
        .await?;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, old_failed.id);

    let removed = repo
        .purge_finished_before(Utc::now() - Duration::days(30))
        .await?;
    assert_eq!(removed, 2);
    assert!(repo.get(old_pending.id).await.is_ok());
    assert!(repo.get(fresh_done.id).await.is_ok());
    assert!(matches!(
        repo.get(old_done.id).await,
        Err(DbError::NotFound(_))
    ));

    Ok(())
}
