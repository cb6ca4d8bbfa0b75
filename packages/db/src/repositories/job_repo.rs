//! Job record store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use jobs_core::{Job, JobId, JobStatus, Priority, QueueStats, TenantId};
use serde::{Deserialize, Serialize};

use crate::{Database, DbError};

/// Repository for job persistence operations.
///
/// Every mutation is a single conditional `UPDATE` so that concurrent
/// callers observe each row transition at most once.
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
}

/// Row layout in the `job` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRow {
    job_id: String,
    tenant_id: String,
    job_type: String,
    #[serde(default)]
    payload: serde_json::Value,
    priority: Priority,
    priority_rank: u8,
    status: JobStatus,
    attempts: u32,
    max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    enqueued_seq: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            tenant_id: job.tenant_id.to_string(),
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            priority: job.priority,
            priority_rank: job.priority.rank(),
            status: job.status,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            result: job.result.clone(),
            error: job.error.clone(),
            enqueued_seq: job.created_at.timestamp_micros(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }

    fn into_job(self) -> Result<Job, DbError> {
        let id = JobId::parse(&self.job_id)
            .map_err(|e| DbError::Serialization(format!("bad job id {}: {}", self.job_id, e)))?;
        Ok(Job {
            id,
            tenant_id: TenantId::new(self.tenant_id),
            job_type: self.job_type,
            payload: self.payload,
            priority: self.priority,
            status: self.status,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            result: self.result,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Filter options for listing jobs.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub tenant_id: Option<TenantId>,
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
    pub limit: Option<usize>,
}

fn first_job(rows: Vec<JobRow>) -> Result<Option<Job>, DbError> {
    rows.into_iter().next().map(JobRow::into_job).transpose()
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new job in the database.
    pub async fn create(&self, job: &Job) -> Result<Job, DbError> {
        let record: Option<JobRow> = self
            .db
            .create(("job", job.id.to_string()))
            .content(JobRow::from_job(job))
            .await?;

        record
            .map(JobRow::into_job)
            .transpose()?
            .ok_or_else(|| DbError::Query("Failed to create job".into()))
    }

    /// Get a job by ID.
    pub async fn get(&self, id: JobId) -> Result<Job, DbError> {
        let record: Option<JobRow> = self.db.select(("job", id.to_string())).await?;

        record
            .map(JobRow::into_job)
            .transpose()?
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))
    }

    /// List jobs with optional filtering, in claim order.
    pub async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, DbError> {
        let mut conditions = Vec::new();
        let mut bindings: Vec<(&'static str, String)> = Vec::new();

        if let Some(tenant_id) = &filter.tenant_id {
            conditions.push("tenant_id = $tenant_id");
            bindings.push(("tenant_id", tenant_id.to_string()));
        }

        if let Some(status) = &filter.status {
            conditions.push("status = $status");
            bindings.push(("status", status.as_str().to_string()));
        }

        if let Some(job_type) = &filter.job_type {
            conditions.push("job_type = $job_type");
            bindings.push(("job_type", job_type.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit_clause = filter
            .limit
            .map(|l| format!("LIMIT {}", l))
            .unwrap_or_default();

        let query = format!(
            "SELECT * FROM job {} ORDER BY priority_rank DESC, enqueued_seq ASC, job_id ASC {}",
            where_clause, limit_clause
        );

        let mut request = self.db.query(query);
        for binding in bindings {
            request = request.bind(binding);
        }

        let mut response = request.await?;
        let rows: Vec<JobRow> = response.take(0)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Claim the next pending job.
    ///
    /// Reads up to `candidates` pending rows in claim order and flips the
    /// first one still pending to `processing`. A row another claimer got to
    /// first fails the status condition and is skipped.
    pub async fn claim_next(&self, candidates: usize) -> Result<Option<Job>, DbError> {
        let mut response = self
            .db
            .query(
                r#"
                SELECT job_id, priority_rank, enqueued_seq FROM job
                WHERE status = "pending"
                ORDER BY priority_rank DESC, enqueued_seq ASC, job_id ASC
                LIMIT $limit
                "#,
            )
            .bind(("limit", candidates.max(1) as i64))
            .await?;

        #[derive(Deserialize)]
        struct Candidate {
            job_id: String,
        }

        let pending: Vec<Candidate> = response.take(0)?;

        for candidate in pending {
            let mut claimed = self
                .db
                .query(
                    r#"
                    UPDATE type::thing('job', $id)
                    SET status = "processing", updated_at = $now
                    WHERE status = "pending"
                    RETURN AFTER
                    "#,
                )
                .bind(("id", candidate.job_id.clone()))
                .bind(("now", Utc::now()))
                .await?;

            let row: Result<Option<Job>, DbError> = claimed
                .take::<Vec<JobRow>>(0)
                .map_err(DbError::from)
                .and_then(first_job);
            match row {
                Ok(Some(job)) => return Ok(Some(job)),
                Ok(None) => {}
                Err(e) => {
                    self.fail_unreadable(&candidate.job_id, &e).await?;
                    return Err(e);
                }
            }

            tracing::debug!("Job {} claimed elsewhere, trying next", candidate.job_id);
        }

        Ok(None)
    }

    /// Park a claimed row that cannot be decoded so it is not claimed again.
    async fn fail_unreadable(&self, raw_id: &str, err: &DbError) -> Result<(), DbError> {
        tracing::error!("Job {} is unreadable, marking it failed: {}", raw_id, err);
        self.db
            .query(
                r#"
                UPDATE type::thing('job', $id)
                SET status = "failed", error = $error, updated_at = $now
                WHERE status = "processing"
                "#,
            )
            .bind(("id", raw_id.to_string()))
            .bind(("error", format!("unreadable job row: {}", err)))
            .bind(("now", Utc::now()))
            .await?
            .check()?;
        Ok(())
    }

    /// Count one more attempt against a claimed job.
    pub async fn increment_attempts(&self, id: JobId) -> Result<Job, DbError> {
        let mut response = self
            .db
            .query(
                r#"
                UPDATE type::thing('job', $id)
                SET attempts += 1, updated_at = $now
                WHERE status = "processing" AND attempts < max_attempts
                RETURN AFTER
                "#,
            )
            .bind(("id", id.to_string()))
            .bind(("now", Utc::now()))
            .await?;

        let rows: Vec<JobRow> = response.take(0)?;
        match first_job(rows)? {
            Some(job) => Ok(job),
            None => {
                let current = self.get(id).await?;
                if current.status == JobStatus::Processing && !current.has_attempts_left() {
                    return Err(DbError::AttemptsExhausted {
                        id: id.to_string(),
                        max_attempts: current.max_attempts,
                    });
                }
                Err(DbError::Conflict(format!(
                    "cannot count an attempt for job {} ({}, {}/{} attempts)",
                    id, current.status, current.attempts, current.max_attempts
                )))
            }
        }
    }

    /// Write a status with its result and error fields.
    ///
    /// Terminal rows are never rewritten; the stored row is returned as is.
    pub async fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<Job, DbError> {
        let mut response = self
            .db
            .query(
                r#"
                UPDATE type::thing('job', $id)
                SET status = $status, result = $result, error = $error, updated_at = $now
                WHERE status != "completed" AND status != "failed"
                RETURN AFTER
                "#,
            )
            .bind(("id", id.to_string()))
            .bind(("status", status))
            .bind(("result", result))
            .bind(("error", error))
            .bind(("now", Utc::now()))
            .await?;

        let rows: Vec<JobRow> = response.take(0)?;
        match first_job(rows)? {
            Some(job) => Ok(job),
            None => {
                let current = self.get(id).await?;
                tracing::debug!(
                    "Job {} already {}, ignoring write of {}",
                    id,
                    current.status,
                    status
                );
                Ok(current)
            }
        }
    }

    /// Return a `processing` job to `pending`.
    ///
    /// Returns `None` when the job is not `processing`, which makes repeated
    /// calls for the same retry harmless.
    pub async fn requeue(&self, id: JobId) -> Result<Option<Job>, DbError> {
        let mut response = self
            .db
            .query(
                r#"
                UPDATE type::thing('job', $id)
                SET status = "pending", updated_at = $now
                WHERE status = "processing"
                RETURN AFTER
                "#,
            )
            .bind(("id", id.to_string()))
            .bind(("now", Utc::now()))
            .await?;

        let rows: Vec<JobRow> = response.take(0)?;
        first_job(rows)
    }

    /// Settle every `processing` row left by a dead process.
    ///
    /// Rows with attempts left go back to `pending`; rows whose last attempt
    /// was interrupted become `failed`. Only valid when no worker is running
    /// against this store.
    pub async fn recover_abandoned(&self) -> Result<Vec<Job>, DbError> {
        let mut response = self
            .db
            .query(
                r#"
                UPDATE job
                SET status = "failed",
                    error = string::concat("exceeded ", <string> max_attempts, " attempts"),
                    updated_at = $now
                WHERE status = "processing" AND attempts >= max_attempts
                RETURN AFTER;

                UPDATE job
                SET status = "pending", updated_at = $now
                WHERE status = "processing"
                RETURN AFTER;
                "#,
            )
            .bind(("now", Utc::now()))
            .await?;

        let failed: Vec<JobRow> = response.take(0)?;
        let requeued: Vec<JobRow> = response.take(1)?;
        failed
            .into_iter()
            .chain(requeued)
            .map(JobRow::into_job)
            .collect()
    }

    /// Delete terminal jobs enqueued before `cutoff`. Returns the number removed.
    pub async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let mut response = self
            .db
            .query(
                r#"
                DELETE job
                WHERE (status = "completed" OR status = "failed") AND enqueued_seq < $cutoff
                RETURN BEFORE
                "#,
            )
            .bind(("cutoff", cutoff.timestamp_micros()))
            .await?;

        #[derive(Deserialize)]
        struct Removed {
            #[allow(dead_code)]
            job_id: String,
        }

        let removed: Vec<Removed> = response.take(0)?;
        Ok(removed.len())
    }

    /// Count jobs by status.
    pub async fn count_by_status(&self) -> Result<HashMap<String, u64>, DbError> {
        let mut response = self
            .db
            .query("SELECT status, count() AS count FROM job GROUP BY status")
            .await?;

        #[derive(Deserialize)]
        struct StatusCount {
            status: Option<String>,
            count: i64,
        }

        let counts: Vec<StatusCount> = response.take(0)?;

        let mut map = HashMap::new();
        for count in counts {
            if let Some(status) = count.status {
                map.insert(status, count.count as u64);
            }
        }

        Ok(map)
    }

    /// Get queue statistics from job counts.
    pub async fn stats(&self) -> Result<QueueStats, DbError> {
        let counts = self.count_by_status().await?;
        let get = |status: JobStatus| counts.get(status.as_str()).copied().unwrap_or(0);

        Ok(QueueStats {
            pending: get(JobStatus::Pending),
            processing: get(JobStatus::Processing),
            completed: get(JobStatus::Completed),
            failed: get(JobStatus::Failed),
        })
    }
}
