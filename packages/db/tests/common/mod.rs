#![allow(dead_code)]

use db::{Database, DbConfig, DbError, repositories::JobRepository};

/// A fresh in-memory store per test; `mem://` connections never share data.
pub async fn setup_repo() -> Result<JobRepository, DbError> {
    Ok(setup_store().await?.1)
}

/// Like [`setup_repo`], also handing back the raw connection.
pub async fn setup_store() -> Result<(Database, JobRepository), DbError> {
    let db_conn = db::init(&DbConfig::memory()).await?;
    Ok((db_conn.clone(), JobRepository::new(db_conn)))
}

/// Insert a pending row whose id is not a ULID.
pub async fn plant_unreadable_job(db_conn: &Database) -> Result<(), DbError> {
    let now = chrono::Utc::now();
    db_conn
        .query("CREATE type::thing('job', $id) CONTENT $row")
        .bind(("id", "not-a-ulid"))
        .bind((
            "row",
            serde_json::json!({
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
