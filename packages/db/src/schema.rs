//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// Idempotent; safe to run on every start.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
///
/// Payload, result and timestamps are left untyped; `priority_rank` and
/// `enqueued_seq` carry the numeric claim order.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMALESS;

DEFINE FIELD IF NOT EXISTS job_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS tenant_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS job_type ON job TYPE string;
DEFINE FIELD IF NOT EXISTS priority ON job TYPE string DEFAULT "normal";
DEFINE FIELD IF NOT EXISTS priority_rank ON job TYPE int DEFAULT 1;
DEFINE FIELD IF NOT EXISTS status ON job TYPE string DEFAULT "pending";
DEFINE FIELD IF NOT EXISTS attempts ON job TYPE int DEFAULT 0;
DEFINE FIELD IF NOT EXISTS max_attempts ON job TYPE int DEFAULT 3;
DEFINE FIELD IF NOT EXISTS enqueued_seq ON job TYPE int;

-- Claim order: pending rows by priority, then age
DEFINE INDEX IF NOT EXISTS job_claim_order ON job FIELDS status, priority_rank, enqueued_seq;
DEFINE INDEX IF NOT EXISTS job_status ON job FIELDS status;
DEFINE INDEX IF NOT EXISTS job_tenant ON job FIELDS tenant_id;
DEFINE INDEX IF NOT EXISTS job_type ON job FIELDS job_type;
"#;
