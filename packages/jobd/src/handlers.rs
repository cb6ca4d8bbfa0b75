//! Handlers for the built-in maintenance jobs.

use chrono::Utc;
use db::repositories::JobRepository;
use jobs_runtime::maintenance::{COMPACT_TABLE, PURGE_LOGS, PurgePayload, REFRESH_STATISTICS, TablePayload};
use jobs_runtime::{JobContext, JobHandlerRegistry};
use serde_json::json;

/// Register the maintenance handlers. Purging works on `repo`.
pub fn register_maintenance(handlers: &mut JobHandlerRegistry, repo: JobRepository) {
    handlers.register_fn(PURGE_LOGS, move |ctx: JobContext| {
        let repo = repo.clone();
        async move {
            let payload = PurgePayload::from_value(&ctx.payload)?;
            let cutoff = Utc::now() - chrono::Duration::days(i64::from(payload.retention_days));
            let removed = repo
                .purge_finished_before(cutoff)
                .await
                .map_err(|e| e.to_string())?;
            tracing::info!("Purged {} finished jobs older than {}", removed, cutoff);
            Ok(json!({ "removed": removed, "cutoff": cutoff }))
        }
    });

    handlers.register_fn(REFRESH_STATISTICS, |ctx: JobContext| async move {
        let payload = TablePayload::from_value(&ctx.payload)?;
        tracing::info!("Refreshing statistics for {}", payload.table);
        Ok(json!({ "table": payload.table }))
    });

    handlers.register_fn(COMPACT_TABLE, |ctx: JobContext| async move {
        let payload = TablePayload::from_value(&ctx.payload)?;
        tracing::info!("Compacting {}", payload.table);
        Ok(json!({ "table": payload.table }))
    });
}
