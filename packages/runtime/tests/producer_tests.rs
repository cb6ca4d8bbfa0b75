#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::time::Duration;

use db::repositories::JobFilter;
use jobs_core::{Job, Priority};
use jobs_runtime::maintenance::{COMPACT_TABLE, PURGE_LOGS, REFRESH_STATISTICS};
use jobs_runtime::{JobHandlerRegistry, ProducerConfig, Producers};
use serde_json::json;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

async fn jobs_of_type(
    queue: &common::TestQueue,
    job_type: &str,
) -> Result<Vec<Job>, Box<dyn Error>> {
    let jobs = queue
        .service
        .list_jobs(JobFilter {
            job_type: Some(job_type.to_string()),
            ..Default::default()
        })
        .await?;
    Ok(jobs)
}

#[tokio::test(start_paused = true)]
async fn purge_runs_at_once_and_tables_follow_staggered() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue(JobHandlerRegistry::new()).await?;
    let config = ProducerConfig {
        tables: vec!["audit_logs".into(), "evidence".into()],
        retention_days: 7,
        table_start_delay_ms: 100,
        stagger_ms: 200,
        ..Default::default()
    };

    let mut producers = Producers::spawn(queue.service.clone(), &config);
    assert_eq!(producers.len(), 5);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let purges = jobs_of_type(&queue, PURGE_LOGS).await?;
    assert_eq!(purges.len(), 1);
    assert_eq!(purges[0].payload, json!({"retention_days": 7}));
    assert!(purges[0].tenant_id.is_system());
    assert_eq!(purges[0].priority, Priority::Low);
    assert!(jobs_of_type(&queue, REFRESH_STATISTICS).await?.is_empty());

    // Only the first table is due after the start delay.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let refresh = jobs_of_type(&queue, REFRESH_STATISTICS).await?;
    assert_eq!(refresh.len(), 1);
    assert_eq!(refresh[0].payload, json!({"table": "audit_logs"}));

    tokio::time::sleep(Duration::from_millis(250)).await;
    let compaction = jobs_of_type(&queue, COMPACT_TABLE).await?;
    let mut tables: Vec<_> = compaction
        .iter()
        .map(|job| job.payload["table"].as_str().unwrap_or_default().to_string())
        .collect();
    tables.sort();
    assert_eq!(tables, vec!["audit_logs", "evidence"]);

    producers.shutdown();
    assert!(producers.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn producers_repeat_until_shut_down() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue(JobHandlerRegistry::new()).await?;
    let config = ProducerConfig {
        tables: Vec::new(),
        purge_period_ms: 50,
        refresh_period_ms: DAY_MS,
        ..Default::default()
    };

    let mut producers = Producers::spawn(queue.service.clone(), &config);
    tokio::time::sleep(Duration::from_millis(180)).await;
    producers.shutdown();

    // Ticks at 0, 50, 100 and 150 ms.
    assert_eq!(jobs_of_type(&queue, PURGE_LOGS).await?.len(), 4);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(jobs_of_type(&queue, PURGE_LOGS).await?.len(), 4);
    Ok(())
}
