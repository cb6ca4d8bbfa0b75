//! In-process timers that enqueue recurring maintenance jobs.

use std::sync::Arc;
use std::time::Duration;

use jobs_core::{Priority, TenantId};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ProducerConfig;
use crate::maintenance::{COMPACT_TABLE, PURGE_LOGS, PurgePayload, REFRESH_STATISTICS, TablePayload};
use crate::service::JobQueueService;

/// One recurring enqueue.
#[derive(Debug, Clone)]
struct Schedule {
    job_type: &'static str,
    payload: serde_json::Value,
    first_run: Duration,
    period: Duration,
}

/// Running maintenance producers. Dropping the handle stops them.
///
/// Producers hold no state besides their timers; restarting the process
/// simply enqueues a fresh round.
pub struct Producers {
    handles: Vec<JoinHandle<()>>,
}

impl Producers {
    /// Start the purge producer and the per-table producers.
    ///
    /// The purge job is enqueued immediately. Table `i` of a per-table batch
    /// first runs at `table_start_delay + i * stagger` and then on the
    /// batch period.
    pub fn spawn(service: Arc<JobQueueService>, config: &ProducerConfig) -> Self {
        let handles = schedules(config)
            .into_iter()
            .map(|schedule| spawn_schedule(Arc::clone(&service), schedule, config.max_attempts))
            .collect::<Vec<_>>();

        tracing::info!("Started {} maintenance producers", handles.len());
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every producer timer.
    pub fn shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for Producers {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn schedules(config: &ProducerConfig) -> Vec<Schedule> {
    let mut schedules = vec![Schedule {
        job_type: PURGE_LOGS,
        payload: PurgePayload {
            retention_days: config.retention_days,
        }
        .to_value(),
        first_run: Duration::ZERO,
        period: config.purge_period(),
    }];

    let batches = [
        (REFRESH_STATISTICS, config.refresh_period()),
        (COMPACT_TABLE, config.compaction_period()),
    ];
    for (job_type, period) in batches {
        for (i, table) in config.tables.iter().enumerate() {
            schedules.push(Schedule {
                job_type,
                payload: TablePayload::new(table.as_str()).to_value(),
                first_run: config.table_start_delay() + config.stagger() * i as u32,
                period,
            });
        }
    }

    schedules
}

fn spawn_schedule(
    service: Arc<JobQueueService>,
    schedule: Schedule,
    max_attempts: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval_at(Instant::now() + schedule.first_run, schedule.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            match service
                .enqueue(
                    TenantId::system(),
                    schedule.job_type,
                    schedule.payload.clone(),
                    Priority::Low,
                    max_attempts,
                )
                .await
            {
                Ok(id) => tracing::info!(
                    "Scheduled {} job {} ({})",
                    schedule.job_type,
                    id,
                    schedule.payload
                ),
                Err(e) => tracing::warn!("Failed to schedule {} job: {}", schedule.job_type, e),
            }
        }
    })
}
