//! `jobd`: runs the job worker and maintenance producers against one store.

mod handlers;
mod settings;

use std::sync::Arc;

use db::repositories::JobRepository;
use jobs_runtime::{JobHandlerRegistry, JobQueueService, Producers, Worker};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let settings = Settings::from_env()?;
    tracing::info!("Opening job store at {}", settings.db.endpoint);
    let db = db::init(&settings.db).await?;
    let repo = JobRepository::new(db);

    let mut handlers = JobHandlerRegistry::new();
    handlers::register_maintenance(&mut handlers, repo.clone());

    let (event_tx, mut events) = tokio::sync::broadcast::channel(1024);
    let service = Arc::new(
        JobQueueService::new(repo, handlers)
            .with_event_tx(event_tx)
            .with_claim_candidates(settings.worker.claim_candidates),
    );

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let at = event.timestamp().format("%H:%M:%S%.3f");
                    match event.job_id() {
                        Some(job_id) => {
                            tracing::debug!(job = %job_id, "{} {}", at, event.description())
                        }
                        None => tracing::debug!("{} {}", at, event.description()),
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!("Event log skipped {} events", missed)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let worker = Worker::spawn(Arc::clone(&service), settings.worker.clone()).await?;
    worker.start().await?;
    let mut producers = Producers::spawn(Arc::clone(&service), &settings.producers);

    tracing::info!("jobd running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    producers.shutdown();
    let report = worker.shutdown().await?;
    tracing::info!(
        "Stopped after {:?}; {} of {} in-flight jobs abandoned",
        report.waited,
        report.abandoned,
        report.in_flight_at_stop
    );

    Ok(())
}
