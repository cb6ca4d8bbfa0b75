//! Worker handle: start, stop and inspect a polling worker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jobs_core::WorkerState;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorRef, RpcReplyPort};
use tokio::task::JoinHandle;

use crate::config::WorkerConfig;
use crate::error::QueueError;
use crate::messages::{WorkerMessage, WorkerSnapshot};
use crate::service::JobQueueService;
use crate::worker_actor::{WorkerActor, WorkerArgs};

const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a graceful stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Jobs in flight when claiming stopped.
    pub in_flight_at_stop: usize,
    /// Jobs still running when the drain window closed.
    pub abandoned: usize,
    pub waited: Duration,
}

/// A single polling worker.
///
/// Each instance owns its own actor and in-flight set; several can run
/// side by side against separate stores.
pub struct Worker {
    actor: ActorRef<WorkerMessage>,
    handle: JoinHandle<()>,
    config: WorkerConfig,
}

impl Worker {
    /// Spawn a stopped worker.
    ///
    /// With `recover_on_spawn` set, jobs a previous process left in
    /// `processing` are settled first: re-queued if they have attempts left,
    /// failed otherwise. That assumes this is the only worker on the store;
    /// turn it off when spawning a second worker against a live store.
    pub async fn spawn(
        service: Arc<JobQueueService>,
        config: WorkerConfig,
    ) -> Result<Self, QueueError> {
        let args = WorkerArgs {
            service,
            config: config.clone(),
        };

        let (actor, handle) = Actor::spawn(None, WorkerActor, args)
            .await
            .map_err(|e| QueueError::Worker(format!("Failed to spawn worker: {}", e)))?;

        Ok(Self {
            actor,
            handle,
            config,
        })
    }

    async fn call<T, F>(&self, build: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<T>) -> WorkerMessage,
    {
        match ractor::rpc::call(&self.actor, build, Some(RPC_TIMEOUT)).await {
            Ok(CallResult::Success(value)) => Ok(value),
            Ok(CallResult::Timeout) => Err(QueueError::Worker("worker did not reply".into())),
            Ok(CallResult::SenderError) => {
                Err(QueueError::Worker("worker dropped the reply".into()))
            }
            Err(e) => Err(QueueError::Worker(format!("worker unreachable: {}", e))),
        }
    }

    /// Begin polling; the first poll happens immediately.
    ///
    /// No-op if the worker is already running.
    pub async fn start(&self) -> Result<WorkerState, QueueError> {
        self.call(|reply| WorkerMessage::Start { reply }).await
    }

    /// Stop claiming and wait for in-flight jobs, up to the drain timeout.
    ///
    /// Never waits longer than the drain window; jobs still running after it
    /// are reported as abandoned and keep running detached.
    pub async fn stop(&self) -> Result<DrainReport, QueueError> {
        let started = Instant::now();

        let Some(in_flight_at_stop) = self.call(|reply| WorkerMessage::BeginDrain { reply }).await?
        else {
            return Ok(DrainReport {
                in_flight_at_stop: 0,
                abandoned: 0,
                waited: Duration::ZERO,
            });
        };

        tracing::info!("Draining {} in-flight jobs", in_flight_at_stop);

        let deadline = started + self.config.drain_timeout();
        let mut remaining = in_flight_at_stop;
        while remaining > 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.config.drain_check_interval().min(deadline - now)).await;
            remaining = self.in_flight().await?;
        }

        let abandoned = self.call(|reply| WorkerMessage::FinishDrain { reply }).await?;
        if abandoned > 0 {
            tracing::warn!(
                "Drain window of {:?} elapsed with {} jobs still running",
                self.config.drain_timeout(),
                abandoned
            );
        }

        Ok(DrainReport {
            in_flight_at_stop,
            abandoned,
            waited: started.elapsed(),
        })
    }

    pub async fn snapshot(&self) -> Result<WorkerSnapshot, QueueError> {
        self.call(|reply| WorkerMessage::GetSnapshot { reply }).await
    }

    pub async fn state(&self) -> Result<WorkerState, QueueError> {
        Ok(self.snapshot().await?.state)
    }

    /// Number of jobs currently executing.
    pub async fn in_flight(&self) -> Result<usize, QueueError> {
        Ok(self.snapshot().await?.in_flight.len())
    }

    /// Stop gracefully, then terminate the actor.
    pub async fn shutdown(self) -> Result<DrainReport, QueueError> {
        let report = self.stop().await?;
        self.actor.stop(None);
        if let Err(e) = self.handle.await {
            tracing::warn!("Worker actor ended abnormally: {}", e);
        }
        Ok(report)
    }
}
