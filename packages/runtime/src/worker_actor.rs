//! Worker actor: the polling loop and its in-flight set.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use jobs_core::{JobEvent, JobId, WorkerState};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::WorkerConfig;
use crate::error::{FailureClass, QueueError};
use crate::execution::process_job;
use crate::messages::{WorkerMessage, WorkerSnapshot};
use crate::service::JobQueueService;

/// Logs at most one store error per window.
#[derive(Debug)]
pub(crate) struct ErrorLogLimiter {
    window: Duration,
    last_logged: Option<Instant>,
    suppressed: u64,
}

impl ErrorLogLimiter {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            last_logged: None,
            suppressed: 0,
        }
    }

    /// Record an error. Returns the number of errors suppressed since the
    /// last logged one when this one should be logged.
    pub(crate) fn record(&mut self, now: Instant) -> Option<u64> {
        let due = self
            .last_logged
            .is_none_or(|last| now.duration_since(last) >= self.window);
        if due {
            self.last_logged = Some(now);
            Some(std::mem::take(&mut self.suppressed))
        } else {
            self.suppressed += 1;
            None
        }
    }

    /// Forget the error streak. Returns true if there was one.
    pub(crate) fn clear(&mut self) -> bool {
        let had_errors = self.last_logged.is_some();
        self.last_logged = None;
        self.suppressed = 0;
        had_errors
    }
}

/// State for the worker actor.
pub struct WorkerActorState {
    service: Arc<JobQueueService>,
    config: WorkerConfig,
    state: WorkerState,
    in_flight: HashSet<JobId>,
    ticker: Option<JoinHandle<()>>,
    store_errors: ErrorLogLimiter,
    halted: Option<String>,
}

impl WorkerActorState {
    fn new(service: Arc<JobQueueService>, config: WorkerConfig) -> Self {
        let store_errors = ErrorLogLimiter::new(config.error_log_window());
        Self {
            service,
            config,
            state: WorkerState::Stopped,
            in_flight: HashSet::new(),
            ticker: None,
            store_errors,
            halted: None,
        }
    }

    fn transition(&mut self, new_state: WorkerState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }
        self.state = new_state;
        tracing::info!("Worker {} -> {}", old_state, new_state);
        self.service.broadcast(JobEvent::WorkerStateChanged {
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    fn snapshot(&self) -> WorkerSnapshot {
        let mut in_flight: Vec<JobId> = self.in_flight.iter().copied().collect();
        in_flight.sort_by_key(|id| id.0);
        WorkerSnapshot {
            state: self.state,
            in_flight,
            halted: self.halted.clone(),
        }
    }

    fn on_poll_error(&mut self, err: QueueError) {
        match err.classify(&self.config.fatal_error_signatures) {
            FailureClass::Fatal => {
                tracing::error!("Halting job polling, store reported a fatal error: {}", err);
                self.stop_ticker();
                self.halted = Some(err.to_string());
                self.transition(WorkerState::Stopped);
            }
            FailureClass::Transient => {
                if let Some(suppressed) = self.store_errors.record(Instant::now()) {
                    if suppressed > 0 {
                        tracing::warn!(
                            "Job store unavailable: {} ({} similar errors suppressed)",
                            err,
                            suppressed
                        );
                    } else {
                        tracing::warn!("Job store unavailable: {}", err);
                    }
                }
            }
        }
    }
}

/// Put a job whose attempt errored back in the queue so it is not left
/// `processing` until the next restart.
async fn release_claim(service: &JobQueueService, job_id: JobId, err: &QueueError) {
    tracing::warn!("Job {} could not be recorded: {}", job_id, err);
    match service.release(job_id).await {
        Ok(true) => tracing::info!("Job {} released back to pending", job_id),
        Ok(false) => {}
        Err(e) => tracing::error!(
            "Job {} stays processing until the next restart: {}",
            job_id,
            e
        ),
    }
}

/// Spawn the tick source for a running worker.
fn spawn_ticker(myself: ActorRef<WorkerMessage>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        // The first tick completes immediately.
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if myself.send_message(WorkerMessage::Poll).is_err() {
                break;
            }
        }
    })
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub service: Arc<JobQueueService>,
    pub config: WorkerConfig,
}

/// Worker actor that claims and dispatches jobs.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting job worker with handlers: {:?}",
            args.service.registered_handlers()
        );

        if args.config.recover_on_spawn {
            match args.service.recover_abandoned().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Settled {} jobs left processing by a previous run", n),
                Err(e) => tracing::warn!("Could not recover abandoned jobs: {}", e),
            }
        }

        Ok(WorkerActorState::new(args.service, args.config))
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.stop_ticker();
        if !state.in_flight.is_empty() {
            tracing::warn!(
                "Worker stopped with {} jobs still in flight",
                state.in_flight.len()
            );
        }
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Start { reply } => {
                if state.state == WorkerState::Stopped {
                    state.halted = None;
                    state.store_errors.clear();
                    state.ticker = Some(spawn_ticker(myself.clone(), state.config.poll_interval()));
                    state.transition(WorkerState::Running);
                } else {
                    tracing::debug!("Worker already {}, ignoring start", state.state);
                }
                let _ = reply.send(state.state);
            }

            WorkerMessage::Poll => {
                if state.state != WorkerState::Running {
                    return Ok(());
                }

                match state.service.dequeue().await {
                    Ok(None) => {
                        if state.store_errors.clear() {
                            tracing::info!("Job store reachable again");
                        }
                    }
                    Ok(Some(job)) => {
                        if state.store_errors.clear() {
                            tracing::info!("Job store reachable again");
                        }

                        let job_id = job.id;
                        state.in_flight.insert(job_id);

                        let service = Arc::clone(&state.service);
                        let retry = state.config.retry;
                        let worker = myself.clone();
                        tokio::spawn(async move {
                            let outcome = match process_job(&service, job, retry).await {
                                Ok(outcome) => Ok(outcome),
                                Err(e) => {
                                    release_claim(&service, job_id, &e).await;
                                    Err(e.to_string())
                                }
                            };
                            let _ = worker.send_message(WorkerMessage::JobFinished { job_id, outcome });
                        });
                    }
                    Err(e) => state.on_poll_error(e),
                }
            }

            WorkerMessage::JobFinished { job_id, outcome } => {
                state.in_flight.remove(&job_id);
                match outcome {
                    Ok(outcome) => tracing::debug!("Job {} finished: {:?}", job_id, outcome),
                    Err(e) => tracing::debug!("Job {} ended with an error: {}", job_id, e),
                }
            }

            WorkerMessage::BeginDrain { reply } => {
                // A halted worker is stopped but may still have jobs running.
                if state.state == WorkerState::Running || !state.in_flight.is_empty() {
                    state.stop_ticker();
                    state.transition(WorkerState::Draining);
                    let _ = reply.send(Some(state.in_flight.len()));
                } else {
                    let _ = reply.send(None);
                }
            }

            WorkerMessage::FinishDrain { reply } => {
                if state.state == WorkerState::Draining {
                    state.transition(WorkerState::Stopped);
                }
                let _ = reply.send(state.in_flight.len());
            }

            WorkerMessage::GetSnapshot { reply } => {
                let _ = reply.send(state.snapshot());
            }
        }

        Ok(())
    }
}
