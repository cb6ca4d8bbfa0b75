//! Message types for the worker actor.

use jobs_core::{JobId, WorkerState};
use ractor::RpcReplyPort;

use crate::execution::JobOutcome;

/// Point-in-time view of a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSnapshot {
    pub state: WorkerState,
    pub in_flight: Vec<JobId>,
    /// Why polling halted on its own, if it did.
    pub halted: Option<String>,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Begin polling. No-op unless stopped.
    Start { reply: RpcReplyPort<WorkerState> },

    /// Poll tick: claim at most one job.
    Poll,

    /// A spawned execution finished.
    JobFinished {
        job_id: JobId,
        outcome: Result<JobOutcome, String>,
    },

    /// Stop claiming. Replies with the in-flight count, or `None` if the
    /// worker was not running.
    BeginDrain { reply: RpcReplyPort<Option<usize>> },

    /// Leave the draining state. Replies with the jobs still in flight.
    FinishDrain { reply: RpcReplyPort<usize> },

    /// Get the current snapshot.
    GetSnapshot { reply: RpcReplyPort<WorkerSnapshot> },
}
