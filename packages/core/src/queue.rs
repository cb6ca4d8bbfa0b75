//! Queue-level state: worker lifecycle and job counts.

use serde::{Deserialize, Serialize};

/// Lifecycle of a worker's polling loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Not polling; no jobs in flight.
    #[default]
    Stopped,
    /// Polling and claiming jobs.
    Running,
    /// No new claims; waiting for in-flight jobs to finish.
    Draining,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Stopped => write!(f, "stopped"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Draining => write!(f, "draining"),
        }
    }
}

/// Job counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    /// Jobs not yet terminal.
    pub fn active(&self) -> u64 {
        self.pending + self.processing
    }

    /// Jobs that reached a terminal state.
    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }

    /// Success rate as a percentage of finished jobs.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.finished();
        if total == 0 {
            None
        } else {
            Some((self.completed as f64 / total as f64) * 100.0)
        }
    }
}
