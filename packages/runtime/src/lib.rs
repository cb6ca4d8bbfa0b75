//! Background job runtime.
//!
//! This crate provides the queue service, the ractor-based polling worker
//! and the recurring maintenance producers.
//!
//! # Architecture
//!
//! - `JobQueueService` - Owns job state transitions and handler dispatch
//! - `Worker` - Polls the service, runs claimed jobs concurrently, drains on stop
//! - `Producers` - Enqueue purge, statistics refresh and compaction jobs on timers
//!
//! # Usage
//!
//! ```ignore
//! use jobs_runtime::{JobHandlerRegistry, JobQueueService, Worker, WorkerConfig};
//!
//! let mut handlers = JobHandlerRegistry::new();
//! handlers.register_fn("send_report", |ctx| async move { Ok(ctx.payload) });
//!
//! let service = Arc::new(JobQueueService::new(JobRepository::new(db), handlers));
//! let worker = Worker::spawn(service, WorkerConfig::default()).await?;
//! worker.start().await?;
//! ```

mod config;
mod error;
mod execution;
mod handler;
pub mod maintenance;
mod messages;
mod producers;
mod service;
mod worker;
mod worker_actor;

pub use config::{ProducerConfig, WorkerConfig};
pub use error::{FailureClass, QueueError};
pub use execution::{JobOutcome, process_job, schedule_retry};
pub use handler::{FnHandler, HandlerFuture, HandlerResult, JobContext, JobHandler, JobHandlerRegistry};
pub use messages::WorkerSnapshot;
pub use producers::Producers;
pub use service::JobQueueService;
pub use worker::{DrainReport, Worker};
