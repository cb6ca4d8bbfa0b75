//! Job handler trait and registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use jobs_core::{Job, JobId, TenantId};

/// Result type for job handlers: an opaque output or a failure message.
pub type HandlerResult = Result<serde_json::Value, String>;

/// Future type for async job handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// What a handler sees of the job it runs.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub tenant_id: TenantId,
    pub job_type: String,
    /// 1-based number of this attempt.
    pub attempt: u32,
    pub max_attempts: u32,
    pub payload: serde_json::Value,
}

impl JobContext {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            tenant_id: job.tenant_id.clone(),
            job_type: job.job_type.clone(),
            attempt: job.attempts,
            max_attempts: job.max_attempts,
            payload: job.payload.clone(),
        }
    }
}

/// Trait for job handlers.
///
/// Implement this trait to define how jobs of a specific type are processed.
/// Handlers may be abandoned at process exit, so they should be idempotent.
pub trait JobHandler: Send + Sync + 'static {
    /// The job type this handler processes.
    fn job_type(&self) -> &str;

    /// Process a job and return the result.
    fn handle(&self, ctx: JobContext) -> HandlerFuture;
}

/// Registry for job handlers.
///
/// Maps job types to their handlers for dynamic dispatch. Built before the
/// worker starts and read-only afterwards.
#[derive(Default)]
pub struct JobHandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobHandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a job type, replacing any previous one.
    pub fn register<H: JobHandler>(&mut self, handler: H) {
        let job_type = handler.job_type().to_string();
        if self.handlers.insert(job_type.clone(), Arc::new(handler)).is_some() {
            tracing::warn!("Replaced handler for job type: {}", job_type);
        }
    }

    /// Register an async function as the handler for a job type.
    pub fn register_fn<F, Fut>(&mut self, job_type: impl Into<String>, handler: F)
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(FnHandler::new(job_type, move |ctx: JobContext| -> HandlerFuture {
            Box::pin(handler(ctx))
        }));
    }

    /// Get a handler for a job type.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    /// Check if a handler exists for a job type.
    pub fn has_handler(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// List all registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// A simple function-based job handler.
pub struct FnHandler<F>
where
    F: Fn(JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    job_type: String,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    /// Create a new function-based handler.
    pub fn new(job_type: impl Into<String>, handler: F) -> Self {
        Self {
            job_type: job_type.into(),
            handler,
        }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    fn job_type(&self) -> &str {
        &self.job_type
    }

    fn handle(&self, ctx: JobContext) -> HandlerFuture {
        (self.handler)(ctx)
    }
}

/// Helper macro for creating job handlers from async blocks.
#[macro_export]
macro_rules! job_handler {
    ($job_type:expr, |$ctx:ident| $body:expr) => {
        $crate::FnHandler::new($job_type, |$ctx: $crate::JobContext| -> $crate::HandlerFuture {
            Box::pin(async move { $body })
        })
    };
}
