//! Handler registry: static mapping from job type to its handler.
//!
//! The registry is populated before the dispatcher is created and then moved
//! behind an `Arc`, so it is read-only while jobs are being consumed.
//!
//! Handlers run with at-least-once semantics. A retried job re-runs its handler
//! even if a previous attempt committed side effects before failing, so
//! handlers should keep externally visible effects idempotent.

use super::context::HandlerContext;
use super::error::HandlerError;
use super::models::{Job, JobType};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute one attempt of `job`. Must not touch queue state; the returned
    /// value becomes the job result.
    async fn handle(&self, job: Job, ctx: HandlerContext) -> Result<JsonValue, HandlerError>;
}

/// Adapter turning an async closure into a [`JobHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Job, HandlerContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<JsonValue, HandlerError>> + Send + 'static,
{
    async fn handle(&self, job: Job, ctx: HandlerContext) -> Result<JsonValue, HandlerError> {
        (self.0)(job, ctx).await
    }
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a job type. The last registration wins.
    pub fn register_handler(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        if self.handlers.insert(job_type, handler).is_some() {
            warn!("Replacing handler for job type {}", job_type);
        } else {
            info!("Registering handler for job type {}", job_type);
        }
    }

    pub fn register_fn<F, Fut>(&mut self, job_type: JobType, f: F)
    where
        F: Fn(Job, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue, HandlerError>> + Send + 'static,
    {
        self.register_handler(job_type, Arc::new(FnHandler::new(f)));
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    pub fn contains(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    pub fn registered_types(&self) -> Vec<JobType> {
        JobType::ALL
            .into_iter()
            .filter(|t| self.handlers.contains_key(t))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
