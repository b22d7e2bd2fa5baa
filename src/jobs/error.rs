use super::models::{JobId, JobStatus, JobType};
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the queue and the dispatch loop.
#[derive(Debug, Error)]
pub enum JobError {
    /// No handler is registered for the job type. Never retried.
    #[error("no handler registered for job type {0}")]
    HandlerNotFound(JobType),

    #[error("handler failed: {0}")]
    HandlerExecution(String),

    #[error("handler timed out after {0:?}")]
    Timeout(Duration),

    #[error("handler panicked: {0}")]
    Panicked(String),

    /// Enqueuing the next pipeline stage failed. Logged only.
    #[error("failed to chain {from} -> {to}: {reason}")]
    Chaining {
        from: JobType,
        to: JobType,
        reason: String,
    },

    /// Subject resolution failed before a job could be enqueued.
    #[error("freshness registry error: {0}")]
    Freshness(String),

    #[error("job queue is closed")]
    QueueClosed,

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("invalid job state: cannot move {id} from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

impl JobError {
    /// Whether another attempt could fix this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobError::HandlerExecution(_) | JobError::Timeout(_) | JobError::Panicked(_)
        )
    }
}

/// Error returned by a job handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
