//! Asynchronous job orchestration.
//!
//! An in-memory priority queue advanced by a timer-driven dispatcher. Each
//! tick runs at most one job through its registered handler, retries
//! transient failures with backoff, and chains the next pipeline stage when a
//! job completes.

mod cleanup;
mod context;
mod dispatcher;
mod error;
mod handle;
mod models;
mod pipeline;
mod queue;
mod registry;
mod retry_policy;

pub use cleanup::spawn_cleanup_task;
pub use context::HandlerContext;
pub use dispatcher::{Dispatcher, TickOutcome};
pub use error::{HandlerError, JobError};
pub use handle::{DomainEnrichment, FullPipelineJobs, JobsHandle};
pub use models::{
    Job, JobId, JobPayload, JobStats, JobStatus, JobStatusView, JobType, SubjectId,
    DEFAULT_MAX_ATTEMPTS,
};
pub use pipeline::{
    next_stages, PipelineEdge, PipelineOrchestrator, CHAINED_JOB_PRIORITY, HALT_PIPELINE_KEY,
    PIPELINE_EDGES,
};
pub use queue::JobQueue;
pub use registry::{FnHandler, HandlerRegistry, JobHandler};
pub use retry_policy::RetryPolicy;
