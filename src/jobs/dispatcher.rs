//! Timer-driven dispatch loop.
//!
//! Every tick advances at most one job: the highest-priority pending job that
//! is eligible. A single-flight guard skips a tick whose predecessor is still
//! running, so there is never more than one handler in flight.

use super::context::HandlerContext;
use super::error::JobError;
use super::models::{Job, JobId};
use super::pipeline::PipelineOrchestrator;
use super::queue::JobQueue;
use super::registry::HandlerRegistry;
use super::retry_policy::RetryPolicy;
use crate::config::JobQueueSettings;
use crate::metrics;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No eligible pending job.
    Idle,
    /// A previous tick is still processing.
    Busy,
    Completed(JobId),
    /// The attempt failed and the job went back to pending.
    Retrying(JobId),
    Failed(JobId),
}

pub struct Dispatcher {
    queue: Arc<JobQueue>,
    registry: Arc<HandlerRegistry>,
    orchestrator: PipelineOrchestrator,
    retry_policy: RetryPolicy,
    ctx: HandlerContext,
    tick_interval: Duration,
    handler_timeout: Duration,
    in_flight: Mutex<()>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<JobQueue>,
        registry: Arc<HandlerRegistry>,
        ctx: HandlerContext,
        settings: &JobQueueSettings,
    ) -> Self {
        Self {
            orchestrator: PipelineOrchestrator::new(queue.clone()),
            queue,
            registry,
            retry_policy: RetryPolicy::new(settings),
            ctx,
            tick_interval: Duration::from_secs(settings.tick_interval_secs.max(1)),
            handler_timeout: Duration::from_secs(settings.handler_timeout_secs.max(1)),
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_handler_timeout(mut self, handler_timeout: Duration) -> Self {
        self.handler_timeout = handler_timeout;
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Main dispatch loop. Returns once `shutdown` is cancelled.
    ///
    /// On shutdown the in-flight handler, if any, sees its cancellation token
    /// fire and the queue is closed to new jobs.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Starting dispatch loop (tick every {:?}, {} handlers registered)",
            self.tick_interval,
            self.registry.len()
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = self.tick().await;
                    if outcome != TickOutcome::Idle {
                        debug!("Dispatch tick: {:?}", outcome);
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Dispatch loop received shutdown signal");
                    self.ctx.cancellation_token.cancel();
                    self.queue.close().await;
                    break;
                }
            }
        }

        info!("Dispatch loop stopped");
    }

    /// Advance the single top eligible job, if any.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            return TickOutcome::Busy;
        };

        let now = self.queue.clock().now();
        let Some(job) = self.queue.next_eligible(now).await else {
            return TickOutcome::Idle;
        };

        self.advance(job).await
    }

    async fn advance(&self, job: Job) -> TickOutcome {
        let now = self.queue.clock().now();
        let job = match self.queue.mark_running(&job.id, now).await {
            Ok(job) => job,
            Err(e) => {
                warn!("Could not start job {}: {}", job.id, e);
                return TickOutcome::Idle;
            }
        };
        let job_id = job.id.clone();
        let job_type = job.job_type();
        let subject_id = job.subject_id().clone();

        info!(
            "Running job {} ({}) for subject {}, attempt {}/{}",
            job_id, job_type, subject_id, job.attempts, job.max_attempts
        );

        let start = Instant::now();
        let result = match self.registry.get(job_type) {
            Some(handler) => self.execute(handler, job.clone()).await,
            None => Err(JobError::HandlerNotFound(job_type)),
        };
        let elapsed = start.elapsed();
        let now = self.queue.clock().now();

        match result {
            Ok(value) => {
                if let Err(e) = self.queue.mark_completed(&job_id, value.clone(), now).await {
                    error!("Failed to record completion of job {}: {}", job_id, e);
                    return TickOutcome::Idle;
                }
                info!("Job {} ({}) completed in {:?}", job_id, job_type, elapsed);
                metrics::record_job_execution(job_type, "completed", elapsed);

                self.orchestrator
                    .on_completed(job_type, &subject_id, &value)
                    .await;
                TickOutcome::Completed(job_id)
            }
            Err(e) if self.retry_policy.should_retry(&e, job.attempts, job.max_attempts) => {
                let next_eligible_at = self.retry_policy.next_eligible_at(now, job.attempts);
                warn!(
                    "Job {} ({}) attempt {}/{} failed, retrying at {}: {}",
                    job_id,
                    job_type,
                    job.attempts,
                    job.max_attempts,
                    next_eligible_at.to_rfc3339(),
                    e
                );
                metrics::record_job_execution(job_type, "retrying", elapsed);
                if let Err(e) = self
                    .queue
                    .mark_retry(&job_id, e.to_string(), next_eligible_at)
                    .await
                {
                    error!("Failed to reschedule job {}: {}", job_id, e);
                }
                TickOutcome::Retrying(job_id)
            }
            Err(e) => {
                error!(
                    "Job {} ({}) failed after {} attempt(s): {}",
                    job_id, job_type, job.attempts, e
                );
                metrics::record_job_execution(job_type, "failed", elapsed);
                if let Err(e) = self.queue.mark_failed(&job_id, e.to_string(), now).await {
                    error!("Failed to record failure of job {}: {}", job_id, e);
                }
                TickOutcome::Failed(job_id)
            }
        }
    }

    /// Run one attempt in its own task under the handler deadline.
    ///
    /// Handler errors, panics and timeouts all come back as a [`JobError`].
    async fn execute(
        &self,
        handler: Arc<dyn super::registry::JobHandler>,
        job: Job,
    ) -> Result<JsonValue, JobError> {
        let ctx = self.ctx.child();
        let attempt_token = ctx.cancellation_token.clone();
        let mut task = tokio::spawn(async move { handler.handle(job, ctx).await });

        match tokio::time::timeout(self.handler_timeout, &mut task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(JobError::HandlerExecution(e.to_string())),
            Ok(Err(join_error)) => {
                if join_error.is_panic() {
                    Err(JobError::Panicked(panic_message(join_error.into_panic())))
                } else {
                    Err(JobError::HandlerExecution(join_error.to_string()))
                }
            }
            Err(_) => {
                attempt_token.cancel();
                task.abort();
                Err(JobError::Timeout(self.handler_timeout))
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
