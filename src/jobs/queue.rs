//! In-memory priority job queue.
//!
//! The queue is an explicitly constructed object shared by reference between
//! the dispatch loop and the trigger layer. Trigger calls only append pending
//! jobs; state transitions of existing jobs are `pub(crate)` and only the
//! dispatcher calls them.

use super::error::JobError;
use super::models::{Job, JobId, JobPayload, JobStats, JobStatus, SubjectId, DEFAULT_MAX_ATTEMPTS};
use crate::clock::{Clock, SystemClock};
use crate::metrics;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

struct QueueState {
    jobs: HashMap<JobId, Job>,
    next_seq: u64,
    closed: bool,
}

impl QueueState {
    fn stats(&self) -> JobStats {
        let mut stats = JobStats {
            total: self.jobs.len(),
            ..Default::default()
        };
        for job in self.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Refresh the queue gauge. Called with the write lock held.
    fn publish_size(&self) {
        metrics::set_queue_size(&self.stats());
    }
}

pub struct JobQueue {
    state: RwLock<QueueState>,
    clock: Arc<dyn Clock>,
    default_max_attempts: u32,
}

impl JobQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_default_max_attempts(clock, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_default_max_attempts(clock: Arc<dyn Clock>, default_max_attempts: u32) -> Self {
        Self {
            state: RwLock::new(QueueState {
                jobs: HashMap::new(),
                next_seq: 0,
                closed: false,
            }),
            clock,
            default_max_attempts: default_max_attempts.max(1),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Add a pending job and return its id.
    ///
    /// `max_attempts` falls back to the queue default when `None`.
    pub async fn add_job(
        &self,
        payload: JobPayload,
        priority: i32,
        max_attempts: Option<u32>,
    ) -> Result<JobId, JobError> {
        let job_type = payload.job_type();
        let mut state = self.state.write().await;
        if state.closed {
            return Err(JobError::QueueClosed);
        }

        let id = JobId::generate();
        let seq = state.next_seq;
        state.next_seq += 1;

        let job = Job::new(
            id.clone(),
            payload,
            priority,
            max_attempts.unwrap_or(self.default_max_attempts),
            seq,
            self.clock.now(),
        );
        debug!(
            "Enqueued job {} ({}) for subject {} with priority {}",
            id,
            job_type,
            job.subject_id(),
            priority
        );
        state.jobs.insert(id.clone(), job);
        state.publish_size();
        drop(state);

        metrics::record_job_enqueued(job_type);
        Ok(id)
    }

    pub async fn get_job(&self, id: &JobId) -> Option<Job> {
        self.state.read().await.jobs.get(id).cloned()
    }

    /// Jobs with the given status, in insertion order.
    pub async fn get_jobs_by_status(&self, status: JobStatus) -> Vec<Job> {
        let state = self.state.read().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.seq);
        jobs
    }

    /// Jobs operating on the given subject, in insertion order.
    pub async fn get_jobs_by_subject(&self, subject_id: &SubjectId) -> Vec<Job> {
        let state = self.state.read().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.subject_id() == subject_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.seq);
        jobs
    }

    pub async fn get_stats(&self) -> JobStats {
        self.state.read().await.stats()
    }

    /// Remove terminal jobs that reached their terminal state at least
    /// `retention` ago. Pending and running jobs are never touched.
    ///
    /// Returns the number of removed jobs.
    pub async fn clear_completed_jobs(&self, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut state = self.state.write().await;
        let before = state.jobs.len();
        state.jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.completed_at.is_some_and(|at| at <= cutoff))
        });
        let removed = before - state.jobs.len();
        state.publish_size();

        if removed > 0 {
            info!("Cleared {} terminal jobs from the queue", removed);
        }
        removed
    }

    /// Refuse any further `add_job` calls.
    pub async fn close(&self) {
        self.state.write().await.closed = true;
        info!("Job queue closed");
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    /// Highest-priority pending job that is eligible at `now`.
    /// Ties are broken by insertion order.
    pub(crate) async fn next_eligible(&self, now: DateTime<Utc>) -> Option<Job> {
        let state = self.state.read().await;
        state
            .jobs
            .values()
            .filter(|job| job.is_eligible(now))
            .min_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)))
            .cloned()
    }

    /// Pending → Running. Increments the attempt counter.
    pub(crate) async fn mark_running(&self, id: &JobId, now: DateTime<Utc>) -> Result<Job, JobError> {
        self.transition(id, JobStatus::Running, |job| {
            job.attempts += 1;
            job.started_at = Some(now);
        })
        .await
    }

    /// Running → Completed.
    pub(crate) async fn mark_completed(
        &self,
        id: &JobId,
        result: JsonValue,
        now: DateTime<Utc>,
    ) -> Result<Job, JobError> {
        self.transition(id, JobStatus::Completed, |job| {
            job.completed_at = Some(now);
            job.result = Some(result);
            job.error = None;
        })
        .await
    }

    /// Running → Failed.
    pub(crate) async fn mark_failed(
        &self,
        id: &JobId,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<Job, JobError> {
        self.transition(id, JobStatus::Failed, |job| {
            job.completed_at = Some(now);
            job.error = Some(error);
        })
        .await
    }

    /// Running → Pending, not eligible again before `next_eligible_at`.
    pub(crate) async fn mark_retry(
        &self,
        id: &JobId,
        error: String,
        next_eligible_at: DateTime<Utc>,
    ) -> Result<Job, JobError> {
        self.transition(id, JobStatus::Pending, |job| {
            job.error = Some(error);
            job.next_eligible_at = next_eligible_at;
        })
        .await
    }

    async fn transition<F>(&self, id: &JobId, to: JobStatus, update: F) -> Result<Job, JobError>
    where
        F: FnOnce(&mut Job),
    {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.clone()))?;

        if !job.status.can_transition_to(to) {
            return Err(JobError::InvalidTransition {
                id: id.clone(),
                from: job.status,
                to,
            });
        }

        job.status = to;
        update(job);
        let job = job.clone();
        state.publish_size();
        Ok(job)
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
