//! Data models for the job queue.
//!
//! Defines job types, typed payloads, statuses and the job record itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Default number of attempts before a job is marked failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Unique identifier of a job (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the business entity a chain of jobs operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline stage a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    BrandEnrichment,
    LlmSampling,
    VisibilityScoring,
    GapAnalysis,
    RecommendationGeneration,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::BrandEnrichment,
        JobType::LlmSampling,
        JobType::VisibilityScoring,
        JobType::GapAnalysis,
        JobType::RecommendationGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::BrandEnrichment => "brand_enrichment",
            JobType::LlmSampling => "llm_sampling",
            JobType::VisibilityScoring => "visibility_scoring",
            JobType::GapAnalysis => "gap_analysis",
            JobType::RecommendationGeneration => "recommendation_generation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        JobType::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload of a job. The variant determines the job type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    BrandEnrichment {
        subject_id: SubjectId,
        /// External identity of the subject, usually its domain.
        domain: String,
    },
    LlmSampling {
        subject_id: SubjectId,
        #[serde(default)]
        prompts: Vec<String>,
    },
    VisibilityScoring {
        subject_id: SubjectId,
    },
    GapAnalysis {
        subject_id: SubjectId,
    },
    RecommendationGeneration {
        subject_id: SubjectId,
    },
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::BrandEnrichment { .. } => JobType::BrandEnrichment,
            JobPayload::LlmSampling { .. } => JobType::LlmSampling,
            JobPayload::VisibilityScoring { .. } => JobType::VisibilityScoring,
            JobPayload::GapAnalysis { .. } => JobType::GapAnalysis,
            JobPayload::RecommendationGeneration { .. } => JobType::RecommendationGeneration,
        }
    }

    pub fn subject_id(&self) -> &SubjectId {
        match self {
            JobPayload::BrandEnrichment { subject_id, .. }
            | JobPayload::LlmSampling { subject_id, .. }
            | JobPayload::VisibilityScoring { subject_id }
            | JobPayload::GapAnalysis { subject_id }
            | JobPayload::RecommendationGeneration { subject_id } => subject_id,
        }
    }

    /// Build the payload for a stage that only needs the subject id.
    ///
    /// Returns `None` for stages whose payload carries extra parameters
    /// (enrichment needs a domain, sampling needs prompts).
    pub fn for_stage(job_type: JobType, subject_id: SubjectId) -> Option<Self> {
        match job_type {
            JobType::VisibilityScoring => Some(JobPayload::VisibilityScoring { subject_id }),
            JobType::GapAnalysis => Some(JobPayload::GapAnalysis { subject_id }),
            JobType::RecommendationGeneration => {
                Some(JobPayload::RecommendationGeneration { subject_id })
            }
            JobType::BrandEnrichment | JobType::LlmSampling => None,
        }
    }

    /// JSON map form of the payload, as sent to external providers.
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({
                "type": self.job_type().as_str(),
                "subject_id": self.subject_id().as_str(),
            })
        })
    }
}

/// Status of a job.
///
/// Valid transitions: Pending → Running → {Completed | Failed}, and
/// Running → Pending for a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed, // terminal
    Failed,    // terminal
}

impl JobStatus {
    /// Returns true if this is a terminal state (Completed or Failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Pending)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work in the queue.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub payload: JobPayload,
    pub status: JobStatus,
    /// Higher value = more urgent.
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
    /// Insertion sequence, used to break priority ties.
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Pending jobs are not selected before this instant (retry backoff).
    pub next_eligible_at: DateTime<Utc>,
    /// Last error message. Kept while a retry is waiting and on terminal failure.
    pub error: Option<String>,
    pub result: Option<JsonValue>,
}

impl Job {
    pub fn new(
        id: JobId,
        payload: JobPayload,
        priority: i32,
        max_attempts: u32,
        seq: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            payload,
            status: JobStatus::Pending,
            priority,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            seq,
            created_at: now,
            started_at: None,
            completed_at: None,
            next_eligible_at: now,
            error: None,
            result: None,
        }
    }

    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }

    pub fn subject_id(&self) -> &SubjectId {
        self.payload.subject_id()
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.next_eligible_at <= now
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Counts over the live job set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Serializable job state for status polling.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub subject_id: String,
    pub status: String,
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub next_eligible_at: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        let waiting_retry = job.status == JobStatus::Pending && job.attempts > 0;
        JobStatusView {
            id: job.id.to_string(),
            job_type: job.job_type().as_str().to_string(),
            subject_id: job.subject_id().to_string(),
            status: job.status.as_str().to_string(),
            priority: job.priority,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            result: job.result.clone(),
            error: job.error.clone(),
            created_at: job.created_at.to_rfc3339(),
            started_at: job.started_at.map(|dt| dt.to_rfc3339()),
            completed_at: job.completed_at.map(|dt| dt.to_rfc3339()),
            next_eligible_at: waiting_retry.then(|| job.next_eligible_at.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_round_trip_names() {
        for job_type in JobType::ALL {
            assert_eq!(JobType::from_str(job_type.as_str()), Some(job_type));
        }
        assert_eq!(JobType::from_str("unknown_stage"), None);
    }

    #[test]
    fn test_payload_determines_type_and_subject() {
        let payload = JobPayload::BrandEnrichment {
            subject_id: "b1".into(),
            domain: "acme.com".to_string(),
        };
        assert_eq!(payload.job_type(), JobType::BrandEnrichment);
        assert_eq!(payload.subject_id().as_str(), "b1");
    }

    #[test]
    fn test_payload_json_contains_subject_id() {
        let payload = JobPayload::LlmSampling {
            subject_id: "b1".into(),
            prompts: vec!["best crm".to_string()],
        };
        let json = payload.to_json();
        assert_eq!(json["type"], "llm_sampling");
        assert_eq!(json["subject_id"], "b1");
        assert_eq!(json["prompts"][0], "best crm");
    }

    #[test]
    fn test_for_stage_only_builds_subject_only_payloads() {
        let subject = SubjectId::new("s");
        assert!(JobPayload::for_stage(JobType::GapAnalysis, subject.clone()).is_some());
        assert!(JobPayload::for_stage(JobType::BrandEnrichment, subject.clone()).is_none());
        assert!(JobPayload::for_stage(JobType::LlmSampling, subject).is_none());
    }

    #[test]
    fn test_status_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Pending));

        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_new_job_defaults() {
        let now = Utc::now();
        let job = Job::new(
            JobId::generate(),
            JobPayload::GapAnalysis {
                subject_id: "b1".into(),
            },
            4,
            0,
            7,
            now,
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        // At least one attempt is always allowed
        assert_eq!(job.max_attempts, 1);
        assert!(job.is_eligible(now));
    }

    #[test]
    fn test_status_view_datetime_format() {
        let now = Utc::now();
        let mut job = Job::new(
            JobId::from("job-1"),
            JobPayload::VisibilityScoring {
                subject_id: "b1".into(),
            },
            1,
            3,
            0,
            now,
        );
        job.status = JobStatus::Completed;
        job.completed_at = Some(now);
        job.result = Some(serde_json::json!({"score": 42}));

        let view = JobStatusView::from(&job);
        assert_eq!(view.status, "completed");
        assert_eq!(view.job_type, "visibility_scoring");
        assert!(view.created_at.contains('T'));
        assert!(view.completed_at.is_some());
        assert!(view.next_eligible_at.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "visibility_scoring");
        assert_eq!(json["result"]["score"], 42);
        assert!(json.get("error").is_none());
    }
}
