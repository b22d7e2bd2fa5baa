//! Pipeline orchestration between analysis stages.
//!
//! Chaining is data: [`PIPELINE_EDGES`] lists which stage is enqueued when a
//! stage completes. The dispatcher consults the orchestrator after a job's
//! completion has been recorded.
//!
//! ```text
//! brand_enrichment ─┐
//!                   ├─> visibility_scoring ─> gap_analysis ─> recommendation_generation
//! llm_sampling ─────┘
//! ```

use super::error::JobError;
use super::models::{JobId, JobPayload, JobType, SubjectId};
use super::queue::JobQueue;
use crate::metrics;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Priority given to jobs enqueued by chaining.
pub const CHAINED_JOB_PRIORITY: i32 = 5;

/// A handler result carrying `"halt_pipeline": true` stops chaining for that completion.
pub const HALT_PIPELINE_KEY: &str = "halt_pipeline";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineEdge {
    pub from: JobType,
    pub to: JobType,
    pub priority: i32,
}

pub const PIPELINE_EDGES: &[PipelineEdge] = &[
    PipelineEdge {
        from: JobType::BrandEnrichment,
        to: JobType::VisibilityScoring,
        priority: CHAINED_JOB_PRIORITY,
    },
    PipelineEdge {
        from: JobType::LlmSampling,
        to: JobType::VisibilityScoring,
        priority: CHAINED_JOB_PRIORITY,
    },
    PipelineEdge {
        from: JobType::VisibilityScoring,
        to: JobType::GapAnalysis,
        priority: CHAINED_JOB_PRIORITY,
    },
    PipelineEdge {
        from: JobType::GapAnalysis,
        to: JobType::RecommendationGeneration,
        priority: CHAINED_JOB_PRIORITY,
    },
];

/// Edges leaving `job_type`, in table order.
pub fn next_stages(edges: &[PipelineEdge], job_type: JobType) -> Vec<PipelineEdge> {
    edges.iter().filter(|e| e.from == job_type).copied().collect()
}

fn halts_pipeline(result: &JsonValue) -> bool {
    result
        .get(HALT_PIPELINE_KEY)
        .and_then(JsonValue::as_bool)
        .unwrap_or(false)
}

pub struct PipelineOrchestrator {
    queue: Arc<JobQueue>,
    edges: &'static [PipelineEdge],
}

impl PipelineOrchestrator {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self::with_edges(queue, PIPELINE_EDGES)
    }

    pub fn with_edges(queue: Arc<JobQueue>, edges: &'static [PipelineEdge]) -> Self {
        Self { queue, edges }
    }

    pub fn edges(&self) -> &'static [PipelineEdge] {
        self.edges
    }

    /// Enqueue the successors of a completed stage for the same subject.
    ///
    /// Best effort: an enqueue failure is logged and counted, never returned,
    /// and never affects the job that already completed.
    pub async fn on_completed(
        &self,
        job_type: JobType,
        subject_id: &SubjectId,
        result: &JsonValue,
    ) -> Vec<JobId> {
        if halts_pipeline(result) {
            info!(
                "{} for subject {} requested a pipeline halt, not chaining",
                job_type, subject_id
            );
            return Vec::new();
        }

        let mut enqueued = Vec::new();
        for edge in next_stages(self.edges, job_type) {
            match self.enqueue_edge(&edge, subject_id).await {
                Ok(id) => {
                    debug!(
                        "Chained {} -> {} for subject {} as job {}",
                        edge.from, edge.to, subject_id, id
                    );
                    enqueued.push(id);
                }
                Err(e) => {
                    error!("{}", e);
                    metrics::record_chaining_failure(edge.from, edge.to);
                }
            }
        }
        enqueued
    }

    async fn enqueue_edge(&self, edge: &PipelineEdge, subject_id: &SubjectId) -> Result<JobId, JobError> {
        let payload = JobPayload::for_stage(edge.to, subject_id.clone()).ok_or_else(|| {
            JobError::Chaining {
                from: edge.from,
                to: edge.to,
                reason: "stage needs parameters beyond the subject id".to_string(),
            }
        })?;

        self.queue
            .add_job(payload, edge.priority, None)
            .await
            .map_err(|e| JobError::Chaining {
                from: edge.from,
                to: edge.to,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::models::JobStatus;

    #[test]
    fn test_edge_table() {
        let to = |t| -> Vec<JobType> {
            next_stages(PIPELINE_EDGES, t).iter().map(|e| e.to).collect()
        };
        assert_eq!(to(JobType::BrandEnrichment), vec![JobType::VisibilityScoring]);
        assert_eq!(to(JobType::LlmSampling), vec![JobType::VisibilityScoring]);
        assert_eq!(to(JobType::VisibilityScoring), vec![JobType::GapAnalysis]);
        assert_eq!(to(JobType::GapAnalysis), vec![JobType::RecommendationGeneration]);
        assert!(to(JobType::RecommendationGeneration).is_empty());
    }

    #[test]
    fn test_every_edge_target_is_chainable() {
        for edge in PIPELINE_EDGES {
            assert!(
                JobPayload::for_stage(edge.to, "s".into()).is_some(),
                "{} cannot be built from a subject id",
                edge.to
            );
        }
    }

    #[tokio::test]
    async fn test_enrichment_completion_enqueues_one_scoring_job() {
        let queue = Arc::new(JobQueue::default());
        let orchestrator = PipelineOrchestrator::new(queue.clone());

        let ids = orchestrator
            .on_completed(JobType::BrandEnrichment, &"b1".into(), &JsonValue::Null)
            .await;
        assert_eq!(ids.len(), 1);

        let job = queue.get_job(&ids[0]).await.unwrap();
        assert_eq!(job.job_type(), JobType::VisibilityScoring);
        assert_eq!(job.subject_id().as_str(), "b1");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.priority, CHAINED_JOB_PRIORITY);
    }

    #[tokio::test]
    async fn test_last_stage_enqueues_nothing() {
        let queue = Arc::new(JobQueue::default());
        let orchestrator = PipelineOrchestrator::new(queue.clone());

        let ids = orchestrator
            .on_completed(JobType::RecommendationGeneration, &"b1".into(), &JsonValue::Null)
            .await;
        assert!(ids.is_empty());
        assert_eq!(queue.get_stats().await.total, 0);
    }

    #[tokio::test]
    async fn test_halt_signal_stops_chaining() {
        let queue = Arc::new(JobQueue::default());
        let orchestrator = PipelineOrchestrator::new(queue.clone());

        let ids = orchestrator
            .on_completed(
                JobType::BrandEnrichment,
                &"b1".into(),
                &serde_json::json!({ "halt_pipeline": true }),
            )
            .await;
        assert!(ids.is_empty());
        assert_eq!(queue.get_stats().await.total, 0);
    }

    #[tokio::test]
    async fn test_closed_queue_chaining_is_swallowed() {
        let queue = Arc::new(JobQueue::default());
        queue.close().await;
        let orchestrator = PipelineOrchestrator::new(queue.clone());

        let ids = orchestrator
            .on_completed(JobType::VisibilityScoring, &"b1".into(), &JsonValue::Null)
            .await;
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_unchainable_edge_is_logged_not_enqueued() {
        static BAD_EDGES: &[PipelineEdge] = &[PipelineEdge {
            from: JobType::GapAnalysis,
            to: JobType::LlmSampling,
            priority: 1,
        }];
        let queue = Arc::new(JobQueue::default());
        let orchestrator = PipelineOrchestrator::with_edges(queue.clone(), BAD_EDGES);

        let ids = orchestrator
            .on_completed(JobType::GapAnalysis, &"b1".into(), &JsonValue::Null)
            .await;
        assert!(ids.is_empty());
        assert_eq!(queue.get_stats().await.total, 0);
    }
}
