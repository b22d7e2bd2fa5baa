use super::error::JobError;
use super::models::{JobId, JobPayload, JobStats, JobStatusView, SubjectId};
use super::queue::JobQueue;
use crate::freshness::FreshnessRegistry;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

/// Jobs enqueued by [`JobsHandle::trigger_full_pipeline`].
#[derive(Debug, Clone, Serialize)]
pub struct FullPipelineJobs {
    pub enrichment: JobId,
    pub sampling: JobId,
}

/// Result of [`JobsHandle::trigger_enrichment_for_domain`].
#[derive(Debug, Clone, Serialize)]
pub struct DomainEnrichment {
    pub subject_id: SubjectId,
    pub is_new_subject: bool,
    /// `None` when the subject's data is still fresh.
    pub job_id: Option<JobId>,
}

/// Handle used by the outer layer to enqueue work and poll its status.
///
/// It can only append jobs; state changes stay with the dispatcher.
#[derive(Clone)]
pub struct JobsHandle {
    queue: Arc<JobQueue>,
    freshness: Option<Arc<FreshnessRegistry>>,
}

impl JobsHandle {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self {
            queue,
            freshness: None,
        }
    }

    pub fn with_freshness(mut self, freshness: Arc<FreshnessRegistry>) -> Self {
        self.freshness = Some(freshness);
        self
    }

    pub async fn trigger_brand_enrichment(
        &self,
        subject_id: SubjectId,
        domain: impl Into<String>,
        priority: i32,
    ) -> Result<JobId, JobError> {
        self.enqueue(
            JobPayload::BrandEnrichment {
                subject_id,
                domain: domain.into(),
            },
            priority,
        )
        .await
    }

    pub async fn trigger_llm_sampling(
        &self,
        subject_id: SubjectId,
        prompts: Vec<String>,
        priority: i32,
    ) -> Result<JobId, JobError> {
        self.enqueue(JobPayload::LlmSampling { subject_id, prompts }, priority)
            .await
    }

    pub async fn trigger_visibility_scoring(
        &self,
        subject_id: SubjectId,
        priority: i32,
    ) -> Result<JobId, JobError> {
        self.enqueue(JobPayload::VisibilityScoring { subject_id }, priority)
            .await
    }

    pub async fn trigger_gap_analysis(
        &self,
        subject_id: SubjectId,
        priority: i32,
    ) -> Result<JobId, JobError> {
        self.enqueue(JobPayload::GapAnalysis { subject_id }, priority)
            .await
    }

    pub async fn trigger_recommendation_generation(
        &self,
        subject_id: SubjectId,
        priority: i32,
    ) -> Result<JobId, JobError> {
        self.enqueue(JobPayload::RecommendationGeneration { subject_id }, priority)
            .await
    }

    /// Enqueue enrichment and sampling side by side.
    ///
    /// Both chain into scoring, so scoring may run once against partially
    /// enriched data before the second stage lands.
    pub async fn trigger_full_pipeline(
        &self,
        subject_id: SubjectId,
        domain: impl Into<String>,
        prompts: Vec<String>,
        priority: i32,
    ) -> Result<FullPipelineJobs, JobError> {
        let (enrichment, sampling) = tokio::join!(
            self.trigger_brand_enrichment(subject_id.clone(), domain, priority),
            self.trigger_llm_sampling(subject_id.clone(), prompts, priority),
        );
        let jobs = FullPipelineJobs {
            enrichment: enrichment?,
            sampling: sampling?,
        };
        info!(
            "Full pipeline for {}: enrichment {}, sampling {}",
            subject_id, jobs.enrichment, jobs.sampling
        );
        Ok(jobs)
    }

    /// Resolve `domain` to a subject and enqueue enrichment unless its data is fresh.
    pub async fn trigger_enrichment_for_domain(
        &self,
        domain: &str,
        attributes: JsonValue,
        priority: i32,
    ) -> Result<DomainEnrichment, JobError> {
        let freshness = self
            .freshness
            .as_ref()
            .ok_or_else(|| JobError::Freshness("freshness registry not configured".to_string()))?;
        let resolution = freshness
            .get_or_create_subject(domain, attributes)
            .map_err(|e| JobError::Freshness(format!("{:#}", e)))?;

        let job_id = if resolution.can_reuse {
            info!(
                "Skipping enrichment for {}: subject {} is fresh",
                domain, resolution.subject_id
            );
            None
        } else {
            Some(
                self.trigger_brand_enrichment(resolution.subject_id.clone(), domain, priority)
                    .await?,
            )
        };

        Ok(DomainEnrichment {
            subject_id: resolution.subject_id,
            is_new_subject: resolution.is_new,
            job_id,
        })
    }

    pub async fn get_job_status(&self, id: &JobId) -> Option<JobStatusView> {
        self.queue.get_job(id).await.as_ref().map(JobStatusView::from)
    }

    pub async fn get_stats(&self) -> JobStats {
        self.queue.get_stats().await
    }

    async fn enqueue(&self, payload: JobPayload, priority: i32) -> Result<JobId, JobError> {
        let job_type = payload.job_type();
        let subject_id = payload.subject_id().clone();
        let id = self.queue.add_job(payload, priority, None).await?;
        info!(
            "Triggered {} job {} for subject {} (priority {})",
            job_type, id, subject_id, priority
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::FreshnessSettings;
    use crate::freshness::SqliteFreshnessStore;
    use crate::jobs::models::{JobStatus, JobType};
    use tempfile::TempDir;

    fn handle() -> (JobsHandle, Arc<JobQueue>) {
        let queue = Arc::new(JobQueue::default());
        (JobsHandle::new(queue.clone()), queue)
    }

    #[tokio::test]
    async fn test_stage_triggers_enqueue_typed_jobs() {
        let (handle, queue) = handle();
        let subject: SubjectId = "b1".into();

        let ids = vec![
            handle
                .trigger_brand_enrichment(subject.clone(), "acme.com", 8)
                .await
                .unwrap(),
            handle
                .trigger_llm_sampling(subject.clone(), vec!["best crm".to_string()], 7)
                .await
                .unwrap(),
            handle
                .trigger_visibility_scoring(subject.clone(), 6)
                .await
                .unwrap(),
            handle.trigger_gap_analysis(subject.clone(), 5).await.unwrap(),
            handle
                .trigger_recommendation_generation(subject.clone(), 4)
                .await
                .unwrap(),
        ];

        let types: Vec<JobType> = queue
            .get_jobs_by_subject(&subject)
            .await
            .iter()
            .map(|job| job.job_type())
            .collect();
        assert_eq!(types, JobType::ALL.to_vec());

        let view = handle.get_job_status(&ids[0]).await.unwrap();
        assert_eq!(view.status, "pending");
        assert_eq!(view.priority, 8);
        assert_eq!(view.max_attempts, 3);
        assert_eq!(handle.get_stats().await.pending, 5);
    }

    #[tokio::test]
    async fn test_full_pipeline_enqueues_both_top_level_stages() {
        let (handle, queue) = handle();
        let jobs = handle
            .trigger_full_pipeline("b1".into(), "acme.com", vec![], 8)
            .await
            .unwrap();

        let enrichment = queue.get_job(&jobs.enrichment).await.unwrap();
        let sampling = queue.get_job(&jobs.sampling).await.unwrap();
        assert_eq!(enrichment.job_type(), JobType::BrandEnrichment);
        assert_eq!(sampling.job_type(), JobType::LlmSampling);
        assert_eq!(sampling.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_trigger_fails_on_closed_queue() {
        let (handle, queue) = handle();
        queue.close().await;
        let err = handle
            .trigger_gap_analysis("b1".into(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::QueueClosed));
    }

    #[tokio::test]
    async fn test_unknown_job_status_is_none() {
        let (handle, _) = handle();
        assert!(handle.get_job_status(&"missing".into()).await.is_none());
    }

    #[tokio::test]
    async fn test_enrichment_for_domain_skips_fresh_subject() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(SqliteFreshnessStore::new(tmp.path().join("freshness.db")).unwrap());
        let registry = Arc::new(FreshnessRegistry::new(
            store,
            Arc::new(ManualClock::starting_now()),
            &FreshnessSettings::default(),
        ));
        let queue = Arc::new(JobQueue::default());
        let handle = JobsHandle::new(queue.clone()).with_freshness(registry.clone());

        let first = handle
            .trigger_enrichment_for_domain("acme.com", JsonValue::Null, 8)
            .await
            .unwrap();
        assert!(first.is_new_subject);
        assert!(first.job_id.is_some());

        registry
            .register_work("acme.com", &first.subject_id)
            .unwrap();

        let second = handle
            .trigger_enrichment_for_domain("acme.com", JsonValue::Null, 8)
            .await
            .unwrap();
        assert_eq!(second.subject_id, first.subject_id);
        assert!(!second.is_new_subject);
        assert!(second.job_id.is_none());
        assert_eq!(queue.get_stats().await.total, 1);
    }

    #[tokio::test]
    async fn test_enrichment_for_domain_requires_registry() {
        let (handle, _) = handle();
        let err = handle
            .trigger_enrichment_for_domain("acme.com", JsonValue::Null, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Freshness(_)));
    }
}
