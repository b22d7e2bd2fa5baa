use super::call_provider;
use crate::jobs::{HandlerContext, HandlerError, Job, JobHandler};
use crate::providers::StageProvider;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::debug;

/// Forwards the job payload to the provider and returns its answer as the result.
pub struct ProviderStageHandler {
    provider: Arc<dyn StageProvider>,
}

impl ProviderStageHandler {
    pub fn new(provider: Arc<dyn StageProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl JobHandler for ProviderStageHandler {
    async fn handle(&self, job: Job, ctx: HandlerContext) -> Result<JsonValue, HandlerError> {
        let job_type = job.job_type();
        debug!("Running {} for subject {}", job_type, job.subject_id());
        let request = job.payload.to_json();
        call_provider(&ctx, self.provider.run_stage(job_type, &request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::RecordingProvider;
    use crate::jobs::{JobId, JobPayload, JobType};
    use chrono::Utc;
    use tokio_util::sync::CancellationToken;

    fn scoring_job() -> Job {
        Job::new(
            JobId::generate(),
            JobPayload::VisibilityScoring {
                subject_id: "b1".into(),
            },
            5,
            3,
            0,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_forwards_payload() {
        let provider = Arc::new(RecordingProvider::default());
        let handler = ProviderStageHandler::new(provider.clone());

        let result = handler
            .handle(scoring_job(), HandlerContext::new(CancellationToken::new()))
            .await
            .unwrap();
        assert_eq!(result["stage"], "visibility_scoring");

        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls[0].0, JobType::VisibilityScoring);
        assert_eq!(calls[0].1["subject_id"], "b1");
    }

    #[tokio::test]
    async fn test_provider_failure_is_handler_error() {
        let handler = ProviderStageHandler::new(Arc::new(RecordingProvider::failing()));
        let err = handler
            .handle(scoring_job(), HandlerContext::new(CancellationToken::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Provider(msg) if msg.contains("provider unavailable")));
    }

    #[tokio::test]
    async fn test_cancelled_context_skips_provider() {
        let provider = Arc::new(RecordingProvider::default());
        let handler = ProviderStageHandler::new(provider.clone());
        let token = CancellationToken::new();
        token.cancel();

        let err = handler
            .handle(scoring_job(), HandlerContext::new(token))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Cancelled));
        assert_eq!(provider.call_count(), 0);
    }
}
