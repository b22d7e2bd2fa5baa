use super::call_provider;
use crate::freshness::DataType;
use crate::jobs::{HandlerContext, HandlerError, Job, JobHandler, JobPayload};
use crate::providers::StageProvider;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, info};

/// Brand enrichment, skipped while the subject's enrichment data is fresh.
///
/// Freshness is registered only after the provider call succeeded.
pub struct BrandEnrichmentHandler {
    provider: Arc<dyn StageProvider>,
}

impl BrandEnrichmentHandler {
    pub fn new(provider: Arc<dyn StageProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl JobHandler for BrandEnrichmentHandler {
    async fn handle(&self, job: Job, ctx: HandlerContext) -> Result<JsonValue, HandlerError> {
        let JobPayload::BrandEnrichment { subject_id, domain } = &job.payload else {
            return Err(HandlerError::InvalidPayload(format!(
                "expected a brand_enrichment payload, got {}",
                job.job_type()
            )));
        };
        let freshness = ctx.freshness()?;

        let decision = freshness.needs_work(subject_id, DataType::Enrichment);
        if !decision.needs {
            info!(
                "Enrichment for {} ({}) is fresh, skipping provider call",
                subject_id, domain
            );
            return Ok(json!({ "skipped": true, "reason": decision.reason.as_str() }));
        }

        debug!(
            "Enriching {} ({}): {}",
            subject_id,
            domain,
            decision.reason.as_str()
        );
        let request = job.payload.to_json();
        let result = call_provider(&ctx, self.provider.run_stage(job.job_type(), &request)).await?;

        freshness.register_work(domain, subject_id)?;
        Ok(result)
    }
}
