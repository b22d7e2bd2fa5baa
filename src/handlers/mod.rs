//! Pipeline stage handlers.
//!
//! Every stage is backed by a [`StageProvider`]. Brand enrichment is the
//! expensive one and consults the freshness registry before calling out.

mod enrichment;
mod stage;

pub use enrichment::BrandEnrichmentHandler;
pub use stage::ProviderStageHandler;

use crate::jobs::{HandlerContext, HandlerError, HandlerRegistry, JobType};
use crate::providers::StageProvider;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::Arc;

/// Register a handler for every job type.
pub fn register_default_handlers(registry: &mut HandlerRegistry, provider: Arc<dyn StageProvider>) {
    registry.register_handler(
        JobType::BrandEnrichment,
        Arc::new(BrandEnrichmentHandler::new(provider.clone())),
    );
    for job_type in [
        JobType::LlmSampling,
        JobType::VisibilityScoring,
        JobType::GapAnalysis,
        JobType::RecommendationGeneration,
    ] {
        registry.register_handler(job_type, Arc::new(ProviderStageHandler::new(provider.clone())));
    }
}

/// Run a provider call, giving up when the attempt is cancelled.
async fn call_provider<F>(ctx: &HandlerContext, call: F) -> Result<JsonValue, HandlerError>
where
    F: Future<Output = anyhow::Result<JsonValue>>,
{
    if ctx.is_cancelled() {
        return Err(HandlerError::Cancelled);
    }
    tokio::select! {
        result = call => result.map_err(|e| HandlerError::Provider(format!("{:#}", e))),
        _ = ctx.cancellation_token.cancelled() => Err(HandlerError::Cancelled),
    }
}
