//! External providers consumed by the stage handlers.
//!
//! Providers are opaque: a stage request goes out as the job payload's JSON
//! map and comes back as an arbitrary JSON result or an error.

mod http;

pub use http::HttpStageProvider;

use crate::jobs::JobType;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

#[async_trait]
pub trait StageProvider: Send + Sync {
    async fn run_stage(&self, job_type: JobType, request: &JsonValue) -> Result<JsonValue>;
}
