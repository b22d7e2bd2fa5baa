//! HTTP client for a stage provider service.

use super::StageProvider;
use crate::jobs::JobType;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

/// Posts each stage request to `{base_url}/{stage}` and returns the JSON body.
pub struct HttpStageProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStageProvider {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl StageProvider for HttpStageProvider {
    async fn run_stage(&self, job_type: JobType, request: &JsonValue) -> Result<JsonValue> {
        let url = format!("{}/{}", self.base_url, job_type.as_str());
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to reach provider for {}", job_type))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Provider request for {} failed with status {}",
                job_type,
                response.status()
            );
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse provider response for {}", job_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::json;

    async fn spawn_provider() -> String {
        let app = Router::new()
            .route(
                "/visibility_scoring",
                post(|Json(body): Json<JsonValue>| async move {
                    Json(json!({ "score": 71, "subject_id": body["subject_id"] }))
                }),
            )
            .route(
                "/gap_analysis",
                post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_posts_payload_to_stage_path() {
        let base_url = spawn_provider().await;
        let provider = HttpStageProvider::new(&base_url, 5).unwrap();
        assert!(!provider.base_url().ends_with('/'));

        let result = provider
            .run_stage(JobType::VisibilityScoring, &json!({ "subject_id": "b1" }))
            .await
            .unwrap();
        assert_eq!(result["score"], 71);
        assert_eq!(result["subject_id"], "b1");
    }

    #[tokio::test]
    async fn test_error_status_is_an_error() {
        let base_url = spawn_provider().await;
        let provider = HttpStageProvider::new(&base_url, 5).unwrap();

        let err = provider
            .run_stage(JobType::GapAnalysis, &json!({ "subject_id": "b1" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
