use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub metrics_port: Option<u16>,

    // Feature configs
    pub job_queue: Option<JobQueueConfig>,
    pub freshness: Option<FreshnessConfig>,
    pub providers: Option<ProvidersConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JobQueueConfig {
    pub tick_interval_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
    pub retention_secs: Option<u64>,
    pub default_max_attempts: Option<u32>,
    pub handler_timeout_secs: Option<u64>,
    pub initial_backoff_secs: Option<u64>,
    pub max_backoff_secs: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub jitter_ratio: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FreshnessConfig {
    /// Data type name ("enrichment", "sampling", "scoring") to TTL in seconds.
    pub ttl_overrides: HashMap<String, u64>,
    pub subject_reuse_window_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Base URL of the stage provider service. Stage requests are POSTed to `{base_url}/{stage}`.
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
