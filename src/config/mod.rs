mod file_config;

pub use file_config::{FileConfig, FreshnessConfig, JobQueueConfig, ProvidersConfig};

use crate::freshness::DataType;
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub metrics_port: u16,
    pub tick_interval_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
    pub retention_secs: Option<u64>,
    pub provider_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub metrics_port: u16,

    pub job_queue: JobQueueSettings,
    pub freshness: FreshnessSettings,
    pub providers: ProviderSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let defaults = JobQueueSettings::default();
        let jq_file = file.job_queue.unwrap_or_default();
        let job_queue = JobQueueSettings {
            tick_interval_secs: jq_file
                .tick_interval_secs
                .or(cli.tick_interval_secs)
                .unwrap_or(defaults.tick_interval_secs),
            cleanup_interval_secs: jq_file
                .cleanup_interval_secs
                .or(cli.cleanup_interval_secs)
                .unwrap_or(defaults.cleanup_interval_secs),
            retention_secs: jq_file
                .retention_secs
                .or(cli.retention_secs)
                .unwrap_or(defaults.retention_secs),
            default_max_attempts: jq_file
                .default_max_attempts
                .unwrap_or(defaults.default_max_attempts),
            handler_timeout_secs: jq_file
                .handler_timeout_secs
                .unwrap_or(defaults.handler_timeout_secs),
            initial_backoff_secs: jq_file
                .initial_backoff_secs
                .unwrap_or(defaults.initial_backoff_secs),
            max_backoff_secs: jq_file.max_backoff_secs.unwrap_or(defaults.max_backoff_secs),
            backoff_multiplier: jq_file
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
            jitter_ratio: jq_file.jitter_ratio.unwrap_or(defaults.jitter_ratio),
        };
        job_queue.validate()?;

        let fr_file = file.freshness.unwrap_or_default();
        let mut ttl_overrides = HashMap::new();
        for (name, secs) in &fr_file.ttl_overrides {
            let Some(data_type) = DataType::from_str(name) else {
                bail!("Unknown data type in freshness.ttl_overrides: {}", name);
            };
            ttl_overrides.insert(data_type, *secs);
        }
        let freshness = FreshnessSettings {
            ttl_overrides,
            subject_reuse_window_secs: fr_file
                .subject_reuse_window_secs
                .unwrap_or(DEFAULT_SUBJECT_REUSE_WINDOW_SECS),
        };

        let pv_file = file.providers.unwrap_or_default();
        let providers = ProviderSettings {
            base_url: pv_file.base_url.or_else(|| cli.provider_url.clone()),
            timeout_secs: pv_file
                .timeout_secs
                .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS),
        };

        Ok(Self {
            db_dir,
            metrics_port,
            job_queue,
            freshness,
            providers,
        })
    }

    pub fn freshness_db_path(&self) -> PathBuf {
        self.db_dir.join("freshness.db")
    }
}

pub const DEFAULT_SUBJECT_REUSE_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;
/// Upper bound for `job_queue.max_backoff_secs`.
pub const MAX_BACKOFF_LIMIT_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct JobQueueSettings {
    pub tick_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    /// How long terminal jobs are kept before the cleanup sweep removes them.
    pub retention_secs: u64,
    pub default_max_attempts: u32,
    pub handler_timeout_secs: u64,
    // Retry backoff
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
    pub jitter_ratio: f64,
}

impl JobQueueSettings {
    fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            bail!("job_queue.tick_interval_secs must be greater than 0");
        }
        if self.cleanup_interval_secs == 0 {
            bail!("job_queue.cleanup_interval_secs must be greater than 0");
        }
        if self.default_max_attempts == 0 {
            bail!("job_queue.default_max_attempts must be at least 1");
        }
        if self.handler_timeout_secs == 0 {
            bail!("job_queue.handler_timeout_secs must be greater than 0");
        }
        if self.max_backoff_secs > MAX_BACKOFF_LIMIT_SECS {
            bail!(
                "job_queue.max_backoff_secs must be at most {}",
                MAX_BACKOFF_LIMIT_SECS
            );
        }
        if self.initial_backoff_secs > self.max_backoff_secs {
            bail!("job_queue.initial_backoff_secs must not exceed max_backoff_secs");
        }
        if self.backoff_multiplier < 1.0 {
            bail!("job_queue.backoff_multiplier must be at least 1.0");
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            bail!("job_queue.jitter_ratio must be between 0.0 and 1.0");
        }
        Ok(())
    }
}

impl Default for JobQueueSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            cleanup_interval_secs: 3600,
            retention_secs: 86400, // 24 hours
            default_max_attempts: 3,
            handler_timeout_secs: 300,
            initial_backoff_secs: 5,
            max_backoff_secs: 300,
            backoff_multiplier: 2.0,
            jitter_ratio: 0.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FreshnessSettings {
    /// Static TTLs in seconds, used when the repository has no configured value.
    pub ttl_overrides: HashMap<DataType, u64>,
    pub subject_reuse_window_secs: u64,
}

impl Default for FreshnessSettings {
    fn default() -> Self {
        Self {
            ttl_overrides: HashMap::new(),
            subject_reuse_window_secs: DEFAULT_SUBJECT_REUSE_WINDOW_SECS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
        }
    }
}
