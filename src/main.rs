use anyhow::{Context, Result};
use axum::{routing::get, Router};
use clap::Parser;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use visibility_engine::clock::{Clock, SystemClock};
use visibility_engine::config::{AppConfig, CliConfig, FileConfig};
use visibility_engine::freshness::{FreshnessRegistry, SqliteFreshnessStore};
use visibility_engine::handlers::register_default_handlers;
use visibility_engine::jobs::{
    spawn_cleanup_task, Dispatcher, HandlerContext, HandlerRegistry, JobQueue, JobsHandle,
};
use visibility_engine::metrics;
use visibility_engine::providers::HttpStageProvider;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the freshness database.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// Seconds between dispatch ticks.
    #[clap(long)]
    pub tick_interval_secs: Option<u64>,

    /// Seconds between sweeps of terminal jobs.
    #[clap(long)]
    pub cleanup_interval_secs: Option<u64>,

    /// Seconds a completed or failed job is kept before the sweep removes it.
    #[clap(long)]
    pub retention_secs: Option<u64>,

    /// Base URL of the stage provider service.
    #[clap(long)]
    pub provider_url: Option<String>,

    /// Domain to enrich at startup. Can be repeated.
    #[clap(long = "enqueue-domain")]
    pub enqueue_domains: Vec<String>,

    /// Priority of the startup enrichment jobs.
    #[clap(long, default_value_t = 8)]
    pub enqueue_priority: i32,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            metrics_port: self.metrics_port,
            tick_interval_secs: self.tick_interval_secs,
            cleanup_interval_secs: self.cleanup_interval_secs,
            retention_secs: self.retention_secs,
            provider_url: self.provider_url.clone(),
        }
    }
}

async fn run_metrics_server(port: u16, shutdown: CancellationToken) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics::metrics_handler));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", port))?;
    info!("Metrics available at port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    let freshness_db = config.freshness_db_path();
    info!("Opening freshness database at {:?}...", freshness_db);
    let store = Arc::new(SqliteFreshnessStore::new(&freshness_db)?);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let freshness = Arc::new(FreshnessRegistry::new(
        store,
        clock.clone(),
        &config.freshness,
    ));

    let provider_url = config
        .providers
        .base_url
        .as_deref()
        .context("A stage provider URL is required (--provider-url or [providers] base_url)")?;
    info!("Stage provider configured at {}", provider_url);
    let provider = Arc::new(HttpStageProvider::new(
        provider_url,
        config.providers.timeout_secs,
    )?);

    let mut registry = HandlerRegistry::new();
    register_default_handlers(&mut registry, provider);

    let queue = Arc::new(JobQueue::with_default_max_attempts(
        clock,
        config.job_queue.default_max_attempts,
    ));
    let shutdown = CancellationToken::new();
    let ctx = HandlerContext::new(shutdown.child_token()).with_freshness(freshness.clone());
    let dispatcher = Dispatcher::new(queue.clone(), Arc::new(registry), ctx, &config.job_queue);
    let handle = JobsHandle::new(queue.clone()).with_freshness(freshness);

    let cleanup = spawn_cleanup_task(
        queue.clone(),
        Duration::from_secs(config.job_queue.cleanup_interval_secs),
        Duration::from_secs(config.job_queue.retention_secs),
        shutdown.clone(),
    );

    let metrics_shutdown = shutdown.clone();
    let metrics_port = config.metrics_port;
    let metrics_server = tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_port, metrics_shutdown).await {
            error!("Metrics server error: {:#}", e);
        }
    });

    for domain in &cli_args.enqueue_domains {
        match handle
            .trigger_enrichment_for_domain(domain, JsonValue::Null, cli_args.enqueue_priority)
            .await
        {
            Ok(enrichment) => info!(
                "Startup enrichment for {}: subject {}, job {:?}",
                domain, enrichment.subject_id, enrichment.job_id
            ),
            Err(e) => error!("Failed to enqueue enrichment for {}: {}", domain, e),
        }
    }

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        signal_shutdown.cancel();
    });

    dispatcher.run(shutdown.clone()).await;

    let stats = handle.get_stats().await;
    info!(
        "Stopped with {} pending, {} completed, {} failed jobs",
        stats.pending, stats.completed, stats.failed
    );

    let _ = cleanup.await;
    let _ = metrics_server.await;
    Ok(())
}
