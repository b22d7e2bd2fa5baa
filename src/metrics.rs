use crate::freshness::{DataType, WorkReason};
use crate::jobs::{JobStats, JobType};
use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all engine metrics
const PREFIX: &str = "visibility";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Job queue
    pub static ref JOBS_ENQUEUED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_enqueued_total"), "Total jobs added to the queue"),
        &["job_type"]
    ).expect("Failed to create jobs_enqueued_total metric");

    pub static ref JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_job_executions_total"), "Total handler executions by outcome"),
        &["job_type", "outcome"]
    ).expect("Failed to create job_executions_total metric");

    pub static ref JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_duration_seconds"),
            "Handler execution time in seconds"
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0]),
        &["job_type"]
    ).expect("Failed to create job_duration_seconds metric");

    pub static ref QUEUE_JOBS: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_queue_jobs"), "Jobs currently held by the queue"),
        &["status"]
    ).expect("Failed to create queue_jobs metric");

    pub static ref CHAINING_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_chaining_failures_total"), "Pipeline stages that could not be enqueued"),
        &["from", "to"]
    ).expect("Failed to create chaining_failures_total metric");

    // Freshness
    pub static ref FRESHNESS_DECISIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_freshness_decisions_total"), "Freshness checks by outcome"),
        &["data_type", "reason"]
    ).expect("Failed to create freshness_decisions_total metric");
}

/// Register all metrics with the Prometheus registry
pub fn init_metrics() {
    // Already registered is fine (tests call this repeatedly)
    let _ = REGISTRY.register(Box::new(JOBS_ENQUEUED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_JOBS.clone()));
    let _ = REGISTRY.register(Box::new(CHAINING_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FRESHNESS_DECISIONS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_job_enqueued(job_type: JobType) {
    JOBS_ENQUEUED_TOTAL
        .with_label_values(&[job_type.as_str()])
        .inc();
}

/// Record one handler execution. `outcome` is "completed", "retrying" or "failed".
pub fn record_job_execution(job_type: JobType, outcome: &str, duration: Duration) {
    JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_type.as_str(), outcome])
        .inc();

    JOB_DURATION_SECONDS
        .with_label_values(&[job_type.as_str()])
        .observe(duration.as_secs_f64());
}

pub fn set_queue_size(stats: &JobStats) {
    QUEUE_JOBS
        .with_label_values(&["pending"])
        .set(stats.pending as f64);
    QUEUE_JOBS
        .with_label_values(&["running"])
        .set(stats.running as f64);
    QUEUE_JOBS
        .with_label_values(&["completed"])
        .set(stats.completed as f64);
    QUEUE_JOBS
        .with_label_values(&["failed"])
        .set(stats.failed as f64);
}

pub fn record_chaining_failure(from: JobType, to: JobType) {
    CHAINING_FAILURES_TOTAL
        .with_label_values(&[from.as_str(), to.as_str()])
        .inc();
}

pub fn record_freshness_decision(data_type: DataType, reason: WorkReason) {
    FRESHNESS_DECISIONS_TOTAL
        .with_label_values(&[data_type.as_str(), reason.as_str()])
        .inc();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
