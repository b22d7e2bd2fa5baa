//! Queue gauge tests
//!
//! The gauge is process-wide, so these live in their own test binary and
//! run as a single test.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use visibility_engine::config::JobQueueSettings;
use visibility_engine::jobs::{
    Dispatcher, HandlerContext, HandlerRegistry, JobPayload, JobQueue, JobType, RetryPolicy,
    TickOutcome,
};
use visibility_engine::metrics::QUEUE_JOBS;

fn gauge(status: &str) -> f64 {
    QUEUE_JOBS.with_label_values(&[status]).get()
}

fn recommendation(subject: &str) -> JobPayload {
    JobPayload::RecommendationGeneration {
        subject_id: subject.into(),
    }
}

#[tokio::test]
async fn test_queue_gauge_follows_every_change() {
    let queue = Arc::new(JobQueue::default());
    let mut registry = HandlerRegistry::new();
    registry.register_fn(JobType::RecommendationGeneration, |_job, _ctx| async move {
        Ok(serde_json::json!({ "recommendations": 1 }))
    });
    let dispatcher = Dispatcher::new(
        queue.clone(),
        Arc::new(registry),
        HandlerContext::new(CancellationToken::new()),
        &JobQueueSettings::default(),
    )
    .with_retry_policy(RetryPolicy::immediate());

    let first = queue.add_job(recommendation("b1"), 5, None).await.unwrap();
    queue.add_job(recommendation("b2"), 1, None).await.unwrap();
    assert_eq!(gauge("pending"), 2.0);
    assert_eq!(gauge("completed"), 0.0);

    assert_eq!(dispatcher.tick().await, TickOutcome::Completed(first));
    assert_eq!(gauge("pending"), 1.0);
    assert_eq!(gauge("running"), 0.0);
    assert_eq!(gauge("completed"), 1.0);

    assert_eq!(queue.clear_completed_jobs(Duration::ZERO).await, 1);
    assert_eq!(gauge("pending"), 1.0);
    assert_eq!(gauge("completed"), 0.0);
}
