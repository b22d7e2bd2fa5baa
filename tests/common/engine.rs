use super::FakeProvider;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use visibility_engine::clock::ManualClock;
use visibility_engine::config::{FreshnessSettings, JobQueueSettings};
use visibility_engine::freshness::{FreshnessRegistry, SqliteFreshnessStore};
use visibility_engine::handlers::register_default_handlers;
use visibility_engine::jobs::{
    Dispatcher, HandlerContext, HandlerRegistry, JobQueue, JobStats, JobsHandle, RetryPolicy,
    TickOutcome,
};

/// Upper bound on ticks for `run_until_idle`, so a chaining bug cannot loop forever.
const MAX_TICKS: usize = 100;

pub struct TestEngine {
    pub queue: Arc<JobQueue>,
    pub dispatcher: Dispatcher,
    pub handle: JobsHandle,
    pub freshness: Arc<FreshnessRegistry>,
    pub store: Arc<SqliteFreshnessStore>,
    pub clock: Arc<ManualClock>,
    pub provider: Arc<FakeProvider>,
    _temp_dir: TempDir,
}

impl TestEngine {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteFreshnessStore::new(temp_dir.path().join("freshness.db"))
                .expect("Failed to open freshness store"),
        );
        let clock = Arc::new(ManualClock::starting_now());
        let freshness = Arc::new(FreshnessRegistry::new(
            store.clone(),
            clock.clone(),
            &FreshnessSettings::default(),
        ));

        let provider = Arc::new(FakeProvider::default());
        let mut registry = HandlerRegistry::new();
        register_default_handlers(&mut registry, provider.clone());

        let queue = Arc::new(JobQueue::new(clock.clone()));
        let ctx = HandlerContext::new(CancellationToken::new()).with_freshness(freshness.clone());
        let dispatcher = Dispatcher::new(
            queue.clone(),
            Arc::new(registry),
            ctx,
            &JobQueueSettings::default(),
        )
        .with_retry_policy(RetryPolicy::immediate());
        let handle = JobsHandle::new(queue.clone()).with_freshness(freshness.clone());

        Self {
            queue,
            dispatcher,
            handle,
            freshness,
            store,
            clock,
            provider,
            _temp_dir: temp_dir,
        }
    }

    /// Tick until the queue has nothing eligible. Returns every non-idle outcome.
    pub async fn run_until_idle(&self) -> Vec<TickOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..MAX_TICKS {
            let outcome = self.dispatcher.tick().await;
            if outcome == TickOutcome::Idle {
                return outcomes;
            }
            outcomes.push(outcome);
            assert_stats_consistent(&self.queue.get_stats().await);
        }
        panic!("queue did not drain within {} ticks", MAX_TICKS);
    }
}

pub fn assert_stats_consistent(stats: &JobStats) {
    assert_eq!(
        stats.total,
        stats.pending + stats.running + stats.completed + stats.failed,
        "inconsistent stats: {:?}",
        stats
    );
}
