use super::queue::JobQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Periodically drop terminal jobs older than `retention`.
///
/// The first sweep happens one `interval` after spawning.
pub fn spawn_cleanup_task(
    queue: Arc<JobQueue>,
    interval: Duration,
    retention: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let interval = interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        info!(
            "Job cleanup sweep every {:?}, retention {:?}",
            interval, retention
        );
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = queue.clear_completed_jobs(retention).await;
                    if removed > 0 {
                        info!("Cleanup removed {} terminal jobs", removed);
                    } else {
                        debug!("Cleanup found no expired jobs");
                    }
                }
                _ = shutdown.cancelled() => {
                    debug!("Cleanup task shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::jobs::models::{JobPayload, JobStatus};
    use serde_json::json;

    #[tokio::test]
    async fn test_sweep_removes_expired_terminal_jobs() {
        let clock = Arc::new(ManualClock::starting_now());
        let queue = Arc::new(JobQueue::new(clock.clone()));

        let done = queue
            .add_job(
                JobPayload::GapAnalysis {
                    subject_id: "s1".into(),
                },
                1,
                None,
            )
            .await
            .unwrap();
        let pending = queue
            .add_job(
                JobPayload::GapAnalysis {
                    subject_id: "s2".into(),
                },
                1,
                None,
            )
            .await
            .unwrap();
        queue.mark_running(&done, clock.now()).await.unwrap();
        queue
            .mark_completed(&done, json!({}), clock.now())
            .await
            .unwrap();
        clock.advance(chrono::Duration::hours(2));

        let shutdown = CancellationToken::new();
        let handle = spawn_cleanup_task(
            queue.clone(),
            Duration::from_millis(20),
            Duration::from_secs(3600),
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(queue.get_job(&done).await.is_none());
        assert_eq!(
            queue.get_job(&pending).await.unwrap().status,
            JobStatus::Pending
        );

        shutdown.cancel();
        handle.await.unwrap();
    }
}
