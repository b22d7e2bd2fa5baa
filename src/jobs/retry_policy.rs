//! Retry policy for failed job attempts.
//!
//! Implements exponential backoff with a cap and random jitter. The result is
//! stored on the job as `next_eligible_at`, so a retried job re-competes by
//! priority only once its backoff has elapsed.

use crate::config::JobQueueSettings;
use crate::jobs::JobError;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Backoff after the first failed attempt, in seconds.
    pub initial_backoff_secs: u64,
    /// Cap for exponential growth, in seconds.
    pub max_backoff_secs: u64,
    /// Multiplier applied for every further failed attempt.
    pub backoff_multiplier: f64,
    /// Fraction of the backoff added as random jitter (0.0 disables it).
    pub jitter_ratio: f64,
}

impl RetryPolicy {
    pub fn new(settings: &JobQueueSettings) -> Self {
        Self {
            initial_backoff_secs: settings.initial_backoff_secs,
            max_backoff_secs: settings.max_backoff_secs,
            backoff_multiplier: settings.backoff_multiplier,
            jitter_ratio: settings.jitter_ratio,
        }
    }

    /// Policy with no delay between attempts.
    pub fn immediate() -> Self {
        Self {
            initial_backoff_secs: 0,
            max_backoff_secs: 0,
            backoff_multiplier: 1.0,
            jitter_ratio: 0.0,
        }
    }

    /// Whether a job that just failed its `attempts`-th attempt gets another one.
    pub fn should_retry(&self, error: &JobError, attempts: u32, max_attempts: u32) -> bool {
        error.is_retryable() && attempts < max_attempts
    }

    /// Backoff in seconds after `attempts` failed attempts, without jitter.
    ///
    /// `initial_backoff * multiplier^(attempts - 1)`, capped at `max_backoff_secs`.
    pub fn backoff_secs(&self, attempts: u32) -> u64 {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff = self.initial_backoff_secs as f64 * self.backoff_multiplier.powi(exponent);
        backoff.min(self.max_backoff_secs as f64).max(0.0) as u64
    }

    /// Instant at which a job that failed `attempts` times becomes eligible again.
    ///
    /// Saturates at the latest representable instant.
    pub fn next_eligible_at(&self, now: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
        let base_ms = self.backoff_secs(attempts) as f64 * 1000.0;
        let jitter_ms = if self.jitter_ratio > 0.0 {
            base_ms * self.jitter_ratio * rand::random::<f64>()
        } else {
            0.0
        };
        chrono::Duration::try_milliseconds((base_ms + jitter_ms) as i64)
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&JobQueueSettings::default())
    }
}
