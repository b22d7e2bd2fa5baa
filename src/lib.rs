//! Visibility Engine Library
//!
//! Job orchestration for AI-visibility tracking: a priority job queue, the
//! dispatch loop that advances it, pipeline chaining between analysis stages
//! and the freshness registry that keeps expensive provider work from being
//! repeated.

pub mod clock;
pub mod config;
pub mod freshness;
pub mod handlers;
pub mod jobs;
pub mod metrics;
pub mod providers;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use freshness::{FreshnessRegistry, FreshnessStore, SqliteFreshnessStore};
pub use jobs::{Dispatcher, HandlerRegistry, JobQueue, JobsHandle};
