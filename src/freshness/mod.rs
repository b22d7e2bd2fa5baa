//! Freshness and entity resolution.
//!
//! Tracks when data for an external identity was last refreshed so the job
//! handlers can skip provider calls whose results would be identical.

mod audit_logger;
mod models;
mod registry;
mod schema;
mod store;

pub use audit_logger::FreshnessAuditLogger;
pub use models::{
    DataType, FreshnessAuditEntry, FreshnessCheck, FreshnessEventType, FreshnessRecord, Subject,
    SubjectResolution, WorkDecision, WorkReason,
};
pub use registry::FreshnessRegistry;
pub use store::{FreshnessStore, SqliteFreshnessStore};
