//! Audit logging for freshness decisions that change state.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::models::{FreshnessAuditEntry, FreshnessEventType, FreshnessRecord};
use super::store::FreshnessStore;
use crate::jobs::SubjectId;

pub struct FreshnessAuditLogger {
    store: Arc<dyn FreshnessStore>,
}

impl FreshnessAuditLogger {
    pub fn new(store: Arc<dyn FreshnessStore>) -> Self {
        Self { store }
    }

    pub fn log_work_registered(&self, record: &FreshnessRecord) -> Result<()> {
        let entry = FreshnessAuditEntry::new(FreshnessEventType::WorkRegistered, record.last_refreshed_at)
            .with_subject(record.subject_id.clone())
            .with_subject_key(record.subject_key.clone());
        self.store.log_audit_event(entry)
    }

    pub fn log_subject_created(
        &self,
        subject_id: &SubjectId,
        subject_key: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = FreshnessAuditEntry::new(FreshnessEventType::SubjectCreated, at)
            .with_subject(subject_id.clone())
            .with_subject_key(subject_key);
        self.store.log_audit_event(entry)
    }

    /// Log a stale record being moved from `previous` to a new subject.
    pub fn log_subject_replaced(
        &self,
        previous: &FreshnessRecord,
        new_subject_id: &SubjectId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = FreshnessAuditEntry::new(FreshnessEventType::SubjectReplaced, at)
            .with_subject(new_subject_id.clone())
            .with_subject_key(previous.subject_key.clone())
            .with_details(serde_json::json!({
                "previous_subject_id": previous.subject_id.as_str(),
                "previous_refreshed_at": previous.last_refreshed_at.to_rfc3339(),
            }));
        self.store.log_audit_event(entry)
    }

    pub fn log_force_refresh(
        &self,
        subject_id: &SubjectId,
        reason: &str,
        records_invalidated: usize,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = FreshnessAuditEntry::new(FreshnessEventType::ForceRefresh, at)
            .with_subject(subject_id.clone())
            .with_details(serde_json::json!({
                "reason": reason,
                "records_invalidated": records_invalidated,
            }));
        self.store.log_audit_event(entry)
    }
}
