//! Data models for the freshness registry.

use crate::jobs::SubjectId;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;

/// Kind of externally sourced data whose freshness is tracked.
///
/// Only selects the TTL: a subject has a single refresh timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Enrichment,
    Sampling,
    Scoring,
}

impl DataType {
    pub const ALL: [DataType; 3] = [DataType::Enrichment, DataType::Sampling, DataType::Scoring];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Enrichment => "enrichment",
            DataType::Sampling => "sampling",
            DataType::Scoring => "scoring",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        DataType::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Built-in TTL used when neither the repository nor the config override it.
    pub fn default_ttl(&self) -> Duration {
        match self {
            DataType::Enrichment => Duration::days(7),
            DataType::Sampling => Duration::days(1),
            DataType::Scoring => Duration::hours(6),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A business entity known to the system.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub id: SubjectId,
    /// External identity, e.g. a normalized domain.
    pub subject_key: String,
    pub attributes: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Authoritative refresh timestamp for one external identity.
#[derive(Debug, Clone, PartialEq)]
pub struct FreshnessRecord {
    pub subject_key: String,
    pub subject_id: SubjectId,
    pub last_refreshed_at: DateTime<Utc>,
}

impl FreshnessRecord {
    /// A forced refresh resets the timestamp to the epoch.
    pub fn is_invalidated(&self) -> bool {
        self.last_refreshed_at.timestamp_millis() <= 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FreshnessCheck {
    pub exists: bool,
    pub subject_id: Option<SubjectId>,
    pub last_refreshed: Option<DateTime<Utc>>,
    pub is_fresh: bool,
}

impl FreshnessCheck {
    pub fn missing() -> Self {
        Self {
            exists: false,
            subject_id: None,
            last_refreshed: None,
            is_fresh: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkReason {
    NoRecord,
    Stale,
    Fresh,
    /// The record or its TTL could not be read; work is done anyway.
    LookupFailed,
}

impl WorkReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkReason::NoRecord => "no_record",
            WorkReason::Stale => "stale",
            WorkReason::Fresh => "fresh",
            WorkReason::LookupFailed => "lookup_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkDecision {
    pub needs: bool,
    pub reason: WorkReason,
}

impl WorkDecision {
    pub fn needed(reason: WorkReason) -> Self {
        Self { needs: true, reason }
    }

    pub fn not_needed() -> Self {
        Self {
            needs: false,
            reason: WorkReason::Fresh,
        }
    }
}

/// Outcome of resolving an external identity to a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectResolution {
    pub subject_id: SubjectId,
    /// A subject was created by this call.
    pub is_new: bool,
    /// The subject's data is fresh, so enrichment can be skipped.
    pub can_reuse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessEventType {
    WorkRegistered,
    SubjectCreated,
    /// A freshness record was moved to a newly created subject.
    SubjectReplaced,
    ForceRefresh,
}

impl FreshnessEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FreshnessEventType::WorkRegistered => "WORK_REGISTERED",
            FreshnessEventType::SubjectCreated => "SUBJECT_CREATED",
            FreshnessEventType::SubjectReplaced => "SUBJECT_REPLACED",
            FreshnessEventType::ForceRefresh => "FORCE_REFRESH",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "WORK_REGISTERED" => Some(FreshnessEventType::WorkRegistered),
            "SUBJECT_CREATED" => Some(FreshnessEventType::SubjectCreated),
            "SUBJECT_REPLACED" => Some(FreshnessEventType::SubjectReplaced),
            "FORCE_REFRESH" => Some(FreshnessEventType::ForceRefresh),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FreshnessAuditEntry {
    pub id: i64,
    pub event_type: FreshnessEventType,
    pub subject_id: Option<SubjectId>,
    pub subject_key: Option<String>,
    pub details: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

impl FreshnessAuditEntry {
    /// Entry with id 0; the store assigns the real id on insert.
    pub fn new(event_type: FreshnessEventType, created_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            event_type,
            subject_id: None,
            subject_key: None,
            details: None,
            created_at,
        }
    }

    pub fn with_subject(mut self, subject_id: SubjectId) -> Self {
        self.subject_id = Some(subject_id);
        self
    }

    pub fn with_subject_key(mut self, subject_key: impl Into<String>) -> Self {
        self.subject_key = Some(subject_key.into());
        self
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttls() {
        assert_eq!(DataType::Enrichment.default_ttl(), Duration::days(7));
        assert_eq!(DataType::Sampling.default_ttl(), Duration::days(1));
        assert_eq!(DataType::Scoring.default_ttl(), Duration::hours(6));
    }

    #[test]
    fn test_data_type_names() {
        for data_type in DataType::ALL {
            assert_eq!(DataType::from_str(data_type.as_str()), Some(data_type));
        }
        assert_eq!(DataType::from_str("ENRICHMENT"), None);
    }

    #[test]
    fn test_audit_entry_builder() {
        let now = Utc::now();
        let entry = FreshnessAuditEntry::new(FreshnessEventType::ForceRefresh, now)
            .with_subject("s1".into())
            .with_subject_key("acme.com")
            .with_details(serde_json::json!({ "reason": "bad data" }));

        assert_eq!(entry.event_type, FreshnessEventType::ForceRefresh);
        assert_eq!(entry.subject_id.unwrap().as_str(), "s1");
        assert_eq!(entry.subject_key.as_deref(), Some("acme.com"));
        assert_eq!(entry.details.unwrap()["reason"], "bad data");
    }
}
