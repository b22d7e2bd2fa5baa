//! Freshness and entity-resolution registry.
//!
//! Keeps one refresh timestamp per external identity (`subject_key`) and uses
//! it to decide whether expensive provider work can be skipped. TTLs come from
//! the repository's config table, then from static settings, then from the
//! built-in per-data-type defaults.

use super::audit_logger::FreshnessAuditLogger;
use super::models::{
    DataType, FreshnessCheck, FreshnessRecord, Subject, SubjectResolution, WorkDecision, WorkReason,
};
use super::store::FreshnessStore;
use crate::clock::Clock;
use crate::config::FreshnessSettings;
use crate::jobs::SubjectId;
use crate::metrics;
use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct FreshnessRegistry {
    store: Arc<dyn FreshnessStore>,
    clock: Arc<dyn Clock>,
    audit: FreshnessAuditLogger,
    ttl_overrides: HashMap<DataType, Duration>,
    subject_reuse_window: Duration,
}

impl FreshnessRegistry {
    pub fn new(store: Arc<dyn FreshnessStore>, clock: Arc<dyn Clock>, settings: &FreshnessSettings) -> Self {
        let ttl_overrides = settings
            .ttl_overrides
            .iter()
            .map(|(data_type, secs)| (*data_type, secs_to_duration(*secs)))
            .collect();
        Self {
            audit: FreshnessAuditLogger::new(store.clone()),
            store,
            clock,
            ttl_overrides,
            subject_reuse_window: secs_to_duration(settings.subject_reuse_window_secs),
        }
    }

    pub fn store(&self) -> &Arc<dyn FreshnessStore> {
        &self.store
    }

    fn static_ttl(&self, data_type: DataType) -> Duration {
        self.ttl_overrides
            .get(&data_type)
            .copied()
            .unwrap_or_else(|| data_type.default_ttl())
    }

    fn resolve_ttl(&self, data_type: DataType) -> Result<Duration> {
        match self.store.get_ttl_secs(data_type)? {
            Some(secs) => Ok(Duration::try_seconds(secs.max(0)).unwrap_or(Duration::MAX)),
            None => Ok(self.static_ttl(data_type)),
        }
    }

    /// TTL for a data type. A failed config lookup falls back to the static TTL.
    pub fn ttl(&self, data_type: DataType) -> Duration {
        self.resolve_ttl(data_type).unwrap_or_else(|e| {
            warn!(
                "Failed to read TTL for {}, using static value: {:#}",
                data_type, e
            );
            self.static_ttl(data_type)
        })
    }

    fn is_fresh_at(&self, last_refreshed: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(last_refreshed) < ttl
    }

    pub fn check_freshness(&self, subject_key: &str, data_type: DataType) -> Result<FreshnessCheck> {
        let Some(record) = self.store.get_record_by_key(subject_key)? else {
            return Ok(FreshnessCheck::missing());
        };
        let is_fresh = self.is_fresh_at(record.last_refreshed_at, self.ttl(data_type), self.clock.now());
        Ok(FreshnessCheck {
            exists: true,
            subject_id: Some(record.subject_id),
            last_refreshed: Some(record.last_refreshed_at),
            is_fresh,
        })
    }

    /// Whether costly work for `subject_id` should run.
    ///
    /// Never fails: any lookup error means the work is needed.
    pub fn needs_work(&self, subject_id: &SubjectId, data_type: DataType) -> WorkDecision {
        let decision = self.decide(subject_id, data_type);
        debug!(
            "Freshness decision for {} ({}): needs={} reason={}",
            subject_id,
            data_type,
            decision.needs,
            decision.reason.as_str()
        );
        metrics::record_freshness_decision(data_type, decision.reason);
        decision
    }

    fn decide(&self, subject_id: &SubjectId, data_type: DataType) -> WorkDecision {
        let record = match self.store.get_record_by_subject(subject_id) {
            Ok(Some(record)) => record,
            Ok(None) => return WorkDecision::needed(WorkReason::NoRecord),
            Err(e) => {
                warn!("Freshness lookup failed for {}: {:#}", subject_id, e);
                return WorkDecision::needed(WorkReason::LookupFailed);
            }
        };
        let ttl = match self.resolve_ttl(data_type) {
            Ok(ttl) => ttl,
            Err(e) => {
                warn!("TTL lookup failed for {}: {:#}", data_type, e);
                return WorkDecision::needed(WorkReason::LookupFailed);
            }
        };

        if self.is_fresh_at(record.last_refreshed_at, ttl, self.clock.now()) {
            WorkDecision::not_needed()
        } else {
            WorkDecision::needed(WorkReason::Stale)
        }
    }

    /// Record that real work for `subject_key` just completed.
    ///
    /// Registers the subject first if it is not known yet.
    pub fn register_work(&self, subject_key: &str, subject_id: &SubjectId) -> Result<()> {
        let now = self.clock.now();
        if self.store.get_subject(subject_id)?.is_none() {
            self.create_subject(subject_id.clone(), subject_key, JsonValue::Null, now)?;
        }

        let record = FreshnessRecord {
            subject_key: subject_key.to_string(),
            subject_id: subject_id.clone(),
            last_refreshed_at: now,
        };
        self.store.upsert_record(&record)?;
        if let Err(e) = self.audit.log_work_registered(&record) {
            warn!("Failed to write audit entry for {}: {:#}", subject_key, e);
        }
        Ok(())
    }

    /// Resolve an external identity to a subject.
    ///
    /// - fresh record: reuse its subject, no work needed
    /// - stale record within the reuse window, or invalidated by a force
    ///   refresh: same subject, must be refreshed
    /// - stale beyond the window: new subject, the record is moved to it
    /// - no record: reuse a subject created within the window, else create one
    pub fn get_or_create_subject(&self, subject_key: &str, attributes: JsonValue) -> Result<SubjectResolution> {
        let now = self.clock.now();

        if let Some(record) = self.store.get_record_by_key(subject_key)? {
            let age = now.signed_duration_since(record.last_refreshed_at);
            if age < self.ttl(DataType::Enrichment) {
                return Ok(SubjectResolution {
                    subject_id: record.subject_id,
                    is_new: false,
                    can_reuse: true,
                });
            }
            if age < self.subject_reuse_window || record.is_invalidated() {
                return Ok(SubjectResolution {
                    subject_id: record.subject_id,
                    is_new: false,
                    can_reuse: false,
                });
            }

            let subject_id = SubjectId::generate();
            self.create_subject(subject_id.clone(), subject_key, attributes, now)?;
            self.store.upsert_record(&FreshnessRecord {
                subject_id: subject_id.clone(),
                ..record.clone()
            })?;
            info!(
                "Replaced stale subject {} for {} with {}",
                record.subject_id, subject_key, subject_id
            );
            if let Err(e) = self.audit.log_subject_replaced(&record, &subject_id, now) {
                warn!("Failed to write audit entry for {}: {:#}", subject_key, e);
            }
            return Ok(SubjectResolution {
                subject_id,
                is_new: true,
                can_reuse: false,
            });
        }

        if let Some(subject) = self.store.find_latest_subject_by_key(subject_key)? {
            if now.signed_duration_since(subject.created_at) < self.subject_reuse_window {
                return Ok(SubjectResolution {
                    subject_id: subject.id,
                    is_new: false,
                    can_reuse: false,
                });
            }
        }

        let subject_id = SubjectId::generate();
        self.create_subject(subject_id.clone(), subject_key, attributes, now)?;
        Ok(SubjectResolution {
            subject_id,
            is_new: true,
            can_reuse: false,
        })
    }

    /// Invalidate freshness for a subject. Returns the number of invalidated records.
    pub fn force_refresh(&self, subject_id: &SubjectId, reason: &str) -> Result<usize> {
        if reason.trim().is_empty() {
            bail!("A reason is required to force a refresh");
        }
        let invalidated = self
            .store
            .set_refreshed_at_for_subject(subject_id, DateTime::<Utc>::UNIX_EPOCH)?;
        if invalidated == 0 {
            warn!("Force refresh for {}: no freshness record to invalidate", subject_id);
        } else {
            info!("Force refresh for {}: {}", subject_id, reason);
        }
        self.audit
            .log_force_refresh(subject_id, reason, invalidated, self.clock.now())?;
        Ok(invalidated)
    }

    fn create_subject(
        &self,
        subject_id: SubjectId,
        subject_key: &str,
        attributes: JsonValue,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.store.create_subject(&Subject {
            id: subject_id.clone(),
            subject_key: subject_key.to_string(),
            attributes,
            created_at: now,
        })?;
        info!("Created subject {} for {}", subject_id, subject_key);
        if let Err(e) = self.audit.log_subject_created(&subject_id, subject_key, now) {
            warn!("Failed to write audit entry for {}: {:#}", subject_key, e);
        }
        Ok(())
    }
}

fn secs_to_duration(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}
