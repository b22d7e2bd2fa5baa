//! Repository for freshness records, subjects, TTL config and audit entries.

use super::models::{DataType, FreshnessAuditEntry, FreshnessEventType, FreshnessRecord, Subject};
use super::schema::FRESHNESS_VERSIONED_SCHEMAS;
use crate::jobs::SubjectId;
use crate::sqlite_persistence::migrate_if_needed;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// Storage backend for the freshness registry.
///
/// Implementations serialize their own writes.
pub trait FreshnessStore: Send + Sync {
    fn get_record_by_key(&self, subject_key: &str) -> Result<Option<FreshnessRecord>>;

    /// Most recently refreshed record pointing at `subject_id`.
    fn get_record_by_subject(&self, subject_id: &SubjectId) -> Result<Option<FreshnessRecord>>;

    /// Insert or replace the record for `record.subject_key`.
    fn upsert_record(&self, record: &FreshnessRecord) -> Result<()>;

    /// Set `last_refreshed_at` on every record of a subject. Returns the number of updated rows.
    fn set_refreshed_at_for_subject(&self, subject_id: &SubjectId, at: DateTime<Utc>) -> Result<usize>;

    fn get_subject(&self, subject_id: &SubjectId) -> Result<Option<Subject>>;

    fn create_subject(&self, subject: &Subject) -> Result<()>;

    /// Most recently created subject for an external identity.
    fn find_latest_subject_by_key(&self, subject_key: &str) -> Result<Option<Subject>>;

    /// Configured TTL for a data type, if any.
    fn get_ttl_secs(&self, data_type: DataType) -> Result<Option<i64>>;

    fn set_ttl_secs(&self, data_type: DataType, ttl_secs: i64) -> Result<()>;

    fn log_audit_event(&self, entry: FreshnessAuditEntry) -> Result<()>;

    /// Audit entries for a subject, newest first.
    fn get_audit_log(&self, subject_id: &SubjectId, limit: usize) -> Result<Vec<FreshnessAuditEntry>>;
}

/// SQLite-backed freshness store.
#[derive(Clone)]
pub struct SqliteFreshnessStore {
    read_conn: Arc<Mutex<Connection>>,
    write_conn: Arc<Mutex<Connection>>,
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| anyhow!("freshness db connection mutex poisoned"))
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<FreshnessRecord> {
    Ok(FreshnessRecord {
        subject_key: row.get(0)?,
        subject_id: SubjectId::new(row.get::<_, String>(1)?),
        last_refreshed_at: millis_to_datetime(row.get(2)?),
    })
}

fn row_to_subject(row: &rusqlite::Row) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: SubjectId::new(row.get::<_, String>(0)?),
        subject_key: row.get(1)?,
        attributes: parse_json(row.get(2)?).unwrap_or(serde_json::Value::Null),
        created_at: millis_to_datetime(row.get(3)?),
    })
}

fn parse_json(raw: Option<String>) -> Option<serde_json::Value> {
    raw.and_then(|json| {
        serde_json::from_str(&json)
            .map_err(|e| warn!("Malformed JSON in freshness db: {}: {}", json, e))
            .ok()
    })
}

impl SqliteFreshnessStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open freshness database")?;

        migrate_if_needed(&mut write_conn, FRESHNESS_VERSIONED_SCHEMAS, "freshness")?;

        write_conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on freshness write connection")?;
        write_conn
            .pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys on freshness write connection")?;

        let read_conn = Connection::open_with_flags(
            db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open freshness database for reading")?;

        let record_count: usize =
            read_conn.query_row("SELECT COUNT(*) FROM freshness_records", [], |r| r.get(0))?;
        info!("Freshness store ready: {} tracked subjects", record_count);

        Ok(Self {
            read_conn: Arc::new(Mutex::new(read_conn)),
            write_conn: Arc::new(Mutex::new(write_conn)),
        })
    }
}

impl FreshnessStore for SqliteFreshnessStore {
    fn get_record_by_key(&self, subject_key: &str) -> Result<Option<FreshnessRecord>> {
        let conn = lock(&self.read_conn)?;
        let mut stmt = conn.prepare_cached(
            "SELECT subject_key, subject_id, last_refreshed_at
             FROM freshness_records WHERE subject_key = ?1",
        )?;
        Ok(stmt.query_row(params![subject_key], row_to_record).optional()?)
    }

    fn get_record_by_subject(&self, subject_id: &SubjectId) -> Result<Option<FreshnessRecord>> {
        let conn = lock(&self.read_conn)?;
        let mut stmt = conn.prepare_cached(
            "SELECT subject_key, subject_id, last_refreshed_at
             FROM freshness_records WHERE subject_id = ?1
             ORDER BY last_refreshed_at DESC LIMIT 1",
        )?;
        Ok(stmt
            .query_row(params![subject_id.as_str()], row_to_record)
            .optional()?)
    }

    fn upsert_record(&self, record: &FreshnessRecord) -> Result<()> {
        let conn = lock(&self.write_conn)?;
        conn.execute(
            "INSERT INTO freshness_records (subject_key, subject_id, last_refreshed_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(subject_key) DO UPDATE SET
                subject_id = excluded.subject_id,
                last_refreshed_at = excluded.last_refreshed_at",
            params![
                record.subject_key,
                record.subject_id.as_str(),
                record.last_refreshed_at.timestamp_millis()
            ],
        )
        .with_context(|| format!("Failed to upsert freshness record for {}", record.subject_key))?;
        Ok(())
    }

    fn set_refreshed_at_for_subject(&self, subject_id: &SubjectId, at: DateTime<Utc>) -> Result<usize> {
        let conn = lock(&self.write_conn)?;
        let updated = conn.execute(
            "UPDATE freshness_records SET last_refreshed_at = ?1 WHERE subject_id = ?2",
            params![at.timestamp_millis(), subject_id.as_str()],
        )?;
        Ok(updated)
    }

    fn get_subject(&self, subject_id: &SubjectId) -> Result<Option<Subject>> {
        let conn = lock(&self.read_conn)?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, subject_key, attributes, created_at FROM subjects WHERE id = ?1",
        )?;
        Ok(stmt
            .query_row(params![subject_id.as_str()], row_to_subject)
            .optional()?)
    }

    fn find_latest_subject_by_key(&self, subject_key: &str) -> Result<Option<Subject>> {
        let conn = lock(&self.read_conn)?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, subject_key, attributes, created_at FROM subjects
             WHERE subject_key = ?1 ORDER BY created_at DESC LIMIT 1",
        )?;
        Ok(stmt.query_row(params![subject_key], row_to_subject).optional()?)
    }

    fn create_subject(&self, subject: &Subject) -> Result<()> {
        let attributes = if subject.attributes.is_null() {
            None
        } else {
            Some(subject.attributes.to_string())
        };
        let conn = lock(&self.write_conn)?;
        conn.execute(
            "INSERT INTO subjects (id, subject_key, attributes, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                subject.id.as_str(),
                subject.subject_key,
                attributes,
                subject.created_at.timestamp_millis()
            ],
        )
        .with_context(|| format!("Failed to create subject {}", subject.id))?;
        Ok(())
    }

    fn get_ttl_secs(&self, data_type: DataType) -> Result<Option<i64>> {
        let conn = lock(&self.read_conn)?;
        let ttl = conn
            .query_row(
                "SELECT ttl_secs FROM freshness_config WHERE data_type = ?1",
                params![data_type.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ttl)
    }

    fn set_ttl_secs(&self, data_type: DataType, ttl_secs: i64) -> Result<()> {
        let conn = lock(&self.write_conn)?;
        conn.execute(
            "INSERT OR REPLACE INTO freshness_config (data_type, ttl_secs) VALUES (?1, ?2)",
            params![data_type.as_str(), ttl_secs],
        )?;
        Ok(())
    }

    fn log_audit_event(&self, entry: FreshnessAuditEntry) -> Result<()> {
        let conn = lock(&self.write_conn)?;
        conn.execute(
            "INSERT INTO freshness_audit_log (event_type, subject_id, subject_key, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.event_type.as_str(),
                entry.subject_id.as_ref().map(|id| id.as_str().to_string()),
                entry.subject_key,
                entry.details.as_ref().map(|d| d.to_string()),
                entry.created_at.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    fn get_audit_log(&self, subject_id: &SubjectId, limit: usize) -> Result<Vec<FreshnessAuditEntry>> {
        let conn = lock(&self.read_conn)?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, event_type, subject_id, subject_key, details, created_at
             FROM freshness_audit_log WHERE subject_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![subject_id.as_str(), limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, event_type, subject_id, subject_key, details, created_at) = row?;
            let Some(event_type) = FreshnessEventType::from_str(&event_type) else {
                warn!("Skipping audit entry {} with unknown event type {}", id, event_type);
                continue;
            };
            entries.push(FreshnessAuditEntry {
                id,
                event_type,
                subject_id: subject_id.map(SubjectId::new),
                subject_key,
                details: parse_json(details),
                created_at: millis_to_datetime(created_at),
            });
        }
        Ok(entries)
    }
}
