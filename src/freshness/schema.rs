//! SQLite schema definitions for the freshness database.

use crate::sqlite_column;
use crate::sqlite_persistence::{ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema};

const SUBJECTS_TABLE: Table = Table {
    name: "subjects",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("subject_key", &SqlType::Text, non_null = true),
        sqlite_column!("attributes", &SqlType::Text), // JSON object
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_subjects_key", "subject_key")],
};

const SUBJECT_FK: ForeignKey = ForeignKey {
    foreign_table: "subjects",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

/// One row per external identity. Timestamps are unix milliseconds.
const FRESHNESS_RECORDS_TABLE: Table = Table {
    name: "freshness_records",
    columns: &[
        sqlite_column!("subject_key", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "subject_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&SUBJECT_FK)
        ),
        sqlite_column!("last_refreshed_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_freshness_subject", "subject_id")],
};

const FRESHNESS_CONFIG_TABLE: Table = Table {
    name: "freshness_config",
    columns: &[
        sqlite_column!("data_type", &SqlType::Text, is_primary_key = true),
        sqlite_column!("ttl_secs", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
};

const FRESHNESS_AUDIT_LOG_TABLE: Table = Table {
    name: "freshness_audit_log",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("event_type", &SqlType::Text, non_null = true),
        sqlite_column!("subject_id", &SqlType::Text),
        sqlite_column!("subject_key", &SqlType::Text),
        sqlite_column!("details", &SqlType::Text), // JSON
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_freshness_audit_subject", "subject_id")],
};

pub const FRESHNESS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        SUBJECTS_TABLE,
        FRESHNESS_RECORDS_TABLE,
        FRESHNESS_CONFIG_TABLE,
        FRESHNESS_AUDIT_LOG_TABLE,
    ],
    migration: None,
}];
