//! Per-source freshness metadata.
//!
//! # Responsibility
//! - Read and upsert `freshness_records` rows.
//! - Format last-success timestamps.
//!
//! # Invariants
//! - Reading an unknown identifier yields a record without a token, never an
//!   error. No observed token ever matches a missing one.
//! - Timestamps are UTC, minute precision, numeric offset.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

/// `YYYY-MM-DDTHH:MM+0000`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M%z";

/// Last observed state of one external source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessRecord {
    pub source_identifier: String,
    /// `None` until a dependent group has loaded successfully.
    pub freshness_token: Option<String>,
    pub last_success: Option<String>,
}

impl FreshnessRecord {
    /// Record for a source that was never loaded.
    pub fn unseen(source_identifier: impl Into<String>) -> Self {
        Self {
            source_identifier: source_identifier.into(),
            freshness_token: None,
            last_success: None,
        }
    }

    /// Record for a source whose dependent group just loaded successfully.
    pub fn loaded(source_identifier: impl Into<String>, freshness_token: impl Into<String>) -> Self {
        Self {
            source_identifier: source_identifier.into(),
            freshness_token: Some(freshness_token.into()),
            last_success: Some(timestamp_now()),
        }
    }

    /// Whether `token` equals the last recorded one. Always false when unseen.
    pub fn is_current(&self, token: &str) -> bool {
        self.freshness_token.as_deref() == Some(token)
    }
}

pub fn timestamp_now() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn load(conn: &Connection, source_identifier: &str) -> rusqlite::Result<FreshnessRecord> {
    let record = conn
        .query_row(
            "SELECT source_identifier, freshness_token, last_success_at
             FROM freshness_records
             WHERE source_identifier = ?1;",
            params![source_identifier],
            |row| {
                Ok(FreshnessRecord {
                    source_identifier: row.get(0)?,
                    freshness_token: row.get(1)?,
                    last_success: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(record.unwrap_or_else(|| FreshnessRecord::unseen(source_identifier)))
}

pub(crate) fn upsert(conn: &Connection, record: &FreshnessRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO freshness_records (source_identifier, freshness_token, last_success_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(source_identifier) DO UPDATE SET
             freshness_token = excluded.freshness_token,
             last_success_at = excluded.last_success_at;",
        params![
            record.source_identifier.as_str(),
            record.freshness_token.as_deref(),
            record.last_success.as_deref(),
        ],
    )?;
    Ok(())
}

pub(crate) fn clear(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM freshness_records;", [])
}
