//! Database layer for comic-dl
//!
//! Handles SQLite persistence for cache records.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`content`] - Cache record CRUD, access tracking, tombstones

use crate::types::{ContentId, ContentRecord};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod content;
mod migrations;

/// Record state constants
pub mod record_state {
    /// Record is complete and may be served
    pub const READY: i32 = 0;
    /// Removal in progress: the directory may be partially deleted
    pub const TOMBSTONE: i32 = 1;
}

/// Cache record row from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct ContentRow {
    /// Content id
    pub id: ContentId,
    /// Name shown to users
    pub display_name: String,
    /// Unix timestamp (milliseconds) of the fetch
    pub fetch_time: i64,
    /// Unix timestamp (milliseconds) of the last cache hit
    pub access_time: i64,
    /// Number of files in the backing directory
    pub file_count: i64,
    /// Total size in bytes
    pub size_bytes: i64,
    /// Record state (see [`record_state`])
    pub state: i32,
}

impl From<ContentRow> for ContentRecord {
    fn from(row: ContentRow) -> Self {
        Self {
            id: row.id,
            display_name: row.display_name,
            fetch_time: from_millis(row.fetch_time),
            access_time: from_millis(row.access_time),
            file_count: u32::try_from(row.file_count).unwrap_or(0),
            size_bytes: u64::try_from(row.size_bytes).unwrap_or(0),
        }
    }
}

/// Convert a unix millisecond timestamp to a UTC datetime
pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Database handle for comic-dl
pub struct Database {
    pool: SqlitePool,
}
