//! Core types for comic-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// External numeric identifier of a fetchable album or chapter
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub u64);

impl ContentId {
    /// Create a new ContentId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ContentId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ContentId {
    type Err = std::num::ParseIntError;

    /// Parses a decimal id. Providers sometimes prefix ids with their site tag
    /// ("JM123"), which is accepted and stripped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        Ok(Self(digits.parse()?))
    }
}

// SQLite has no unsigned 64-bit column type; ids are stored as INTEGER.
impl sqlx::Type<sqlx::Sqlite> for ContentId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ContentId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        let id = i64::try_from(self.0)?;
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&id, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ContentId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(u64::try_from(id)?))
    }
}

/// Identity of a chat user (the initiator of a request or navigation)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the chat that receives deliveries
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted metadata describing one cached content id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Content id (unique key)
    pub id: ContentId,
    /// Name shown to users
    pub display_name: String,
    /// When the content was fetched from the provider
    pub fetch_time: DateTime<Utc>,
    /// Last time the content was served from cache
    pub access_time: DateTime<Utc>,
    /// Number of files in the backing directory
    pub file_count: u32,
    /// Total size of the backing directory in bytes
    pub size_bytes: u64,
}

/// Metadata committed for a freshly fetched id
#[derive(Clone, Debug)]
pub struct NewContent {
    /// Name shown to users
    pub display_name: String,
    /// Number of files written
    pub file_count: u32,
    /// Total size of written files in bytes
    pub size_bytes: u64,
}

/// One chapter of a multi-part album
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// Content id of the chapter itself
    pub id: ContentId,
    /// Label shown in the selection list
    pub label: String,
}

/// Provider metadata for a content id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDetail {
    /// Name shown to users
    pub display_name: String,
    /// Ordered chapters; a single-part album lists zero or one part
    pub parts: Vec<Part>,
    /// Provider locators of the album's files in reading order
    ///
    /// Handed back to [`ContentSource::fetch_files`](crate::source::ContentSource::fetch_files)
    /// so the files can be fetched without asking for the album again.
    #[serde(default)]
    pub pages: Vec<String>,
}

impl ContentDetail {
    /// True when the album has more than one chapter to choose from
    pub fn is_multi_part(&self) -> bool {
        self.parts.len() > 1
    }
}

/// Result of a fetch: the committed record and its ordered files
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedContent {
    /// Cache record backing the files
    pub record: ContentRecord,
    /// Files ordered by their embedded sequence number
    pub files: Vec<PathBuf>,
    /// Whether the result was served without contacting the provider
    pub cache_hit: bool,
}

/// Event emitted by the downloader
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Served from cache
    CacheHit {
        /// Content id
        id: ContentId,
    },

    /// Network fetch started (cache miss, slot acquired)
    FetchStarted {
        /// Content id
        id: ContentId,
    },

    /// Network fetch committed to the cache
    FetchCompleted {
        /// Content id
        id: ContentId,
        /// Files written
        file_count: u32,
        /// Bytes written
        size_bytes: u64,
    },

    /// Network fetch failed terminally
    FetchFailed {
        /// Content id
        id: ContentId,
        /// Error message
        error: String,
    },

    /// Content removed from the cache
    Evicted {
        /// Content id
        id: ContentId,
        /// Bytes freed
        size_bytes: u64,
    },

    /// An eviction pass finished
    EvictionPass {
        /// Number of ids removed
        removed: usize,
        /// Bytes freed
        freed_bytes: u64,
        /// Cache size after the pass
        remaining_bytes: u64,
        /// True if the cache is still above its size limit
        over_limit: bool,
    },

    /// A batch reached the consumer
    BatchDelivered {
        /// Receiving chat
        chat: ChatId,
        /// Zero-based batch index
        index: usize,
        /// Files in the batch
        size: usize,
    },

    /// A batch was rejected or failed
    BatchFailed {
        /// Receiving chat
        chat: ChatId,
        /// Zero-based batch index
        index: usize,
        /// Error message
        error: String,
    },

    /// A selection session was opened or replaced
    SessionOpened {
        /// Owning user
        user: UserId,
        /// Album being browsed
        id: ContentId,
        /// Number of parts listed
        parts: usize,
    },

    /// Inactive sessions were reclaimed
    SessionsExpired {
        /// Number of sessions removed
        count: usize,
    },

    /// Downloader is shutting down
    Shutdown,
}
