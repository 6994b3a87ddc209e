//! Error types for comic-dl
//!
//! This module provides the error taxonomy for the library:
//! - Fetch-path errors (not found, transient fetch failure, incomplete content)
//! - Storage and database errors
//! - Delivery errors reported per batch or document
//! - Session authorization errors for multi-part selection
//! - A coarse [`UserFacing`] classification for chat front-ends

use crate::types::{ContentId, UserId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for comic-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for comic-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "delivery.batch_size")
        key: Option<String>,
    },

    /// The provider reports that the id does not correspond to valid content
    #[error("content {id} not found")]
    NotFound {
        /// The content id that was requested
        id: ContentId,
    },

    /// Transient network or provider failure
    #[error("fetch failed for content {id}: {reason}")]
    Fetch {
        /// The content id being fetched
        id: ContentId,
        /// What went wrong
        reason: String,
    },

    /// The provider reported success but produced no usable files
    #[error("content {id} produced no usable files")]
    IncompleteContent {
        /// The content id that was fetched
        id: ContentId,
    },

    /// Disk I/O or permission failure while reading or writing cached content
    #[error("storage error at {path}: {source}")]
    Storage {
        /// The path being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The consumer rejected or failed to accept a delivery
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// A user tried to drive another user's selection session
    #[error("user {initiator} may not use the selection session owned by {owner}")]
    SessionAuthorization {
        /// Owner of the session
        owner: UserId,
        /// Identity that attempted the action
        initiator: UserId,
    },

    /// No live selection session for this user
    #[error("no active selection session for user {0}")]
    NoSession(UserId),

    /// Selected part is not listed in the session
    #[error("part {part} is not part of this selection")]
    PartNotFound {
        /// The requested part id
        part: ContentId,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Shutdown in progress - not accepting new requests
    #[error("shutdown in progress: not accepting new requests")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Errors reported by a [`Consumer`](crate::delivery::Consumer)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The consumer refused the upload (bad request, blocked chat, ...)
    #[error("consumer rejected upload: {0}")]
    Rejected(String),

    /// The upload failed in transit
    #[error("upload failed: {0}")]
    Failed(String),

    /// The artifact exceeds the largest size the consumer accepts
    #[error("artifact of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Size of the artifact in bytes
        size: u64,
        /// Largest accepted size in bytes
        limit: u64,
    },
}

/// Coarse classification of an error for the person on the other side of the chat
///
/// Front-ends map these onto short messages; the distinction between "not found",
/// "temporarily unavailable" and "too large" is what users need to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserFacing {
    /// The id does not exist at the provider
    NotFound,
    /// Try again later
    Unavailable,
    /// The content is too large to deliver
    TooLarge,
    /// The user may not perform this action
    Denied,
    /// Anything else
    Internal,
}

impl Error {
    /// Build a storage error for `path`
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Storage {
            path: path.into(),
            source,
        }
    }

    /// Classify this error for user-facing reporting
    pub fn user_facing(&self) -> UserFacing {
        match self {
            Error::NotFound { .. } | Error::PartNotFound { .. } | Error::NoSession(_) => {
                UserFacing::NotFound
            }
            Error::Fetch { .. }
            | Error::IncompleteContent { .. }
            | Error::Network(_)
            | Error::ShuttingDown => UserFacing::Unavailable,
            Error::Delivery(DeliveryError::TooLarge { .. }) => UserFacing::TooLarge,
            Error::Delivery(_) => UserFacing::Unavailable,
            Error::SessionAuthorization { .. } => UserFacing::Denied,
            Error::Config { .. }
            | Error::Storage { .. }
            | Error::Database(_)
            | Error::Sqlx(_)
            | Error::Io(_)
            | Error::Other(_) => UserFacing::Internal,
        }
    }
}
