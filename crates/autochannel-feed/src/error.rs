//! Error types for the feed module.

use autochannel_core::FeedKey;
use thiserror::Error;

/// Errors that can occur during feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Read at or beyond the feed length.
    #[error("seq {seq} not found (feed length {len})")]
    NotFound { seq: u64, len: u64 },

    /// Append attempted on a feed this process does not own.
    #[error("feed {0} is read-only")]
    ReadOnly(FeedKey),

    /// Replication source does not match the replica's key.
    #[error("feed key mismatch: expected {expected}, found {found}")]
    KeyMismatch { expected: FeedKey, found: FeedKey },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(String),

    /// Backend-specific failure not covered above.
    #[error("feed backend error: {0}")]
    Backend(String),

    /// The feed was closed while a caller was waiting on it.
    #[error("feed closed")]
    Closed,
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
