//! Error types for Autochannel Core.

use thiserror::Error;

use crate::crypto::FeedKey;

/// Core errors that can occur while building or decoding entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("unsupported entry version: {0}")]
    UnsupportedVersion(u8),

    #[error("unknown entry kind: {0}")]
    UnknownKind(u64),

    #[error("malformed entry: {0}")]
    MalformedEntry(String),

    #[error("malformed accept ranges: {0}")]
    MalformedRanges(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("non-canonical encoding")]
    NonCanonical,

    #[error("both feeds share key {0}; a channel needs two distinct feeds")]
    SameFeedKey(FeedKey),
}
