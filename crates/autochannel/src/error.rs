//! Error types for channels.

use std::sync::Arc;

use autochannel_core::{CoreError, FeedKey};
use autochannel_feed::FeedError;
use thiserror::Error;

/// Errors that can occur during channel operations.
///
/// Cloneable so one failed append batch can be reported to every caller
/// that joined it.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// Feed I/O failed. Not retried.
    #[error("storage error: {0}")]
    Storage(Arc<FeedError>),

    /// An entry could not be decoded. `remote` tells which feed it came from.
    #[error("malformed entry at seq {seq} (remote: {remote}): {source}")]
    Decode {
        remote: bool,
        seq: u64,
        source: CoreError,
    },

    /// The two feeds cannot form a channel.
    #[error("invalid channel: {0}")]
    InvalidChannel(CoreError),

    /// Read at or beyond a feed's length.
    #[error("seq {seq} not found (feed length {len})")]
    NotFound { seq: u64, len: u64 },

    /// The append pipeline has shut down.
    #[error("append pipeline closed")]
    PipelineClosed,

    /// The local feed does not accept appends.
    #[error("local feed {0} is not writable")]
    ReadOnlyFeed(FeedKey),

    /// A clock names a feed that is in neither side of the channel.
    #[error("feed {0} is not part of this channel")]
    UnknownFeed(FeedKey),
}

impl From<FeedError> for ChannelError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::NotFound { seq, len } => ChannelError::NotFound { seq, len },
            FeedError::ReadOnly(key) => ChannelError::ReadOnlyFeed(key),
            other => ChannelError::Storage(Arc::new(other)),
        }
    }
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
