//! Feed trait: the abstract interface for an append-only log.
//!
//! A channel reads two feeds, its own and a mirror of its peer's, and only
//! ever appends to its own. Replication between peers happens outside this
//! crate; all the channel needs is length, point reads, and a way to wait
//! for growth.

use async_stream::try_stream;
use async_trait::async_trait;
use autochannel_core::FeedKey;
use bytes::Bytes;
use futures::Stream;

use crate::error::Result;

/// An ordered, append-only, randomly readable sequence of byte entries.
///
/// Entries are addressed `0..len()` and never change once written. `len()`
/// only grows.
#[async_trait]
pub trait Feed: Send + Sync {
    /// Stable identity of the feed.
    fn key(&self) -> FeedKey;

    /// Resolve once the feed is usable. Idempotent.
    async fn ready(&self) -> Result<()>;

    /// Next unused sequence number.
    fn len(&self) -> u64;

    /// Whether the feed holds no entries yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the entry at `seq`.
    ///
    /// Returns [`FeedError::NotFound`](crate::FeedError::NotFound) when
    /// `seq >= len()`.
    async fn get(&self, seq: u64) -> Result<Bytes>;

    /// Append a batch in order and return the new length.
    ///
    /// The batch lands contiguously: its first entry is at the length the
    /// feed had just before the call.
    async fn append(&self, entries: Vec<Bytes>) -> Result<u64>;

    /// Suspend until `len() >= min` and return the length observed.
    async fn wait_for_len(&self, min: u64) -> Result<u64>;

    /// Whether `append` is permitted on this handle.
    fn is_writable(&self) -> bool;
}

/// Options for [`read_stream`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStreamOptions {
    /// First sequence number to yield.
    pub start: u64,
    /// Exclusive upper bound, if any.
    pub end: Option<u64>,
    /// Wait for growth instead of ending at the current length.
    pub live: bool,
}

impl ReadStreamOptions {
    /// Bounded read from `start` to whatever the length is when reached.
    pub fn from(start: u64) -> Self {
        Self {
            start,
            ..Self::default()
        }
    }

    /// Live read from `start` that never ends on its own.
    pub fn live(start: u64) -> Self {
        Self {
            start,
            end: None,
            live: true,
        }
    }
}

/// Lazily stream `(seq, bytes)` pairs from a feed.
///
/// Bounded streams stop at the first sequence number not yet written; live
/// streams wait for it. Dropping the stream has no effect on the feed.
pub fn read_stream<F>(
    feed: &F,
    opts: ReadStreamOptions,
) -> impl Stream<Item = Result<(u64, Bytes)>> + Send + '_
where
    F: Feed + ?Sized,
{
    try_stream! {
        let mut seq = opts.start;
        loop {
            if opts.end.is_some_and(|end| seq >= end) {
                break;
            }
            if seq >= feed.len() {
                if !opts.live {
                    break;
                }
                feed.wait_for_len(seq + 1).await?;
            }
            let bytes = feed.get(seq).await?;
            yield (seq, bytes);
            seq += 1;
        }
    }
}
