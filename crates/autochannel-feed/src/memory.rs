//! In-memory implementation of the Feed trait.
//!
//! Used by tests and by peers that keep their session in process. A
//! writable feed is owned by the holder of the keypair; a replica mirrors
//! some other feed and is filled with [`MemoryFeed::replicate_from`].

use async_trait::async_trait;
use autochannel_core::{FeedKey, Keypair};
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::error::{FeedError, Result};
use crate::traits::Feed;

/// In-memory feed.
///
/// All data is lost when the feed is dropped. Thread-safe via RwLock; length
/// changes are published on a watch channel so waiters wake on growth.
pub struct MemoryFeed {
    key: FeedKey,
    writable: bool,
    entries: RwLock<Vec<Bytes>>,
    len_tx: watch::Sender<u64>,
}

impl MemoryFeed {
    /// Create an empty feed owned by `keypair`.
    pub fn new(keypair: &Keypair) -> Self {
        Self::with_key(keypair.feed_key(), true)
    }

    /// Create an empty read-only mirror of the feed identified by `key`.
    pub fn replica(key: FeedKey) -> Self {
        Self::with_key(key, false)
    }

    fn with_key(key: FeedKey, writable: bool) -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            key,
            writable,
            entries: RwLock::new(Vec::new()),
            len_tx,
        }
    }

    /// Copy entries this replica is missing from `source`, up to `upto`
    /// (exclusive) or the source's full length. Returns the new length.
    pub fn replicate_from(&self, source: &MemoryFeed, upto: Option<u64>) -> Result<u64> {
        if source.key != self.key {
            return Err(FeedError::KeyMismatch {
                expected: self.key,
                found: source.key,
            });
        }

        let have = self.entries.read().len();
        let missing: Vec<Bytes> = {
            let src = source.entries.read();
            let end = upto.map_or(src.len(), |upto| src.len().min(upto as usize));
            src.get(have..end).map(<[Bytes]>::to_vec).unwrap_or_default()
        };

        Ok(self.extend(missing))
    }

    /// Snapshot of every entry, in order.
    pub fn entries(&self) -> Vec<Bytes> {
        self.entries.read().clone()
    }

    fn extend(&self, batch: Vec<Bytes>) -> u64 {
        let mut entries = self.entries.write();
        if batch.is_empty() {
            return entries.len() as u64;
        }
        entries.extend(batch);
        let len = entries.len() as u64;
        self.len_tx.send_replace(len);
        len
    }
}

#[async_trait]
impl Feed for MemoryFeed {
    fn key(&self) -> FeedKey {
        self.key
    }

    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> u64 {
        self.entries.read().len() as u64
    }

    async fn get(&self, seq: u64) -> Result<Bytes> {
        let entries = self.entries.read();
        usize::try_from(seq)
            .ok()
            .and_then(|idx| entries.get(idx))
            .cloned()
            .ok_or(FeedError::NotFound {
                seq,
                len: entries.len() as u64,
            })
    }

    async fn append(&self, entries: Vec<Bytes>) -> Result<u64> {
        if !self.writable {
            return Err(FeedError::ReadOnly(self.key));
        }
        let len = self.extend(entries);
        tracing::trace!(feed = %self.key, len, "memory feed append");
        Ok(len)
    }

    async fn wait_for_len(&self, min: u64) -> Result<u64> {
        let mut rx = self.len_tx.subscribe();
        let len = *rx
            .wait_for(|len| *len >= min)
            .await
            .map_err(|_| FeedError::Closed)?;
        Ok(len)
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}
