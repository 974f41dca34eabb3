//! The Channel: merged view and acceptance protocol over two feeds.
//!
//! A channel pairs the local feed (written through the append pipeline) with
//! a mirror of the peer's feed. Roles come from the feed keys, so both peers
//! agree on merge order without a handshake.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_stream::try_stream;
use autochannel_core::{
    compress, ChannelId, Cursor, Entry, EntryKind, EventKey, FeedKey, Role, VectorClock,
};
use autochannel_feed::{read_stream, Feed, ReadStreamOptions};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::merge::{self, FeedPair, ForwardMerge, MergedEntry, NextBatch};
use crate::pipeline::{AppendPipeline, Appended};

/// Options for [`Channel::read`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Keep following both feeds instead of ending when caught up.
    pub live: bool,
    /// Stop at this clock, taken by either peer. Entries at or past it are
    /// not yielded.
    pub end: Option<VectorClock>,
}

/// An entry referenced by a merged `accept` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedEntry {
    /// Sequence number of the accepted entry.
    pub seq: u64,
    /// Whether the accepted entry lives in the remote feed.
    pub remote: bool,
    /// The accepted entry.
    pub entry: Entry,
}

/// Builder for [`Channel`].
pub struct ChannelBuilder {
    local: Arc<dyn Feed>,
    remote: Arc<dyn Feed>,
    config: ChannelConfig,
    id: Option<ChannelId>,
    cursor: Cursor,
}

impl ChannelBuilder {
    /// Start building a channel over `local` (owned) and `remote` (mirror).
    pub fn new(local: Arc<dyn Feed>, remote: Arc<dyn Feed>) -> Self {
        Self {
            local,
            remote,
            config: ChannelConfig::default(),
            id: None,
            cursor: Cursor::default(),
        }
    }

    /// Use `config` instead of the defaults.
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an explicit channel id.
    pub fn id(mut self, id: ChannelId) -> Self {
        self.id = Some(id);
        self
    }

    /// Draw the channel id from `rng` instead of the OS generator.
    pub fn rng<R: RngCore + CryptoRng>(mut self, rng: &mut R) -> Self {
        self.id = Some(ChannelId::random(rng));
        self
    }

    /// Resume merging from `cursor` instead of the start of both feeds.
    pub fn cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }

    /// Validate the feeds, wait for them to be ready, and start the
    /// append pipeline.
    pub async fn open(self) -> Result<Channel> {
        let local_key = self.local.key();
        let remote_key = self.remote.key();
        let role = Role::assign(&local_key, &remote_key).map_err(ChannelError::InvalidChannel)?;
        if !self.local.is_writable() {
            return Err(ChannelError::ReadOnlyFeed(local_key));
        }

        self.local.ready().await?;
        self.remote.ready().await?;

        let id = match self.id {
            Some(id) => id,
            None => ChannelId::random(&mut OsRng),
        };
        let span = tracing::debug_span!("channel", %id, ?role);

        let event_key = self.config.event_ids.then(|| {
            if role.is_initiator() {
                EventKey::derive(&local_key, &remote_key)
            } else {
                EventKey::derive(&remote_key, &local_key)
            }
        });
        let pipeline = AppendPipeline::spawn(
            self.local.clone(),
            self.remote.clone(),
            event_key,
            &self.config,
            span.clone(),
        );

        tracing::debug!(
            parent: &span,
            local = %local_key,
            remote = %remote_key,
            cursor = ?self.cursor,
            "channel opened"
        );

        Ok(Channel {
            id,
            role,
            local: self.local,
            remote: self.remote,
            config: self.config,
            cursor: Mutex::new(self.cursor),
            pending: Mutex::new(BTreeSet::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            pipeline,
            span,
        })
    }
}

/// A pairwise causal channel.
pub struct Channel {
    id: ChannelId,
    role: Role,
    local: Arc<dyn Feed>,
    remote: Arc<dyn Feed>,
    config: ChannelConfig,
    cursor: Mutex<Cursor>,
    pending: Mutex<BTreeSet<u64>>,
    flush_lock: tokio::sync::Mutex<()>,
    pipeline: AppendPipeline,
    span: tracing::Span,
}

impl Channel {
    /// Open a channel with default settings.
    pub async fn open(local: Arc<dyn Feed>, remote: Arc<dyn Feed>) -> Result<Self> {
        ChannelBuilder::new(local, remote).open().await
    }

    /// Start building a channel.
    pub fn builder(local: Arc<dyn Feed>, remote: Arc<dyn Feed>) -> ChannelBuilder {
        ChannelBuilder::new(local, remote)
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_key(&self) -> FeedKey {
        self.local.key()
    }

    pub fn remote_key(&self) -> FeedKey {
        self.remote.key()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// The stored merge position.
    pub fn cursor(&self) -> Cursor {
        *self.cursor.lock()
    }

    /// Wait until both feeds are ready. Idempotent.
    pub async fn ready(&self) -> Result<()> {
        self.local.ready().await?;
        self.remote.ready().await?;
        Ok(())
    }

    /// Append an entry to the local feed.
    pub async fn append(&self, kind: EntryKind, payload: impl Into<Bytes>) -> Result<Appended> {
        self.pipeline.enqueue(Entry::new(kind, payload, 0)).await
    }

    /// Append an entry that also commits every earlier pending entry of this
    /// feed.
    pub async fn append_committed(
        &self,
        kind: EntryKind,
        payload: impl Into<Bytes>,
    ) -> Result<Appended> {
        self.pipeline
            .enqueue(Entry::new(kind, payload, 0).with_commitment(true))
            .await
    }

    /// Append an empty commitment marker.
    pub async fn commit_pending(&self) -> Result<Appended> {
        self.pipeline.enqueue(Entry::commit_marker(0)).await
    }

    /// Lazily merge both feeds in causal order.
    ///
    /// Starts at `from`, or the stored cursor. A bounded read covers the
    /// entries present when it is called. One that runs to completion
    /// advances the stored cursor; dropping the stream early or hitting an
    /// error leaves it untouched.
    pub fn read(
        &self,
        from: Option<Cursor>,
        opts: ReadOptions,
    ) -> impl Stream<Item = Result<MergedEntry>> + Send + '_ {
        let mut merge = self.merge(from, opts);
        try_stream! {
            while let Some(merged) = merge.next().await? {
                yield merged;
            }
            self.advance_cursor(merge.position());
        }
    }

    /// One bounded merge pass as a value: the entries and the position after
    /// them. The stored cursor is not touched.
    pub async fn read_batch(&self, from: Option<Cursor>) -> Result<(Vec<MergedEntry>, Cursor)> {
        collect(self.merge(from, ReadOptions::default())).await
    }

    /// Like [`read_batch`](Self::read_batch), stopping at `end`.
    pub async fn read_batch_until(
        &self,
        from: Option<Cursor>,
        end: &VectorClock,
    ) -> Result<(Vec<MergedEntry>, Cursor)> {
        let opts = ReadOptions {
            end: Some(*end),
            ..ReadOptions::default()
        };
        collect(self.merge(from, opts)).await
    }

    /// Remote entries from `start` (default: the remote cursor) in feed
    /// order, without merging.
    pub fn requests(
        &self,
        start: Option<u64>,
        live: bool,
    ) -> impl Stream<Item = Result<MergedEntry>> + Send + '_ {
        let start = start.unwrap_or_else(|| self.cursor().remote);
        let opts = ReadStreamOptions {
            start,
            end: (!live).then(|| self.remote.len()),
            live,
        };
        try_stream! {
            let raw = read_stream(self.remote.as_ref(), opts);
            futures::pin_mut!(raw);
            while let Some(item) = raw.next().await {
                let (seq, bytes) = item?;
                let entry = merge::decode(&bytes, seq, true)?;
                yield MergedEntry { entry, seq, remote: true };
            }
        }
    }

    /// The entry a clock points at: `clock.local` in the feed of
    /// `clock.key`.
    pub async fn get(&self, clock: &VectorClock) -> Result<MergedEntry> {
        let remote = if self.is_local(clock) {
            false
        } else if clock.key == self.remote.key() {
            true
        } else {
            return Err(ChannelError::UnknownFeed(clock.key));
        };
        let feed = if remote { self.remote.as_ref() } else { self.local.as_ref() };
        let entry = merge::load(feed, clock.local, remote).await?;
        Ok(MergedEntry {
            entry,
            seq: clock.local,
            remote,
        })
    }

    /// Whether `clock` was taken by the owner of the local feed.
    pub fn is_local(&self, clock: &VectorClock) -> bool {
        clock.key == self.local.key()
    }

    /// The merge position a clock describes, in this channel's local/remote
    /// terms.
    pub fn cursor_at(&self, clock: &VectorClock) -> Cursor {
        let view = clock.viewed_from(self.local.key());
        Cursor::new(view.local, view.remote)
    }

    /// Entries referenced by merged `accept` entries.
    ///
    /// An accept written to one feed names sequence numbers of the other.
    /// Moves the stored cursor like a bounded [`read`](Self::read).
    pub fn commit(
        &self,
        from: Option<Cursor>,
    ) -> impl Stream<Item = Result<CommittedEntry>> + Send + '_ {
        let mut merge = self.merge(from, ReadOptions::default());
        try_stream! {
            while let Some(merged) = merge.next().await? {
                if merged.entry.kind != EntryKind::Accept {
                    continue;
                }
                let ranges = merged.entry.accept_ranges().map_err(|source| ChannelError::Decode {
                    remote: merged.remote,
                    seq: merged.seq,
                    source,
                })?;

                let remote = !merged.remote;
                let target = if remote { self.remote.as_ref() } else { self.local.as_ref() };
                for seq in ranges.seqs() {
                    let entry = merge::load(target, seq, remote).await?;
                    yield CommittedEntry { seq, remote, entry };
                }
            }
            self.advance_cursor(merge.position());
        }
    }

    /// Record that the remote entry at `seq` is accepted. Written out by the
    /// next [`flush`](Self::flush).
    pub fn accept(&self, seq: u64) {
        self.pending.lock().insert(seq);
    }

    /// Number of accepts waiting for the next flush.
    pub fn pending_accepts(&self) -> usize {
        self.pending.lock().len()
    }

    /// Write pending accepts as one `accept` entry.
    ///
    /// Returns `None` without writing when nothing is pending. Concurrent
    /// flushes run one at a time; accepts recorded while a flush is in
    /// progress go into the next one. On failure the drained set is put back.
    pub async fn flush(&self) -> Result<Option<Appended>> {
        let _guard = self.flush_lock.lock().await;

        let drained = std::mem::take(&mut *self.pending.lock());
        if drained.is_empty() {
            return Ok(None);
        }

        let ranges = compress(&drained);
        let entry = Entry::accept(&ranges, 0).with_commitment(self.config.commit_on_flush);
        match self.pipeline.enqueue(entry).await {
            Ok(appended) => {
                tracing::debug!(
                    parent: &self.span,
                    seq = appended.seq,
                    accepted = drained.len(),
                    ranges = ranges.len(),
                    "accepts flushed"
                );
                Ok(Some(appended))
            }
            Err(e) => {
                tracing::warn!(parent: &self.span, error = %e, "accept flush failed");
                self.pending.lock().extend(drained);
                Err(e)
            }
        }
    }

    /// Live stream of entries both sides have committed to. Never ends.
    pub fn accepted(
        &self,
        from: Option<Cursor>,
    ) -> impl Stream<Item = Result<MergedEntry>> + Send + '_ {
        let start = from.unwrap_or_else(|| self.cursor());
        merge::accepted(self.pair(), start)
    }

    /// Entries not yet acknowledged by the other side, plus both tails.
    pub async fn next(&self, from: Option<Cursor>) -> Result<NextBatch> {
        let start = from.unwrap_or_else(|| self.cursor());
        merge::reverse_batch(self.pair(), start).await
    }

    /// Both feed lengths as seen from here.
    pub fn clock(&self) -> VectorClock {
        VectorClock::new(self.local.key(), self.local.len(), self.remote.len())
    }

    /// Stop the append pipeline. Later appends fail with `PipelineClosed`.
    pub fn close(&self) {
        tracing::debug!(parent: &self.span, "channel closed");
        self.pipeline.close();
    }

    fn pair(&self) -> FeedPair<'_> {
        FeedPair::new(self.local.as_ref(), self.remote.as_ref(), self.role)
    }

    fn merge(&self, from: Option<Cursor>, opts: ReadOptions) -> ForwardMerge<'_> {
        let start = from.unwrap_or_else(|| self.cursor());
        let merge = ForwardMerge::new(self.pair(), start, opts.live);
        match opts.end {
            Some(end) => merge.until(self.cursor_at(&end)),
            None => merge,
        }
    }

    fn advance_cursor(&self, to: Cursor) {
        let mut cursor = self.cursor.lock();
        *cursor = cursor.max(to);
        tracing::trace!(parent: &self.span, cursor = ?*cursor, "merge pass complete");
    }
}

async fn collect(mut merge: ForwardMerge<'_>) -> Result<(Vec<MergedEntry>, Cursor)> {
    let mut entries = Vec::new();
    while let Some(merged) = merge.next().await? {
        entries.push(merged);
    }
    Ok((entries, merge.position()))
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("local", &self.local.key())
            .field("remote", &self.remote.key())
            .field("cursor", &self.cursor())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autochannel_core::Keypair;
    use autochannel_feed::MemoryFeed;
    use futures::StreamExt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn local_and_remote() -> (Arc<MemoryFeed>, Arc<MemoryFeed>) {
        let local = Arc::new(MemoryFeed::new(&Keypair::from_seed(&[1; 32])));
        let remote = Arc::new(MemoryFeed::replica(Keypair::from_seed(&[2; 32]).feed_key()));
        (local, remote)
    }

    #[tokio::test]
    async fn test_equal_keys_rejected() {
        let kp = Keypair::from_seed(&[1; 32]);
        let local = Arc::new(MemoryFeed::new(&kp));
        let remote = Arc::new(MemoryFeed::replica(kp.feed_key()));

        let err = Channel::open(local, remote).await.unwrap_err();
        assert!(matches!(err, ChannelError::InvalidChannel(_)));
    }

    #[tokio::test]
    async fn test_read_only_local_rejected() {
        let local = Arc::new(MemoryFeed::replica(Keypair::from_seed(&[1; 32]).feed_key()));
        let remote = Arc::new(MemoryFeed::replica(Keypair::from_seed(&[2; 32]).feed_key()));

        let err = Channel::open(local, remote).await.unwrap_err();
        assert!(matches!(err, ChannelError::ReadOnlyFeed(_)));
    }

    #[tokio::test]
    async fn test_builder_id_from_rng() {
        let (local, remote) = local_and_remote();
        let channel = Channel::builder(local, remote)
            .rng(&mut StdRng::seed_from_u64(42))
            .open()
            .await
            .unwrap();
        assert_eq!(channel.id(), ChannelId::random(&mut StdRng::seed_from_u64(42)));
    }

    #[tokio::test]
    async fn test_roles_are_complementary() {
        let a = Keypair::from_seed(&[1; 32]);
        let b = Keypair::from_seed(&[2; 32]);
        let ch_a = Channel::open(
            Arc::new(MemoryFeed::new(&a)),
            Arc::new(MemoryFeed::replica(b.feed_key())),
        )
        .await
        .unwrap();
        let ch_b = Channel::open(
            Arc::new(MemoryFeed::new(&b)),
            Arc::new(MemoryFeed::replica(a.feed_key())),
        )
        .await
        .unwrap();

        assert_eq!(ch_a.role().peer(), ch_b.role());
    }

    #[tokio::test]
    async fn test_clock_snapshot() {
        let (local, remote) = local_and_remote();
        let channel = Channel::open(local.clone(), remote).await.unwrap();

        assert_eq!(channel.clock(), VectorClock::new(local.key(), 0, 0));
        channel.append(EntryKind::Data, b"x".to_vec()).await.unwrap();
        assert_eq!(channel.clock(), VectorClock::new(local.key(), 1, 0));
    }

    #[tokio::test]
    async fn test_empty_flush_writes_nothing() {
        let (local, remote) = local_and_remote();
        let channel = Channel::open(local.clone(), remote).await.unwrap();

        assert_eq!(channel.flush().await.unwrap(), None);
        assert_eq!(local.len(), 0);
    }

    #[tokio::test]
    async fn test_flush_compacts_pending() {
        let (local, remote) = local_and_remote();
        let channel = Channel::open(local.clone(), remote).await.unwrap();

        for seq in [4, 0, 1, 2] {
            channel.accept(seq);
        }
        channel.accept(1);
        assert_eq!(channel.pending_accepts(), 4);

        let appended = channel.flush().await.unwrap().unwrap();
        assert_eq!(channel.pending_accepts(), 0);

        let entry = Entry::from_bytes(&local.get(appended.seq).await.unwrap()).unwrap();
        assert_eq!(entry.kind, EntryKind::Accept);
        assert!(entry.commitment);
        let pairs: Vec<_> = entry.accept_ranges().unwrap().iter().copied().collect();
        assert_eq!(pairs, vec![(0, 2), (4, 4)]);
    }

    #[tokio::test]
    async fn test_flush_failure_restores_pending() {
        let (local, remote) = local_and_remote();
        let channel = Channel::open(local, remote).await.unwrap();
        channel.accept(3);
        channel.close();

        let err = channel.flush().await.unwrap_err();
        assert!(matches!(err, ChannelError::PipelineClosed));
        assert_eq!(channel.pending_accepts(), 1);
    }

    #[tokio::test]
    async fn test_commit_pending_marker() {
        let (local, remote) = local_and_remote();
        let channel = Channel::open(local.clone(), remote).await.unwrap();
        let appended = channel.commit_pending().await.unwrap();

        let entry = Entry::from_bytes(&local.get(appended.seq).await.unwrap()).unwrap();
        assert_eq!(entry.kind, EntryKind::Commit);
        assert!(entry.commitment);
    }

    #[tokio::test]
    async fn test_read_advances_cursor_only_on_completion() {
        let (local, remote) = local_and_remote();
        let channel = Channel::open(local, remote).await.unwrap();
        for i in 0..3u8 {
            channel.append(EntryKind::Data, vec![i]).await.unwrap();
        }

        {
            let stream = channel.read(None, ReadOptions::default());
            futures::pin_mut!(stream);
            stream.next().await.unwrap().unwrap();
        }
        assert_eq!(channel.cursor(), Cursor::default());

        let all: Vec<_> = channel.read(None, ReadOptions::default()).collect().await;
        assert_eq!(all.len(), 3);
        assert_eq!(channel.cursor(), Cursor::new(3, 0));

        let (batch, tail) = channel.read_batch(Some(Cursor::default())).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(tail, Cursor::new(3, 0));
        assert_eq!(channel.cursor(), Cursor::new(3, 0));
    }
}
