//! Causal merge of the two feeds of a channel.
//!
//! Three walks over the same pair of feeds:
//!
//! - [`ForwardMerge`]: deterministic interleaving where every entry follows
//!   the counterpart entries its causal mark says its writer had seen.
//! - [`reverse_batch`]: the entries each side has written that the other
//!   side has not yet acknowledged.
//! - [`accepted`]: a live walk that holds back responder entries until a
//!   commitment releases them.
//!
//! The initiator's feed is always the left side and is drained first, so
//! both peers produce the same order from the same data.

use async_stream::try_stream;
use autochannel_core::{Cursor, Entry, Role};
use autochannel_feed::Feed;
use futures::Stream;

use crate::error::{ChannelError, Result};

/// An entry placed in merged order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEntry {
    /// The decoded entry.
    pub entry: Entry,
    /// Its sequence number in the feed it came from.
    pub seq: u64,
    /// Whether it came from the remote feed.
    pub remote: bool,
}

/// Result of a reverse batch walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextBatch {
    /// Unacknowledged entries: initiator's first, then responder's, each
    /// ascending.
    pub entries: Vec<MergedEntry>,
    /// Both feed lengths when the batch was taken.
    pub tail: Cursor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// The two feeds of a channel arranged by role.
#[derive(Clone, Copy)]
pub struct FeedPair<'a> {
    left: &'a dyn Feed,
    right: &'a dyn Feed,
    left_is_remote: bool,
}

impl<'a> FeedPair<'a> {
    /// Arrange `local` and `remote` given the local role.
    pub fn new(local: &'a dyn Feed, remote: &'a dyn Feed, role: Role) -> Self {
        match role {
            Role::Initiator => Self {
                left: local,
                right: remote,
                left_is_remote: false,
            },
            Role::Responder => Self {
                left: remote,
                right: local,
                left_is_remote: true,
            },
        }
    }

    /// The initiator's feed.
    pub fn initiator(&self) -> &'a dyn Feed {
        self.left
    }

    /// The responder's feed.
    pub fn responder(&self) -> &'a dyn Feed {
        self.right
    }

    fn feed(&self, side: Side) -> &'a dyn Feed {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    fn is_remote(&self, side: Side) -> bool {
        match side {
            Side::Left => self.left_is_remote,
            Side::Right => !self.left_is_remote,
        }
    }

    /// `(left, right)` positions from a local/remote cursor.
    fn split(&self, cursor: Cursor) -> (u64, u64) {
        if self.left_is_remote {
            (cursor.remote, cursor.local)
        } else {
            (cursor.local, cursor.remote)
        }
    }

    /// Local/remote cursor from `(left, right)` positions.
    fn join(&self, left: u64, right: u64) -> Cursor {
        if self.left_is_remote {
            Cursor::new(right, left)
        } else {
            Cursor::new(left, right)
        }
    }
}

/// Read and decode one entry.
pub(crate) async fn load(feed: &dyn Feed, seq: u64, remote: bool) -> Result<Entry> {
    let bytes = feed.get(seq).await?;
    decode(&bytes, seq, remote)
}

pub(crate) fn decode(bytes: &[u8], seq: u64, remote: bool) -> Result<Entry> {
    Entry::from_bytes(bytes).map_err(|source| {
        tracing::warn!(seq, remote, error = %source, "undecodable entry");
        ChannelError::Decode { remote, seq, source }
    })
}

/// Forward causal merge starting at a cursor.
///
/// Drains the left side while its head's causal mark is covered by the
/// right position, then the right side under the mirrored rule, and so on.
///
/// A bounded merge only considers entries present when it was created and
/// ends when neither head can be placed. A live merge waits for either feed
/// to grow, and ends only if given an end that both positions reach.
pub struct ForwardMerge<'a> {
    pair: FeedPair<'a>,
    pos: [u64; 2],
    head: [Option<Entry>; 2],
    turn: Side,
    live: bool,
    end: Option<[u64; 2]>,
}

impl<'a> ForwardMerge<'a> {
    /// Start a merge at `from`.
    pub fn new(pair: FeedPair<'a>, from: Cursor, live: bool) -> Self {
        let (left, right) = pair.split(from);
        Self {
            pair,
            pos: [left, right],
            head: [None, None],
            turn: Side::Left,
            live,
            end: (!live).then(|| [pair.left.len(), pair.right.len()]),
        }
    }

    /// Stop each feed at `end` (exclusive), in local/remote terms.
    pub fn until(mut self, end: Cursor) -> Self {
        let (left, right) = self.pair.split(end);
        self.end = Some(match self.end {
            Some([l, r]) => [l.min(left), r.min(right)],
            None => [left, right],
        });
        self
    }

    /// Position after the last entry yielded.
    pub fn position(&self) -> Cursor {
        self.pair.join(self.pos[0], self.pos[1])
    }

    /// Next entry in merged order, or `None` when a bounded merge is done.
    pub async fn next(&mut self) -> Result<Option<MergedEntry>> {
        loop {
            if let Some(merged) = self.advance(self.turn).await? {
                return Ok(Some(merged));
            }
            self.turn = self.turn.other();
            if let Some(merged) = self.advance(self.turn).await? {
                return Ok(Some(merged));
            }

            if !self.live || self.at_end() {
                return Ok(None);
            }
            self.wait_for_growth().await?;
            self.turn = Side::Left;
        }
    }

    /// Place the head of `side` if it is present and eligible.
    async fn advance(&mut self, side: Side) -> Result<Option<MergedEntry>> {
        let idx = side as usize;
        let other = side.other() as usize;
        let feed = self.pair.feed(side);
        let seq = self.pos[idx];

        if self.head[idx].is_none() {
            if seq >= self.limit(side) {
                return Ok(None);
            }
            self.head[idx] = Some(load(feed, seq, self.pair.is_remote(side)).await?);
        }

        let eligible = self.head[idx]
            .as_ref()
            .is_some_and(|entry| entry.causal_mark <= self.pos[other]);
        if !eligible {
            return Ok(None);
        }

        let entry = match self.head[idx].take() {
            Some(entry) => entry,
            None => return Ok(None),
        };
        self.pos[idx] += 1;
        Ok(Some(MergedEntry {
            entry,
            seq,
            remote: self.pair.is_remote(side),
        }))
    }

    /// Entries of `side` at or past this are out of reach.
    fn limit(&self, side: Side) -> u64 {
        let len = self.pair.feed(side).len();
        match self.end {
            Some(end) => len.min(end[side as usize]),
            None => len,
        }
    }

    fn at_end(&self) -> bool {
        self.end
            .is_some_and(|end| self.pos[0] >= end[0] && self.pos[1] >= end[1])
    }

    fn open(&self, side: Side) -> bool {
        let idx = side as usize;
        self.end.map_or(true, |end| self.pos[idx] < end[idx])
    }

    async fn wait_for_growth(&self) -> Result<()> {
        let left = grow(self.pair.left, self.pos[0], self.open(Side::Left));
        let right = grow(self.pair.right, self.pos[1], self.open(Side::Right));
        tokio::select! {
            res = left => res,
            res = right => res,
        }
    }
}

/// Resolve when `feed` has an entry at `pos`.
///
/// A side whose head is already present is blocked on the other side, and a
/// side past its end has nothing left to give, so neither resolves on its
/// own.
async fn grow(feed: &dyn Feed, pos: u64, open: bool) -> Result<()> {
    if !open || feed.len() > pos {
        std::future::pending::<()>().await;
    }
    feed.wait_for_len(pos + 1).await?;
    Ok(())
}

/// Entries each side wrote that the other side has not acknowledged.
///
/// A side's acknowledgement is the causal mark of the other side's most
/// recent entry. Each side is walked backward from its tail down to the
/// larger of that mark and the cursor.
pub async fn reverse_batch(pair: FeedPair<'_>, from: Cursor) -> Result<NextBatch> {
    let (left_from, right_from) = pair.split(from);
    let left_len = pair.left.len();
    let right_len = pair.right.len();

    let left_ack = last_mark(pair, Side::Right, right_len).await?;
    let right_ack = last_mark(pair, Side::Left, left_len).await?;

    let mut entries = unacknowledged(pair, Side::Left, left_len, left_from.max(left_ack)).await?;
    entries.extend(unacknowledged(pair, Side::Right, right_len, right_from.max(right_ack)).await?);

    Ok(NextBatch {
        entries,
        tail: pair.join(left_len, right_len),
    })
}

async fn last_mark(pair: FeedPair<'_>, side: Side, len: u64) -> Result<u64> {
    if len == 0 {
        return Ok(0);
    }
    let entry = load(pair.feed(side), len - 1, pair.is_remote(side)).await?;
    Ok(entry.causal_mark)
}

async fn unacknowledged(pair: FeedPair<'_>, side: Side, len: u64, floor: u64) -> Result<Vec<MergedEntry>> {
    let feed = pair.feed(side);
    let remote = pair.is_remote(side);
    let mut out = Vec::new();

    let mut seq = len;
    while seq > floor {
        seq -= 1;
        let entry = load(feed, seq, remote).await?;
        out.push(MergedEntry { entry, seq, remote });
    }
    out.reverse();
    Ok(out)
}

/// Live two-phase walk: initiator entries flow once their causal mark is
/// drained; responder entries are buffered until one carries a commitment,
/// then released together. Never ends on its own.
pub fn accepted<'a>(
    pair: FeedPair<'a>,
    from: Cursor,
) -> impl Stream<Item = Result<MergedEntry>> + Send + 'a {
    try_stream! {
        let (mut left_pos, mut drained) = pair.split(from);
        let left_remote = pair.is_remote(Side::Left);
        let right_remote = pair.is_remote(Side::Right);
        let mut held: Vec<MergedEntry> = Vec::new();
        let mut left_head: Option<Entry> = None;

        loop {
            if left_head.is_none() && left_pos < pair.left.len() {
                left_head = Some(load(pair.left, left_pos, left_remote).await?);
            }

            let left_ready = left_head
                .as_ref()
                .is_some_and(|entry| entry.causal_mark <= drained);
            if left_ready {
                if let Some(entry) = left_head.take() {
                    yield MergedEntry { entry, seq: left_pos, remote: left_remote };
                    left_pos += 1;
                }
                continue;
            }

            // Either the left head waits on the responder or the initiator is
            // idle; both cases drain the responder.
            if drained < pair.right.len() {
                let entry = load(pair.right, drained, right_remote).await?;
                let commits = entry.commitment;
                held.push(MergedEntry { entry, seq: drained, remote: right_remote });
                drained += 1;
                if commits {
                    tracing::trace!(released = held.len(), "commitment releases held entries");
                    for merged in std::mem::take(&mut held) {
                        yield merged;
                    }
                }
                continue;
            }

            let grown = if left_head.is_some() {
                pair.right.wait_for_len(drained + 1).await
            } else {
                tokio::select! {
                    res = pair.left.wait_for_len(left_pos + 1) => res,
                    res = pair.right.wait_for_len(drained + 1) => res,
                }
            };
            grown?;
        }
    }
}
