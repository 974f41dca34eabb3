//! Two-party vector clocks.
//!
//! With exactly two writers a vector clock collapses to a pair of feed
//! lengths: what the owner has written (`local`) and what it has observed of
//! its peer (`remote`). Each side's `local` is the other side's `remote`, so
//! clocks taken on different peers are compared after swapping the fields
//! when their keys differ.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::crypto::FeedKey;
use crate::error::CoreError;

/// A snapshot of both feed lengths as seen by the owner of `key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorClock {
    /// Key of the feed whose owner took the snapshot.
    pub key: FeedKey,
    /// Length of the owner's feed.
    pub local: u64,
    /// Length of the peer's feed as observed by the owner.
    pub remote: u64,
}

impl VectorClock {
    /// Create a new clock.
    pub const fn new(key: FeedKey, local: u64, remote: u64) -> Self {
        Self { key, local, remote }
    }

    /// `(local, remote)` of `other` expressed from this clock's point of view.
    fn aligned(&self, other: &VectorClock) -> (u64, u64) {
        if self.key == other.key {
            (other.local, other.remote)
        } else {
            (other.remote, other.local)
        }
    }

    /// Re-express this clock from the point of view of `key`'s owner.
    ///
    /// Clocks are only meaningful between the two feeds of one channel, so
    /// any key other than our own is taken to be the peer.
    pub fn viewed_from(&self, key: FeedKey) -> VectorClock {
        if self.key == key {
            *self
        } else {
            VectorClock::new(key, self.remote, self.local)
        }
    }
}

/// Partial order over optional clocks.
///
/// - `None` is behind any clock; two `None`s are equal.
/// - `Some(Greater)` when `a` dominates `b` with at least one strict
///   component, `Some(Less)` for the mirror case, `Some(Equal)` when both
///   components match.
/// - `None` (the return value) when the clocks are concurrent.
pub fn compare(a: Option<&VectorClock>, b: Option<&VectorClock>) -> Option<Ordering> {
    let (a, b) = match (a, b) {
        (None, None) => return Some(Ordering::Equal),
        (None, Some(_)) => return Some(Ordering::Less),
        (Some(_), None) => return Some(Ordering::Greater),
        (Some(a), Some(b)) => (a, b),
    };

    let (b_local, b_remote) = a.aligned(b);
    match (a.local.cmp(&b_local), a.remote.cmp(&b_remote)) {
        (Ordering::Equal, Ordering::Equal) => Some(Ordering::Equal),
        (Ordering::Less | Ordering::Equal, Ordering::Less | Ordering::Equal) => Some(Ordering::Less),
        (Ordering::Greater | Ordering::Equal, Ordering::Greater | Ordering::Equal) => {
            Some(Ordering::Greater)
        }
        _ => None,
    }
}

/// Least upper bound of two optional clocks, keyed as `a`.
pub fn union(a: Option<&VectorClock>, b: Option<&VectorClock>) -> Option<VectorClock> {
    match (a, b) {
        (None, None) => None,
        (None, Some(b)) => Some(*b),
        (Some(a), None) => Some(*a),
        (Some(a), Some(b)) => {
            let (b_local, b_remote) = a.aligned(b);
            Some(VectorClock {
                key: a.key,
                local: a.local.max(b_local),
                remote: a.remote.max(b_remote),
            })
        }
    }
}

/// Merge position in both feeds of a channel.
///
/// Each field is the next sequence number not yet merged from that feed,
/// which is also the number of entries already merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
    /// Position in the local feed.
    pub local: u64,
    /// Position in the remote feed.
    pub remote: u64,
}

impl Cursor {
    /// Create a cursor.
    pub const fn new(local: u64, remote: u64) -> Self {
        Self { local, remote }
    }

    /// Whether `self` is at or past `other` on both feeds.
    pub fn covers(&self, other: &Cursor) -> bool {
        self.local >= other.local && self.remote >= other.remote
    }

    /// Component-wise maximum, used so a stored cursor never regresses.
    pub fn max(self, other: Cursor) -> Cursor {
        Cursor {
            local: self.local.max(other.local),
            remote: self.remote.max(other.remote),
        }
    }
}

/// Which side of a channel a feed owner plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Owner of the lexicographically smaller feed key.
    Initiator,
    /// Owner of the larger feed key.
    Responder,
}

impl Role {
    /// Assign the local role from the two feed keys.
    ///
    /// Both peers evaluate this with the arguments swapped and arrive at
    /// complementary roles, so no handshake is needed.
    pub fn assign(local: &FeedKey, remote: &FeedKey) -> Result<Role, CoreError> {
        match local.cmp(remote) {
            Ordering::Less => Ok(Role::Initiator),
            Ordering::Greater => Ok(Role::Responder),
            Ordering::Equal => Err(CoreError::SameFeedKey(*local)),
        }
    }

    /// The role of the peer.
    pub fn peer(self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }

    /// Whether this is the initiator role.
    pub fn is_initiator(self) -> bool {
        matches!(self, Role::Initiator)
    }
}
