//! Entry: one operation appended to a feed.
//!
//! An entry is immutable once written. Besides its payload it carries the
//! causal mark: the length of the counterpart feed as seen by the writer at
//! append time.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::canonical::{decode_entry, encode_entry, event_preimage};
use crate::crypto::EventKey;
use crate::error::CoreError;
use crate::ranges::AcceptRanges;
use crate::types::EventId;

/// The current entry schema version.
pub const ENTRY_VERSION: u8 = 0;

/// The kind of entry, determining how the payload is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryKind {
    /// Application operation.
    Data = 0,
    /// Acknowledges counterpart entries; payload is an encoded range list.
    Accept = 1,
    /// Commitment marker; payload is empty.
    Commit = 2,
}

impl EntryKind {
    /// Convert to u8 for serialization.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from the wire tag.
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Data),
            1 => Some(Self::Accept),
            2 => Some(Self::Commit),
            _ => None,
        }
    }

    /// Accept and commit entries are protocol bookkeeping, not application data.
    pub fn is_control(self) -> bool {
        !matches!(self, Self::Data)
    }
}

/// A feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// How to interpret the payload.
    pub kind: EntryKind,

    /// Opaque payload bytes.
    pub payload: Bytes,

    /// Counterpart feed length observed by the writer when this was appended.
    pub causal_mark: u64,

    /// Vouches for every earlier entry of the same feed still awaiting release.
    pub commitment: bool,

    /// Content address, present when the writer has event ids enabled.
    pub event_id: Option<EventId>,
}

impl Entry {
    /// Create an entry without commitment or event id.
    pub fn new(kind: EntryKind, payload: impl Into<Bytes>, causal_mark: u64) -> Self {
        Self {
            kind,
            payload: payload.into(),
            causal_mark,
            commitment: false,
            event_id: None,
        }
    }

    /// Create an `accept` entry carrying the given ranges.
    pub fn accept(ranges: &AcceptRanges, causal_mark: u64) -> Self {
        Self::new(EntryKind::Accept, ranges.to_bytes(), causal_mark)
    }

    /// Create an empty commitment marker.
    pub fn commit_marker(causal_mark: u64) -> Self {
        Self::new(EntryKind::Commit, Bytes::new(), causal_mark).with_commitment(true)
    }

    /// Set the commitment flag.
    pub fn with_commitment(mut self, commitment: bool) -> Self {
        self.commitment = commitment;
        self
    }

    /// Compute the event id under `key`.
    ///
    /// Only `{kind, payload, causal_mark}` are hashed, so the commitment flag
    /// and any previously set id do not influence the result.
    pub fn compute_event_id(&self, key: &EventKey) -> EventId {
        EventId(key.hash(&event_preimage(self.kind, &self.payload, self.causal_mark)))
    }

    /// Attach the event id computed under `key`.
    pub fn stamped(mut self, key: &EventKey) -> Self {
        self.event_id = Some(self.compute_event_id(key));
        self
    }

    /// Check a carried event id against `key`. Entries without one pass.
    pub fn verify_event_id(&self, key: &EventKey) -> bool {
        match self.event_id {
            Some(id) => id == self.compute_event_id(key),
            None => true,
        }
    }

    /// Canonical wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_entry(self)
    }

    /// Strictly decode canonical wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        decode_entry(bytes)
    }

    /// Decode the range list of an `accept` entry.
    pub fn accept_ranges(&self) -> Result<AcceptRanges, CoreError> {
        if self.kind != EntryKind::Accept {
            return Err(CoreError::MalformedEntry(format!(
                "expected accept entry, got {:?}",
                self.kind
            )));
        }
        AcceptRanges::from_bytes(&self.payload)
    }
}
