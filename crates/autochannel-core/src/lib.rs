//! # Autochannel Core
//!
//! Pure primitives for two-party causal replication: entries, clocks,
//! accept ranges and their canonical encoding.
//!
//! This crate contains no I/O, no storage, no async. It is pure computation
//! over the data both peers of a channel write to their feeds.
//!
//! ## Key Types
//!
//! - [`Entry`] - One operation in a feed, carrying its causal mark
//! - [`VectorClock`] - Both feed lengths as seen by one peer
//! - [`Cursor`] - Merge position in both feeds
//! - [`AcceptRanges`] - Compact set of acknowledged sequence numbers
//! - [`FeedKey`] / [`Role`] - Feed identity and the role it implies
//!
//! ## Canonicalization
//!
//! Entries are encoded using deterministic CBOR. See [`canonical`] module.

pub mod canonical;
pub mod clock;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod ranges;
pub mod types;

pub use clock::{compare, union, Cursor, Role, VectorClock};
pub use crypto::{EventKey, FeedKey, Keypair};
pub use entry::{Entry, EntryKind, ENTRY_VERSION};
pub use error::CoreError;
pub use ranges::{compress, expand, AcceptRanges};
pub use types::{ChannelId, EventId};
