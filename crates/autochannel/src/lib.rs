//! # Autochannel
//!
//! Pairwise causal replication over two append-only feeds.
//!
//! ## Overview
//!
//! Each peer owns one feed and mirrors the other's. A [`Channel`] over that
//! pair provides:
//!
//! - **Merge**: a deterministic, causally consistent interleaving of both feeds
//! - **Acceptance**: peers acknowledge each other's entries with compact
//!   `accept` entries, and a two-phase stream releases committed work
//! - **Batched appends**: concurrent writes share a single feed append
//!
//! ## Key Concepts
//!
//! - **Causal mark**: every entry records how much of the other feed its
//!   writer had seen. The merge never places an entry before those.
//! - **Roles**: the smaller feed key is the initiator; its entries go first
//!   whenever both sides are eligible.
//! - **Cursor**: the next unmerged position in each feed.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use autochannel::{Channel, ReadOptions};
//! use autochannel::core::{EntryKind, Keypair};
//! use autochannel::feed::MemoryFeed;
//! use futures::StreamExt;
//!
//! async fn example(peer: Keypair) {
//!     let me = Keypair::from_seed(&[7; 32]);
//!     let local = Arc::new(MemoryFeed::new(&me));
//!     let remote = Arc::new(MemoryFeed::replica(peer.feed_key()));
//!
//!     let channel = Channel::open(local, remote).await.unwrap();
//!     channel.append(EntryKind::Data, b"hello".to_vec()).await.unwrap();
//!
//!     let merged: Vec<_> = channel.read(None, ReadOptions::default()).collect().await;
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `autochannel::core` - Entries, clocks, accept ranges
//! - `autochannel::feed` - Feed trait and backends

pub mod channel;
pub mod config;
pub mod error;
pub mod merge;
pub mod pipeline;

// Re-export component crates
pub use autochannel_core as core;
pub use autochannel_feed as feed;

// Re-export main types for convenience
pub use channel::{Channel, ChannelBuilder, CommittedEntry, ReadOptions};
pub use config::ChannelConfig;
pub use error::{ChannelError, Result};
pub use merge::{MergedEntry, NextBatch};
pub use pipeline::{AppendPipeline, Appended};

// Re-export commonly used core types
pub use autochannel_core::{
    compare, compress, expand, union, AcceptRanges, ChannelId, Cursor, Entry, EntryKind, FeedKey,
    Keypair, Role, VectorClock,
};
pub use autochannel_feed::Feed;
