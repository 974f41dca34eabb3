//! # Autochannel Feed
//!
//! Append-only feed abstraction for Autochannel. Provides a trait-based
//! interface over the two logs a channel merges, with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`Feed`] - The async trait every feed backend implements
//! - [`read_stream`] - Lazy bounded or live stream over any feed
//! - [`MemoryFeed`] - In-memory feed for tests and in-process peers
//! - [`FeedStore`] / [`SqliteFeed`] - SQLite-backed feeds namespaced by channel
//!
//! ## Usage
//!
//! ```rust,no_run
//! use autochannel_core::{ChannelId, Keypair};
//! use autochannel_feed::{Feed, FeedStore};
//!
//! async fn example() {
//!     let store = FeedStore::open("feeds.db").unwrap();
//!     let keypair = Keypair::from_seed(&[7; 32]);
//!     let feed = store.writable(ChannelId::from_bytes([1; 32]), &keypair).await.unwrap();
//!     feed.append(vec![b"hello".to_vec().into()]).await.unwrap();
//! }
//! ```
//!
//! Replication between peers is not part of this crate. Replicas are filled
//! by whatever transport the application runs, or by `replicate_from` in
//! tests.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{FeedError, Result};
pub use memory::MemoryFeed;
pub use sqlite::{FeedStore, SqliteFeed};
pub use traits::{read_stream, Feed, ReadStreamOptions};
