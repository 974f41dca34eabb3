//! # Autochannel Testkit
//!
//! Testing utilities for Autochannel.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known entry and range encodings for cross-platform verification
//! - **Generators**: Proptest strategies for entries and two-peer schedules
//! - **Fixtures**: Two peers with manually replicated mirrors
//! - **Instrumented feeds**: Count, hold, and fail backend appends
//!
//! ## Golden Vectors
//!
//! ```rust
//! use autochannel_testkit::vectors::verify_all_vectors;
//!
//! for result in verify_all_vectors().unwrap() {
//!     assert!(result.matches, "{}: {}", result.name, result.actual);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use autochannel_testkit::{generators::schedule, play};
//!
//! proptest! {
//!     #[test]
//!     fn merge_is_deterministic(ops in schedule(32)) {
//!         // replay `ops` with `play` and compare merged views
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use autochannel::core::EntryKind;
//! use autochannel_testkit::TwoPeers;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let peers = TwoPeers::open().await?;
//! peers.initiator.channel.append(EntryKind::Data, b"hi".to_vec()).await?;
//! peers.sync()?;
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod generators;
pub mod instrumented;
pub mod vectors;

pub use fixtures::{encoded, ordered_keypairs, play, Peer, Played, TwoPeers};
pub use generators::{schedule, Op};
pub use instrumented::InstrumentedFeed;
pub use vectors::{all_vectors, entry_from_vector, verify_all_vectors, GoldenVector};
