//! A feed wrapper that records and controls `append` calls.
//!
//! Used to observe batching (how many backend appends a burst of writes
//! turns into), to hold an append in flight, and to inject failures.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;

use autochannel_core::FeedKey;
use autochannel_feed::{Feed, FeedError, Result};

/// Wraps another feed, counting appends and optionally gating them.
pub struct InstrumentedFeed {
    inner: Arc<dyn Feed>,
    batches: Mutex<Vec<usize>>,
    started_tx: watch::Sender<usize>,
    gate_tx: watch::Sender<bool>,
    failures: AtomicU32,
}

impl InstrumentedFeed {
    /// Wrap `inner`. Appends pass straight through until [`hold`](Self::hold).
    pub fn new(inner: Arc<dyn Feed>) -> Self {
        let (started_tx, _) = watch::channel(0);
        let (gate_tx, _) = watch::channel(true);
        Self {
            inner,
            batches: Mutex::new(Vec::new()),
            started_tx,
            gate_tx,
            failures: AtomicU32::new(0),
        }
    }

    /// Block subsequent appends before they reach the inner feed.
    pub fn hold(&self) {
        self.gate_tx.send_replace(false);
    }

    /// Let held and future appends proceed.
    pub fn release(&self) {
        self.gate_tx.send_replace(true);
    }

    /// Make the next `n` appends fail with [`FeedError::Backend`].
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Number of append calls that have completed, failed or not.
    pub fn append_calls(&self) -> usize {
        self.batches.lock().len()
    }

    /// Batch size of each completed append call, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().clone()
    }

    /// Wait until at least `n` append calls have been entered.
    pub async fn wait_for_append_started(&self, n: usize) {
        let mut rx = self.started_tx.subscribe();
        // Sender lives as long as self.
        let _ = rx.wait_for(|started| *started >= n).await;
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Feed for InstrumentedFeed {
    fn key(&self) -> FeedKey {
        self.inner.key()
    }

    async fn ready(&self) -> Result<()> {
        self.inner.ready().await
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    async fn get(&self, seq: u64) -> Result<Bytes> {
        self.inner.get(seq).await
    }

    async fn append(&self, entries: Vec<Bytes>) -> Result<u64> {
        self.started_tx.send_modify(|started| *started += 1);

        let mut gate = self.gate_tx.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let size = entries.len();
        let result = if self.take_failure() {
            Err(FeedError::Backend("injected append failure".into()))
        } else {
            self.inner.append(entries).await
        };
        self.batches.lock().push(size);
        result
    }

    async fn wait_for_len(&self, min: u64) -> Result<u64> {
        self.inner.wait_for_len(min).await
    }

    fn is_writable(&self) -> bool {
        self.inner.is_writable()
    }
}
