//! Append pipeline: single-flight batched writes to the local feed.
//!
//! Callers enqueue entries and await a completion handle. One worker task
//! owns the write side of the feed: it takes whatever is queued (up to the
//! batch cap), issues one `Feed::append`, and resolves every handle in the
//! batch. Requests arriving while an append is in flight wait for the next
//! batch, so sequence numbers follow enqueue order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use autochannel_core::{Entry, EventId, EventKey};
use autochannel_feed::Feed;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};

/// Where an appended entry landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// Sequence number in the local feed.
    pub seq: u64,
    /// Event id, when the channel stamps them.
    pub event_id: Option<EventId>,
}

struct Request {
    bytes: Bytes,
    event_id: Option<EventId>,
    reply: oneshot::Sender<Result<Appended>>,
}

/// Bounded queue plus one worker task writing to the local feed.
pub struct AppendPipeline {
    tx: mpsc::Sender<Request>,
    remote: Arc<dyn Feed>,
    event_key: Option<EventKey>,
    closed: AtomicBool,
    worker: JoinHandle<()>,
}

impl AppendPipeline {
    /// Start the worker for `local`.
    ///
    /// `remote` is only read for its length, which becomes the causal mark
    /// of each enqueued entry.
    pub fn spawn(
        local: Arc<dyn Feed>,
        remote: Arc<dyn Feed>,
        event_key: Option<EventKey>,
        config: &ChannelConfig,
        span: tracing::Span,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let max_batch = config.max_batch_size.max(1);
        let worker = tokio::spawn(run_worker(local, rx, max_batch).instrument(span));

        Self {
            tx,
            remote,
            event_key,
            closed: AtomicBool::new(false),
            worker,
        }
    }

    /// Stamp `entry` and queue it for the next batch.
    ///
    /// The causal mark and event id are fixed here, at enqueue time, not when
    /// the batch is written.
    pub async fn enqueue(&self, mut entry: Entry) -> Result<Appended> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::PipelineClosed);
        }

        entry.causal_mark = self.remote.len();
        entry.event_id = self
            .event_key
            .as_ref()
            .map(|key| entry.compute_event_id(key));

        let (reply, done) = oneshot::channel();
        let request = Request {
            bytes: Bytes::from(entry.to_bytes()),
            event_id: entry.event_id,
            reply,
        };

        self.tx
            .send(request)
            .await
            .map_err(|_| ChannelError::PipelineClosed)?;
        done.await.map_err(|_| ChannelError::PipelineClosed)?
    }

    /// Stop the worker. Queued requests fail with `PipelineClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.worker.abort();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

async fn run_worker(local: Arc<dyn Feed>, mut rx: mpsc::Receiver<Request>, max_batch: usize) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while batch.len() < max_batch {
            match rx.try_recv() {
                Ok(request) => batch.push(request),
                Err(_) => break,
            }
        }

        let count = batch.len() as u64;
        let payloads = batch.iter().map(|r| r.bytes.clone()).collect();

        match local.append(payloads).await {
            Ok(len) => {
                let base = len.saturating_sub(count);
                tracing::debug!(count, len, "append batch written");
                for (seq, request) in (base..).zip(batch) {
                    // The caller may have stopped waiting; the entry is written either way.
                    let _ = request.reply.send(Ok(Appended {
                        seq,
                        event_id: request.event_id,
                    }));
                }
            }
            Err(e) => {
                tracing::warn!(count, error = %e, "append batch failed");
                let err = ChannelError::Storage(Arc::new(e));
                for request in batch {
                    let _ = request.reply.send(Err(err.clone()));
                }
            }
        }
    }
    tracing::debug!("append pipeline stopped");
}
