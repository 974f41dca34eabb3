//! SQLite implementation of the Feed trait.
//!
//! A [`FeedStore`] owns one database and hands out [`SqliteFeed`] handles
//! namespaced by channel id, so many channels can share a file. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use autochannel_core::{ChannelId, FeedKey, Keypair};
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::watch;

use crate::error::{FeedError, Result};
use crate::migration;
use crate::traits::Feed;

/// SQLite-backed store of channel feeds.
///
/// Thread-safe via internal Mutex. Cloning is cheap and shares the
/// connection.
#[derive(Clone)]
pub struct FeedStore {
    conn: Arc<Mutex<Connection>>,
}

impl FeedStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open (creating if needed) the feed owned by `keypair` in `channel`.
    pub async fn writable(&self, channel: ChannelId, keypair: &Keypair) -> Result<SqliteFeed> {
        self.open_feed(channel, keypair.feed_key(), true).await
    }

    /// Open (creating if needed) a read-only mirror of `key` in `channel`.
    pub async fn replica(&self, channel: ChannelId, key: FeedKey) -> Result<SqliteFeed> {
        self.open_feed(channel, key, false).await
    }

    /// List the feeds registered under `channel` with their writability.
    pub async fn channel_feeds(&self, channel: ChannelId) -> Result<Vec<(FeedKey, bool)>> {
        blocking(self.conn.clone(), move |conn| {
            let mut stmt = conn.prepare(
                "SELECT feed_key, writable FROM feeds WHERE channel_id = ?1 ORDER BY feed_key",
            )?;
            let rows = stmt.query_map(params![channel.as_bytes().as_slice()], |row| {
                Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, bool>(1)?))
            })?;

            let mut feeds = Vec::new();
            for row in rows {
                let (key, writable) = row?;
                feeds.push((feed_key_from_blob(key)?, writable));
            }
            Ok(feeds)
        })
        .await
    }

    async fn open_feed(&self, channel: ChannelId, key: FeedKey, writable: bool) -> Result<SqliteFeed> {
        let len = blocking(self.conn.clone(), move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO feeds (channel_id, feed_key, writable, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    channel.as_bytes().as_slice(),
                    key.as_bytes().as_slice(),
                    writable,
                    now_millis()
                ],
            )?;

            let stored_writable: bool = tx.query_row(
                "SELECT writable FROM feeds WHERE channel_id = ?1 AND feed_key = ?2",
                params![channel.as_bytes().as_slice(), key.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            if writable && !stored_writable {
                return Err(FeedError::InvalidData(format!(
                    "feed {} is stored as a replica in channel {}",
                    key, channel
                )));
            }

            let len = stored_len(&tx, &channel, &key)?;
            tx.commit()?;
            Ok(len)
        })
        .await?;

        tracing::debug!(%channel, feed = %key, writable, len, "sqlite feed opened");

        let (len_tx, _) = watch::channel(len);
        Ok(SqliteFeed {
            conn: self.conn.clone(),
            channel,
            key,
            writable,
            len_tx,
        })
    }
}

/// A feed stored in a [`FeedStore`].
pub struct SqliteFeed {
    conn: Arc<Mutex<Connection>>,
    channel: ChannelId,
    key: FeedKey,
    writable: bool,
    len_tx: watch::Sender<u64>,
}

impl SqliteFeed {
    /// The channel this feed is namespaced under.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Copy entries this replica is missing from `source`, up to `upto`
    /// (exclusive) or the source's full length. Returns the new length.
    pub async fn replicate_from(&self, source: &dyn Feed, upto: Option<u64>) -> Result<u64> {
        if source.key() != self.key {
            return Err(FeedError::KeyMismatch {
                expected: self.key,
                found: source.key(),
            });
        }

        let have = self.len();
        let end = upto.map_or(source.len(), |upto| upto.min(source.len()));
        let mut missing = Vec::new();
        for seq in have..end {
            missing.push(source.get(seq).await?);
        }
        if missing.is_empty() {
            return Ok(have);
        }
        self.write_batch(missing).await
    }

    async fn write_batch(&self, entries: Vec<Bytes>) -> Result<u64> {
        let channel = self.channel;
        let key = self.key;
        let count = entries.len();

        let len = blocking(self.conn.clone(), move |conn| {
            let tx = conn.transaction()?;
            let start = stored_len(&tx, &channel, &key)?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO feed_entries (channel_id, feed_key, seq, data)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for (seq, data) in (start..).zip(entries.iter()) {
                    stmt.execute(params![
                        channel.as_bytes().as_slice(),
                        key.as_bytes().as_slice(),
                        seq,
                        &data[..]
                    ])?;
                }
            }
            tx.commit()?;
            Ok(start + count as u64)
        })
        .await?;

        self.publish_len(len);
        tracing::trace!(channel = %self.channel, feed = %self.key, count, len, "sqlite feed append");
        Ok(len)
    }

    fn publish_len(&self, len: u64) {
        self.len_tx.send_if_modified(|current| {
            if len > *current {
                *current = len;
                true
            } else {
                false
            }
        });
    }
}

#[async_trait]
impl Feed for SqliteFeed {
    fn key(&self) -> FeedKey {
        self.key
    }

    async fn ready(&self) -> Result<()> {
        let channel = self.channel;
        let key = self.key;
        let len = blocking(self.conn.clone(), move |conn| stored_len(conn, &channel, &key)).await?;
        self.publish_len(len);
        Ok(())
    }

    fn len(&self) -> u64 {
        *self.len_tx.borrow()
    }

    async fn get(&self, seq: u64) -> Result<Bytes> {
        let channel = self.channel;
        let key = self.key;
        let data = blocking(self.conn.clone(), move |conn| {
            Ok(conn
                .query_row(
                    "SELECT data FROM feed_entries
                     WHERE channel_id = ?1 AND feed_key = ?2 AND seq = ?3",
                    params![channel.as_bytes().as_slice(), key.as_bytes().as_slice(), seq],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()?)
        })
        .await?;

        data.map(Bytes::from).ok_or(FeedError::NotFound {
            seq,
            len: self.len(),
        })
    }

    async fn append(&self, entries: Vec<Bytes>) -> Result<u64> {
        if !self.writable {
            return Err(FeedError::ReadOnly(self.key));
        }
        if entries.is_empty() {
            return Ok(self.len());
        }
        self.write_batch(entries).await
    }

    async fn wait_for_len(&self, min: u64) -> Result<u64> {
        let mut rx = self.len_tx.subscribe();
        let len = *rx
            .wait_for(|len| *len >= min)
            .await
            .map_err(|_| FeedError::Closed)?;
        Ok(len)
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| {
        FeedError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            Some(format!("mutex poisoned: {}", e)),
        ))
    })
}

/// Run `f` against the connection on the blocking pool.
async fn blocking<F, T>(conn: Arc<Mutex<Connection>>, f: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = lock(&conn)?;
        f(&mut conn)
    })
    .await
    .map_err(|e| FeedError::Task(e.to_string()))?
}

fn stored_len(conn: &Connection, channel: &ChannelId, key: &FeedKey) -> Result<u64> {
    let len: u64 = conn.query_row(
        "SELECT COALESCE(MAX(seq) + 1, 0) FROM feed_entries
         WHERE channel_id = ?1 AND feed_key = ?2",
        params![channel.as_bytes().as_slice(), key.as_bytes().as_slice()],
        |row| row.get(0),
    )?;
    Ok(len)
}

fn feed_key_from_blob(blob: Vec<u8>) -> Result<FeedKey> {
    let bytes: [u8; 32] = blob
        .try_into()
        .map_err(|b: Vec<u8>| FeedError::InvalidData(format!("feed key of {} bytes", b.len())))?;
    Ok(FeedKey::from_bytes(bytes))
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFeed;

    fn channel(n: u8) -> ChannelId {
        ChannelId::from_bytes([n; 32])
    }

    fn keypair(seed: u8) -> Keypair {
        Keypair::from_seed(&[seed; 32])
    }

    #[tokio::test]
    async fn test_append_and_get() {
        let store = FeedStore::open_memory().unwrap();
        let feed = store.writable(channel(1), &keypair(1)).await.unwrap();
        assert!(feed.is_writable());
        assert_eq!(feed.len(), 0);

        let len = feed
            .append(vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")])
            .await
            .unwrap();
        assert_eq!(len, 2);
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.get(1).await.unwrap(), Bytes::from_static(b"b"));
        assert!(matches!(
            feed.get(2).await.unwrap_err(),
            FeedError::NotFound { seq: 2, len: 2 }
        ));
    }

    #[tokio::test]
    async fn test_feeds_are_namespaced_by_channel() {
        let store = FeedStore::open_memory().unwrap();
        let kp = keypair(1);
        let first = store.writable(channel(1), &kp).await.unwrap();
        let second = store.writable(channel(2), &kp).await.unwrap();

        first.append(vec![Bytes::from_static(b"one")]).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 0);

        let feeds = store.channel_feeds(channel(1)).await.unwrap();
        assert_eq!(feeds, vec![(kp.feed_key(), true)]);
    }

    #[tokio::test]
    async fn test_replica_cannot_be_reopened_writable() {
        let store = FeedStore::open_memory().unwrap();
        let kp = keypair(1);
        let replica = store.replica(channel(1), kp.feed_key()).await.unwrap();
        assert!(matches!(
            replica.append(vec![Bytes::new()]).await,
            Err(FeedError::ReadOnly(_))
        ));

        let err = store.writable(channel(1), &kp).await.err().unwrap();
        assert!(matches!(err, FeedError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_replicate_from_memory_feed() {
        let store = FeedStore::open_memory().unwrap();
        let kp = keypair(3);
        let source = MemoryFeed::new(&kp);
        let batch = (0..4u8).map(|i| Bytes::from(vec![i])).collect();
        source.append(batch).await.unwrap();

        let replica = store.replica(channel(1), kp.feed_key()).await.unwrap();
        assert_eq!(replica.replicate_from(&source, Some(3)).await.unwrap(), 3);
        assert_eq!(replica.replicate_from(&source, None).await.unwrap(), 4);
        assert_eq!(replica.get(3).await.unwrap(), Bytes::from(vec![3]));

        let other = MemoryFeed::new(&keypair(4));
        assert!(matches!(
            replica.replicate_from(&other, None).await,
            Err(FeedError::KeyMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_length_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeds.db");
        let kp = keypair(5);

        {
            let store = FeedStore::open(&path).unwrap();
            let feed = store.writable(channel(9), &kp).await.unwrap();
            feed.append(vec![Bytes::from_static(b"x"), Bytes::from_static(b"y")])
                .await
                .unwrap();
        }

        let store = FeedStore::open(&path).unwrap();
        let feed = store.writable(channel(9), &kp).await.unwrap();
        feed.ready().await.unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.append(vec![Bytes::from_static(b"z")]).await.unwrap(), 3);
        assert_eq!(feed.get(0).await.unwrap(), Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn test_ready_picks_up_writes_from_another_handle() {
        let store = FeedStore::open_memory().unwrap();
        let kp = keypair(6);
        let writer = store.writable(channel(1), &kp).await.unwrap();
        let reader = store.replica(channel(1), kp.feed_key()).await.unwrap();

        writer.append(vec![Bytes::from_static(b"a")]).await.unwrap();
        assert_eq!(reader.len(), 0);
        reader.ready().await.unwrap();
        assert_eq!(reader.len(), 1);
        assert_eq!(reader.wait_for_len(1).await.unwrap(), 1);
    }
}
