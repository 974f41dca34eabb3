//! Channels over SQLite-backed feeds.

use std::sync::Arc;

use autochannel::feed::{FeedStore, SqliteFeed};
use autochannel::{Channel, ChannelId, Cursor, EntryKind, Feed, Keypair, ReadOptions};
use autochannel_testkit::ordered_keypairs;
use futures::StreamExt;
use tempfile::TempDir;

struct SqlitePeer {
    local: Arc<SqliteFeed>,
    mirror: Arc<SqliteFeed>,
    channel: Channel,
}

async fn peer(store: &FeedStore, id: ChannelId, me: &Keypair, other: &Keypair) -> SqlitePeer {
    let local = Arc::new(store.writable(id, me).await.unwrap());
    let mirror = Arc::new(store.replica(id, other.feed_key()).await.unwrap());
    let channel = Channel::builder(local.clone(), mirror.clone())
        .id(id)
        .open()
        .await
        .unwrap();
    SqlitePeer {
        local,
        mirror,
        channel,
    }
}

fn payloads(entries: &[autochannel::MergedEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|m| String::from_utf8_lossy(&m.entry.payload).into_owned())
        .collect()
}

#[tokio::test]
async fn test_two_peers_over_sqlite() {
    let dir = TempDir::new().unwrap();
    let (a, b) = ordered_keypairs();
    let id = ChannelId::from_bytes([7; 32]);

    let store_a = FeedStore::open(dir.path().join("a.db")).unwrap();
    let store_b = FeedStore::open(dir.path().join("b.db")).unwrap();
    let pa = peer(&store_a, id, &a, &b).await;
    let pb = peer(&store_b, id, &b, &a).await;

    pa.channel.append(EntryKind::Data, "a0").await.unwrap();
    pb.channel.append(EntryKind::Data, "b0").await.unwrap();
    pb.mirror.replicate_from(pa.local.as_ref(), None).await.unwrap();
    pb.channel.append(EntryKind::Data, "b1").await.unwrap();
    pa.mirror.replicate_from(pb.local.as_ref(), None).await.unwrap();
    pb.mirror.replicate_from(pa.local.as_ref(), None).await.unwrap();

    let (merged_a, tail_a) = pa.channel.read_batch(None).await.unwrap();
    let (merged_b, tail_b) = pb.channel.read_batch(None).await.unwrap();
    assert_eq!(payloads(&merged_a), vec!["a0", "b0", "b1"]);
    assert_eq!(payloads(&merged_a), payloads(&merged_b));
    assert_eq!(tail_a, Cursor::new(1, 2));
    assert_eq!(tail_b, Cursor::new(2, 1));
}

#[tokio::test]
async fn test_channel_resumes_after_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("feeds.db");
    let (a, b) = ordered_keypairs();
    let id = ChannelId::from_bytes([9; 32]);

    let cursor = {
        let store = FeedStore::open(&path).unwrap();
        let p = peer(&store, id, &a, &b).await;
        for i in 0..3u8 {
            p.channel.append(EntryKind::Data, vec![i]).await.unwrap();
        }
        let read: Vec<_> = p.channel.read(None, ReadOptions::default()).collect().await;
        assert_eq!(read.len(), 3);
        p.channel.cursor()
    };

    let store = FeedStore::open(&path).unwrap();
    let feeds = store.channel_feeds(id).await.unwrap();
    assert_eq!(feeds.len(), 2);

    let local = Arc::new(store.writable(id, &a).await.unwrap());
    let mirror = Arc::new(store.replica(id, b.feed_key()).await.unwrap());
    assert_eq!(local.len(), 3);

    let channel = Channel::builder(local, mirror)
        .id(id)
        .cursor(cursor)
        .open()
        .await
        .unwrap();
    let appended = channel.append(EntryKind::Data, vec![3u8]).await.unwrap();
    assert_eq!(appended.seq, 3);

    let (rest, tail) = channel.read_batch(None).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].seq, 3);
    assert_eq!(tail, Cursor::new(4, 0));
}

#[tokio::test]
async fn test_live_read_over_sqlite() {
    let store = FeedStore::open_memory().unwrap();
    let (a, b) = ordered_keypairs();
    let p = peer(&store, ChannelId::from_bytes([1; 32]), &a, &b).await;

    let stream = p.channel.read(None, ReadOptions {
        live: true,
        ..ReadOptions::default()
    });
    futures::pin_mut!(stream);

    p.channel.append(EntryKind::Data, "x").await.unwrap();
    let merged = stream.next().await.unwrap().unwrap();
    assert_eq!(merged.seq, 0);
    assert!(!merged.remote);
}
