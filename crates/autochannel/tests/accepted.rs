//! Acceptance: accept/flush, the commit stream, and the two-phase
//! accepted stream.

use std::time::Duration;

use autochannel::{ChannelConfig, ChannelError, Cursor, EntryKind, MergedEntry};
use autochannel_testkit::TwoPeers;
use futures::{Stream, StreamExt};

const QUIET: Duration = Duration::from_millis(50);

fn payload(m: &MergedEntry) -> String {
    String::from_utf8_lossy(&m.entry.payload).into_owned()
}

/// Collect whatever the stream yields until it stays quiet.
async fn take_ready<S>(stream: &mut S) -> Vec<String>
where
    S: Stream<Item = autochannel::Result<MergedEntry>> + Unpin,
{
    let mut out = Vec::new();
    while let Ok(Some(item)) = tokio::time::timeout(QUIET, stream.next()).await {
        out.push(payload(&item.unwrap()));
    }
    out
}

#[tokio::test]
async fn test_uncommitted_responder_entries_are_held() {
    let peers = TwoPeers::open().await.unwrap();
    let responder = &peers.responder.channel;
    responder.append(EntryKind::Data, "r0").await.unwrap();
    responder.append(EntryKind::Data, "r1").await.unwrap();
    peers.sync().unwrap();

    let stream = peers.initiator.channel.accepted(None);
    futures::pin_mut!(stream);
    assert!(take_ready(&mut stream).await.is_empty());

    responder.append_committed(EntryKind::Data, "r2").await.unwrap();
    peers.sync().unwrap();
    assert_eq!(take_ready(&mut stream).await, vec!["r0", "r1", "r2"]);

    // Proposed after the last commitment: never released.
    responder.append(EntryKind::Data, "r3").await.unwrap();
    peers.sync().unwrap();
    assert!(take_ready(&mut stream).await.is_empty());
}

#[tokio::test]
async fn test_commit_marker_releases_buffer() {
    let peers = TwoPeers::open().await.unwrap();
    let responder = &peers.responder.channel;
    responder.append(EntryKind::Data, "r0").await.unwrap();
    responder.commit_pending().await.unwrap();
    peers.sync().unwrap();

    let stream = peers.responder.channel.accepted(None);
    futures::pin_mut!(stream);
    let released: Vec<_> = stream.take(2).map(|r| r.unwrap()).collect().await;

    assert_eq!(payload(&released[0]), "r0");
    assert_eq!(released[1].entry.kind, EntryKind::Commit);
    assert!(released.iter().all(|m| !m.remote));
}

#[tokio::test]
async fn test_initiator_entries_pass_held_responder_entries() {
    let peers = TwoPeers::open().await.unwrap();
    peers.initiator.channel.append(EntryKind::Data, "i0").await.unwrap();
    peers.responder.channel.append(EntryKind::Data, "r0").await.unwrap();
    peers.sync().unwrap();
    // i1 has seen r0, which is not committed yet.
    peers.initiator.channel.append(EntryKind::Data, "i1").await.unwrap();

    let stream = peers.initiator.channel.accepted(None);
    futures::pin_mut!(stream);
    assert_eq!(take_ready(&mut stream).await, vec!["i0", "i1"]);

    // r0 was drained into the buffer to unblock i1 but stays held.
    peers
        .responder
        .channel
        .append_committed(EntryKind::Data, "r1")
        .await
        .unwrap();
    peers.sync().unwrap();
    assert_eq!(take_ready(&mut stream).await, vec!["r0", "r1"]);
}

#[tokio::test]
async fn test_accepted_is_the_same_on_both_peers() {
    let peers = TwoPeers::open().await.unwrap();
    peers.initiator.channel.append(EntryKind::Data, "i0").await.unwrap();
    peers
        .responder
        .channel
        .append_committed(EntryKind::Data, "r0")
        .await
        .unwrap();
    peers.sync().unwrap();
    peers.initiator.channel.append(EntryKind::Data, "i1").await.unwrap();
    peers.sync().unwrap();

    let a = peers.initiator.channel.accepted(Some(Cursor::default()));
    let b = peers.responder.channel.accepted(Some(Cursor::default()));
    futures::pin_mut!(a, b);

    let from_initiator = take_ready(&mut a).await;
    let from_responder = take_ready(&mut b).await;
    assert_eq!(from_initiator, vec!["i0", "r0", "i1"]);
    assert_eq!(from_initiator, from_responder);
}

#[tokio::test]
async fn test_flush_then_commit_stream() {
    let peers = TwoPeers::open().await.unwrap();
    for p in ["r0", "r1", "r2"] {
        peers.responder.channel.append(EntryKind::Data, p).await.unwrap();
    }
    peers.sync().unwrap();

    let initiator = &peers.initiator.channel;
    initiator.accept(0);
    initiator.accept(2);
    let appended = initiator.flush().await.unwrap().unwrap();
    assert_eq!(appended.seq, 0);
    peers.sync().unwrap();

    // Seen from the initiator the accepted entries are remote...
    let committed: Vec<_> = initiator
        .commit(None)
        .map(|r| r.unwrap())
        .collect()
        .await;
    let seqs: Vec<_> = committed.iter().map(|c| (c.seq, c.remote)).collect();
    assert_eq!(seqs, vec![(0, true), (2, true)]);
    assert_eq!(committed[1].entry.payload.as_ref(), b"r2");

    // ...and local from the responder's side.
    let committed: Vec<_> = peers
        .responder
        .channel
        .commit(None)
        .map(|r| r.unwrap())
        .collect()
        .await;
    let seqs: Vec<_> = committed.iter().map(|c| (c.seq, c.remote)).collect();
    assert_eq!(seqs, vec![(0, false), (2, false)]);
}

#[tokio::test]
async fn test_commit_stream_moves_cursor() {
    let peers = TwoPeers::open().await.unwrap();
    peers.responder.channel.append(EntryKind::Data, "r0").await.unwrap();
    peers.sync().unwrap();

    let initiator = &peers.initiator.channel;
    initiator.accept(0);
    initiator.flush().await.unwrap();

    let first: Vec<_> = initiator.commit(None).map(|r| r.unwrap()).collect().await;
    assert_eq!(first.len(), 1);
    assert_eq!(initiator.cursor(), Cursor::new(1, 1));

    let second: Vec<_> = initiator.commit(None).collect().await;
    assert!(second.is_empty());
    assert_eq!(initiator.cursor(), Cursor::new(1, 1));
}

#[tokio::test]
async fn test_commit_stream_surfaces_missing_entries() {
    let peers = TwoPeers::open().await.unwrap();
    let initiator = &peers.initiator.channel;
    initiator.accept(5);
    initiator.flush().await.unwrap();

    let results: Vec<_> = initiator.commit(None).collect().await;
    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0],
        Err(ChannelError::NotFound { seq: 5, len: 0 })
    ));
}

#[tokio::test]
async fn test_concurrent_flushes_write_once() {
    let peers = TwoPeers::open().await.unwrap();
    let channel = &peers.initiator.channel;
    channel.accept(1);
    channel.accept(2);

    let (a, b) = tokio::join!(channel.flush(), channel.flush());
    let written: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
    assert_eq!(written.len(), 1);
    assert_eq!(channel.clock().local, 1);
    assert_eq!(channel.pending_accepts(), 0);
}

#[tokio::test]
async fn test_flush_without_commitment() {
    let config = ChannelConfig {
        commit_on_flush: false,
        ..ChannelConfig::default()
    };
    let peers = TwoPeers::with_config(config).await.unwrap();
    peers.responder.channel.accept(0);
    peers.responder.channel.flush().await.unwrap();
    peers.sync().unwrap();

    // A bare accept does not release anything on the responder side.
    let stream = peers.initiator.channel.accepted(None);
    futures::pin_mut!(stream);
    assert!(take_ready(&mut stream).await.is_empty());
}
