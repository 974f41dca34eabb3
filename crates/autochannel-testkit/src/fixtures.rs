//! Test fixtures and helpers.
//!
//! The main fixture is [`TwoPeers`]: two channels over in-memory feeds, each
//! peer with its own mirror of the other. Nothing replicates on its own;
//! tests move entries across explicitly, which makes lagging replication
//! easy to script.

use std::sync::Arc;

use autochannel::{Channel, ChannelConfig};
use autochannel_core::{ChannelId, Entry, EntryKind, FeedKey, Keypair};
use autochannel_feed::{Feed, MemoryFeed};
use bytes::Bytes;

use crate::generators::Op;

/// Fixed seeds for the two fixture peers; roles are decided by [`ordered_keypairs`].
const SEED_ONE: [u8; 32] = [0x11; 32];
const SEED_TWO: [u8; 32] = [0x22; 32];

/// Two keypairs ordered as (initiator, responder).
pub fn ordered_keypairs() -> (Keypair, Keypair) {
    let one = Keypair::from_seed(&SEED_ONE);
    let two = Keypair::from_seed(&SEED_TWO);
    if one.feed_key() < two.feed_key() {
        (one, two)
    } else {
        (two, one)
    }
}

/// Canonical bytes of an entry with the given fields and no event id.
pub fn encoded(kind: EntryKind, payload: &[u8], causal_mark: u64, commitment: bool) -> Bytes {
    let entry = Entry::new(kind, payload.to_vec(), causal_mark).with_commitment(commitment);
    Bytes::from(entry.to_bytes())
}

/// One side of a [`TwoPeers`] fixture.
pub struct Peer {
    pub keypair: Keypair,
    /// Feed this peer writes.
    pub local: Arc<MemoryFeed>,
    /// This peer's copy of the other peer's feed.
    pub mirror: Arc<MemoryFeed>,
    pub channel: Channel,
}

/// Two peers with independent, manually replicated mirrors.
pub struct TwoPeers {
    pub initiator: Peer,
    pub responder: Peer,
}

impl TwoPeers {
    /// Open both channels with default configuration.
    pub async fn open() -> anyhow::Result<Self> {
        Self::with_config(ChannelConfig::default()).await
    }

    /// Open both channels with `config`.
    pub async fn with_config(config: ChannelConfig) -> anyhow::Result<Self> {
        let (init_kp, resp_kp) = ordered_keypairs();
        let id = ChannelId::from_bytes([0xc4; 32]);

        let initiator = Self::peer(init_kp, resp_kp.feed_key(), id, config.clone()).await?;
        let responder = Self::peer(resp_kp, initiator.keypair.feed_key(), id, config).await?;
        Ok(Self {
            initiator,
            responder,
        })
    }

    async fn peer(
        keypair: Keypair,
        other: FeedKey,
        id: ChannelId,
        config: ChannelConfig,
    ) -> anyhow::Result<Peer> {
        let local = Arc::new(MemoryFeed::new(&keypair));
        let mirror = Arc::new(MemoryFeed::replica(other));
        let channel = Channel::builder(local.clone(), mirror.clone())
            .id(id)
            .config(config)
            .open()
            .await?;
        Ok(Peer {
            keypair,
            local,
            mirror,
            channel,
        })
    }

    /// Copy initiator entries to the responder's mirror, up to `upto`.
    pub fn deliver_to_responder(&self, upto: Option<u64>) -> anyhow::Result<u64> {
        Ok(self
            .responder
            .mirror
            .replicate_from(&self.initiator.local, upto)?)
    }

    /// Copy responder entries to the initiator's mirror, up to `upto`.
    pub fn deliver_to_initiator(&self, upto: Option<u64>) -> anyhow::Result<u64> {
        Ok(self
            .initiator
            .mirror
            .replicate_from(&self.responder.local, upto)?)
    }

    /// Bring both mirrors fully up to date.
    pub fn sync(&self) -> anyhow::Result<()> {
        self.deliver_to_responder(None)?;
        self.deliver_to_initiator(None)?;
        Ok(())
    }
}

/// Raw feeds produced by replaying a schedule of [`Op`]s.
pub struct Played {
    pub initiator_local: MemoryFeed,
    pub initiator_mirror: MemoryFeed,
    pub responder_local: MemoryFeed,
    pub responder_mirror: MemoryFeed,
}

impl Played {
    /// Bring both mirrors fully up to date.
    pub fn sync(&self) -> anyhow::Result<()> {
        self.initiator_mirror
            .replicate_from(&self.responder_local, None)?;
        self.responder_mirror
            .replicate_from(&self.initiator_local, None)?;
        Ok(())
    }
}

/// Replay `ops` against fresh feeds, writing entries whose causal mark is
/// the writer's mirror length at the time, as a channel would.
///
/// Payloads are `i<n>` / `r<n>` with `n` the writer's sequence number.
pub async fn play(ops: &[Op]) -> anyhow::Result<Played> {
    let (init_kp, resp_kp) = ordered_keypairs();
    let played = Played {
        initiator_local: MemoryFeed::new(&init_kp),
        initiator_mirror: MemoryFeed::replica(resp_kp.feed_key()),
        responder_local: MemoryFeed::new(&resp_kp),
        responder_mirror: MemoryFeed::replica(init_kp.feed_key()),
    };

    for op in ops {
        match *op {
            Op::InitiatorWrites { commitment } => {
                let seq = played.initiator_local.len();
                let mark = played.initiator_mirror.len();
                let bytes = encoded(EntryKind::Data, format!("i{}", seq).as_bytes(), mark, commitment);
                played.initiator_local.append(vec![bytes]).await?;
            }
            Op::ResponderWrites { commitment } => {
                let seq = played.responder_local.len();
                let mark = played.responder_mirror.len();
                let bytes = encoded(EntryKind::Data, format!("r{}", seq).as_bytes(), mark, commitment);
                played.responder_local.append(vec![bytes]).await?;
            }
            Op::DeliverToInitiator => {
                played
                    .initiator_mirror
                    .replicate_from(&played.responder_local, None)?;
            }
            Op::DeliverToResponder => {
                played
                    .responder_mirror
                    .replicate_from(&played.initiator_local, None)?;
            }
        }
    }

    Ok(played)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autochannel::ReadOptions;
    use autochannel_core::Role;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_keypairs_are_ordered() {
        let (a, b) = ordered_keypairs();
        assert!(a.feed_key() < b.feed_key());
    }

    #[tokio::test]
    async fn test_two_peers_roles() {
        let peers = TwoPeers::open().await.unwrap();
        assert_eq!(peers.initiator.channel.role(), Role::Initiator);
        assert_eq!(peers.responder.channel.role(), Role::Responder);
        assert_eq!(peers.initiator.channel.id(), peers.responder.channel.id());
    }

    #[tokio::test]
    async fn test_delivery_is_manual() {
        let peers = TwoPeers::open().await.unwrap();
        peers
            .initiator
            .channel
            .append(EntryKind::Data, b"hi".to_vec())
            .await
            .unwrap();

        assert_eq!(peers.responder.mirror.len(), 0);
        peers.sync().unwrap();
        assert_eq!(peers.responder.mirror.len(), 1);

        let merged: Vec<_> = peers
            .responder
            .channel
            .read(None, ReadOptions::default())
            .collect()
            .await;
        assert_eq!(merged.len(), 1);
        assert!(merged[0].as_ref().unwrap().remote);
    }

    #[tokio::test]
    async fn test_play_sets_marks_from_mirror() {
        let ops = [
            Op::ResponderWrites { commitment: false },
            Op::DeliverToInitiator,
            Op::InitiatorWrites { commitment: false },
        ];
        let played = play(&ops).await.unwrap();

        let entry = Entry::from_bytes(&played.initiator_local.get(0).await.unwrap()).unwrap();
        assert_eq!(entry.causal_mark, 1);
        assert_eq!(entry.payload.as_ref(), b"i0");
    }
}
