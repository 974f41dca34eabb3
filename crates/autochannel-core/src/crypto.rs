//! Cryptographic primitives for Autochannel.
//!
//! Feeds are identified by Ed25519 public keys. Event IDs are Blake3 keyed
//! hashes under a key both peers derive from the pair of feed keys.

use ed25519_dalek::SigningKey;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Context string for deriving the per-channel event-id key.
const EVENT_KEY_CONTEXT: &str = "autochannel 2024 event-id v0";

/// A 32-byte feed identity (Ed25519 public key of the feed owner).
///
/// Ordering is plain lexicographic byte order; roles are assigned from it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeedKey(pub [u8; 32]);

impl FeedKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeedKey({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for FeedKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for FeedKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// The keypair owning a writable feed.
///
/// Only the public half is used as the feed identity; the secret stays with
/// the writer so replicas can be built from the key alone.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new keypair from the given CSPRNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let signing_key = SigningKey::generate(rng);
        Self { signing_key }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// The feed key for this keypair.
    pub fn feed_key(&self) -> FeedKey {
        FeedKey(self.signing_key.verifying_key().to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.feed_key())
    }
}

/// Key for the event-id keyed hash.
///
/// Derived from both feed keys in role order, so the two peers of a channel
/// arrive at the same key without exchanging it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EventKey([u8; 32]);

impl EventKey {
    /// Derive the key for the channel between `initiator` and `responder`.
    pub fn derive(initiator: &FeedKey, responder: &FeedKey) -> Self {
        let mut material = [0u8; 64];
        material[..32].copy_from_slice(&initiator.0);
        material[32..].copy_from_slice(&responder.0);
        Self(blake3::derive_key(EVENT_KEY_CONTEXT, &material))
    }

    /// Keyed Blake3 hash of `data`.
    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        *blake3::keyed_hash(&self.0, data).as_bytes()
    }
}

impl fmt::Debug for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_keypair_deterministic_from_seed() {
        let seed = [0x42u8; 32];
        let kp1 = Keypair::from_seed(&seed);
        let kp2 = Keypair::from_seed(&seed);
        assert_eq!(kp1.feed_key(), kp2.feed_key());
    }

    #[test]
    fn test_keypair_generate_uses_injected_rng() {
        let kp1 = Keypair::generate(&mut StdRng::seed_from_u64(7));
        let kp2 = Keypair::generate(&mut StdRng::seed_from_u64(7));
        let kp3 = Keypair::generate(&mut StdRng::seed_from_u64(8));
        assert_eq!(kp1.feed_key(), kp2.feed_key());
        assert_ne!(kp1.feed_key(), kp3.feed_key());
    }

    #[test]
    fn test_feed_key_hex_roundtrip() {
        let key = Keypair::from_seed(&[1; 32]).feed_key();
        let recovered = FeedKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(key, recovered);
        assert!(FeedKey::from_hex("abcd").is_err());
    }

    #[test]
    fn test_event_key_depends_on_order() {
        let a = FeedKey::from_bytes([1; 32]);
        let b = FeedKey::from_bytes([2; 32]);
        let ab = EventKey::derive(&a, &b);
        let ba = EventKey::derive(&b, &a);
        assert_eq!(ab, EventKey::derive(&a, &b));
        assert_ne!(ab, ba);
        assert_ne!(ab.hash(b"x"), ba.hash(b"x"));
    }
}
