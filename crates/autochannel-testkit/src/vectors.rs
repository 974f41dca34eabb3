//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the canonical encoding of entries, their event-id
//! preimages and accept ranges, so every implementation produces the same
//! bytes.

use serde::Serialize;

use autochannel_core::canonical::event_preimage;
use autochannel_core::{AcceptRanges, Entry, EntryKind, EventId, EventKey, Keypair};

/// A golden entry vector.
#[derive(Debug, Clone, Serialize)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub kind: u8,
    /// Payload bytes (hex).
    pub payload: &'static str,
    pub causal_mark: u64,
    pub commitment: bool,
    /// Byte repeated 32 times to form the event id, if any.
    pub event_id_fill: Option<u8>,
    /// Expected canonical entry bytes (hex).
    pub expected_entry: &'static str,
    /// Expected event-id preimage (hex).
    pub expected_preimage: &'static str,
}

/// A golden accept-range vector.
#[derive(Debug, Clone, Serialize)]
pub struct RangeVector {
    pub name: &'static str,
    pub ranges: &'static [(u64, u64)],
    /// Expected canonical bytes (hex).
    pub expected: &'static str,
}

/// Get all golden entry vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "data hello",
            kind: 0,
            payload: "68656c6c6f",
            causal_mark: 0,
            commitment: false,
            event_id_fill: None,
            expected_entry: "a600000100024568656c6c6f030004f405f6",
            expected_preimage: "a30100024568656c6c6f0300",
        },
        GoldenVector {
            name: "accept with commitment",
            kind: 1,
            payload: "82820002820505",
            causal_mark: 3,
            commitment: true,
            event_id_fill: None,
            expected_entry: "a600000101024782820002820505030304f505f6",
            expected_preimage: "a301010247828200028205050303",
        },
        GoldenVector {
            name: "commit marker, two-byte mark",
            kind: 2,
            payload: "",
            causal_mark: 300,
            commitment: true,
            event_id_fill: None,
            expected_entry: "a60000010202400319012c04f505f6",
            expected_preimage: "a3010202400319012c",
        },
        GoldenVector {
            name: "data with event id, four-byte mark",
            kind: 0,
            payload: "6f70",
            causal_mark: 70000,
            commitment: false,
            event_id_fill: Some(0x11),
            expected_entry: concat!(
                "a60000010002426f70031a0001117004f4055820",
                "1111111111111111111111111111111111111111111111111111111111111111"
            ),
            expected_preimage: "a3010002426f70031a00011170",
        },
    ]
}

/// Get all golden accept-range vectors.
pub fn range_vectors() -> Vec<RangeVector> {
    vec![
        RangeVector {
            name: "two ranges, one singleton",
            ranges: &[(0, 2), (5, 5)],
            expected: "82820002820505",
        },
        RangeVector {
            name: "one-byte and two-byte bounds",
            ranges: &[(0, 23), (25, 300)],
            expected: "8282001782181919012c",
        },
        RangeVector {
            name: "empty",
            ranges: &[],
            expected: "80",
        },
    ]
}

/// Build the entry described by a vector.
pub fn entry_from_vector(vector: &GoldenVector) -> anyhow::Result<Entry> {
    let kind = EntryKind::from_u64(vector.kind as u64)
        .ok_or_else(|| anyhow::anyhow!("unknown kind {}", vector.kind))?;
    let payload = hex::decode(vector.payload)?;
    let mut entry =
        Entry::new(kind, payload, vector.causal_mark).with_commitment(vector.commitment);
    entry.event_id = vector.event_id_fill.map(|b| EventId::from_bytes([b; 32]));
    Ok(entry)
}

/// Result of checking one vector.
#[derive(Debug, Clone, Serialize)]
pub struct VectorResult {
    pub name: String,
    pub matches: bool,
    pub actual: String,
}

/// Check every entry and range vector against the current encoder.
pub fn verify_all_vectors() -> anyhow::Result<Vec<VectorResult>> {
    let mut results = Vec::new();

    for v in all_vectors() {
        let entry = entry_from_vector(&v)?;
        let bytes = hex::encode(entry.to_bytes());
        let preimage = hex::encode(event_preimage(entry.kind, &entry.payload, entry.causal_mark));
        results.push(VectorResult {
            name: v.name.to_string(),
            matches: bytes == v.expected_entry && preimage == v.expected_preimage,
            actual: bytes,
        });
    }

    for v in range_vectors() {
        let ranges = AcceptRanges::from_pairs(v.ranges.to_vec())?;
        let bytes = hex::encode(ranges.to_bytes());
        results.push(VectorResult {
            name: v.name.to_string(),
            matches: bytes == v.expected,
            actual: bytes,
        });
    }

    Ok(results)
}

/// Event ids of every entry vector under the key derived from two fixed
/// seeds. Keyed hashes have no independent reference here, so this is
/// a report for cross-implementation comparison rather than a check.
pub fn event_id_report() -> anyhow::Result<Vec<(String, String)>> {
    let a = Keypair::from_seed(&[0x01; 32]).feed_key();
    let b = Keypair::from_seed(&[0x02; 32]).feed_key();
    let (initiator, responder) = if a < b { (a, b) } else { (b, a) };
    let key = EventKey::derive(&initiator, &responder);

    all_vectors()
        .iter()
        .map(|v| {
            let entry = entry_from_vector(v)?;
            Ok((v.name.to_string(), entry.compute_event_id(&key).to_hex()))
        })
        .collect()
}

/// Export all vectors as pretty JSON for other implementations.
pub fn export_json() -> anyhow::Result<String> {
    #[derive(Serialize)]
    struct Export {
        entries: Vec<GoldenVector>,
        ranges: Vec<RangeVector>,
    }
    Ok(serde_json::to_string_pretty(&Export {
        entries: all_vectors(),
        ranges: range_vectors(),
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_match() {
        for result in verify_all_vectors().unwrap() {
            assert!(
                result.matches,
                "Vector '{}' encoded to {}",
                result.name, result.actual
            );
        }
    }

    #[test]
    fn test_vectors_decode_back() {
        for vector in all_vectors() {
            let bytes = hex::decode(vector.expected_entry).unwrap();
            let decoded = Entry::from_bytes(&bytes).unwrap();
            assert_eq!(decoded, entry_from_vector(&vector).unwrap(), "{}", vector.name);
        }
    }

    #[test]
    fn test_event_ids_deterministic() {
        let first = event_id_report().unwrap();
        let second = event_id_report().unwrap();
        assert_eq!(first, second);

        // Distinct preimages give distinct ids.
        for i in 0..first.len() {
            for j in (i + 1)..first.len() {
                assert_ne!(first[i].1, first[j].1);
            }
        }
    }

    #[test]
    fn test_event_key_depends_on_pair() {
        let entry = entry_from_vector(&all_vectors()[0]).unwrap();
        let a = Keypair::from_seed(&[0x01; 32]).feed_key();
        let b = Keypair::from_seed(&[0x02; 32]).feed_key();
        let c = Keypair::from_seed(&[0x03; 32]).feed_key();

        let ab = entry.compute_event_id(&EventKey::derive(&a, &b));
        let ba = entry.compute_event_id(&EventKey::derive(&b, &a));
        let ac = entry.compute_event_id(&EventKey::derive(&a, &c));
        assert_ne!(ab, ba);
        assert_ne!(ab, ac);
    }

    #[test]
    fn test_export_json() {
        let json = export_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["entries"].as_array().unwrap().len(), all_vectors().len());
        assert_eq!(value["ranges"][0]["expected"], "82820002820505");
    }
}
