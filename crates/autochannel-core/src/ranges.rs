//! Accept ranges: compact encoding of a set of accepted sequence numbers.
//!
//! A set such as `{0, 1, 2, 5, 7, 8}` is carried as `[[0,2],[5,5],[7,8]]`.
//! Ranges are inclusive, sorted, disjoint and maximal (no two ranges touch).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::canonical::{decode_ranges, encode_ranges};
use crate::error::CoreError;

/// A sorted list of maximal, inclusive `(start, end)` intervals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<(u64, u64)>")]
pub struct AcceptRanges(Vec<(u64, u64)>);

impl TryFrom<Vec<(u64, u64)>> for AcceptRanges {
    type Error = CoreError;

    fn try_from(pairs: Vec<(u64, u64)>) -> Result<Self, Self::Error> {
        Self::from_pairs(pairs)
    }
}

impl AcceptRanges {
    /// Build from explicit pairs, checking the ordering invariants.
    pub fn from_pairs(pairs: Vec<(u64, u64)>) -> Result<Self, CoreError> {
        for (i, &(start, end)) in pairs.iter().enumerate() {
            if start > end {
                return Err(CoreError::MalformedRanges(format!(
                    "inverted range [{}, {}]",
                    start, end
                )));
            }
            if i > 0 {
                let prev_end = pairs[i - 1].1;
                // Ranges must leave a gap of at least one, otherwise they
                // should have been merged.
                if start <= prev_end.saturating_add(1) {
                    return Err(CoreError::MalformedRanges(format!(
                        "range [{}, {}] overlaps or touches previous end {}",
                        start, end, prev_end
                    )));
                }
            }
        }
        Ok(Self(pairs))
    }

    /// Number of ranges.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no ranges.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(start, end)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = &(u64, u64)> {
        self.0.iter()
    }

    /// Iterate over every covered sequence number, ascending.
    pub fn seqs(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().flat_map(|&(start, end)| start..=end)
    }

    /// Total count of covered sequence numbers.
    pub fn count(&self) -> u64 {
        self.0
            .iter()
            .map(|&(start, end)| (end - start).saturating_add(1))
            .fold(0u64, u64::saturating_add)
    }

    /// Check membership.
    pub fn contains(&self, seq: u64) -> bool {
        // binary search over the sorted starts
        let idx = self.0.partition_point(|&(start, _)| start <= seq);
        idx > 0 && seq <= self.0[idx - 1].1
    }

    /// Canonical CBOR bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_ranges(self)
    }

    /// Strictly decode canonical CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        decode_ranges(bytes)
    }
}

/// Compress a set of sequence numbers into maximal ranges.
pub fn compress<'a>(seqs: impl IntoIterator<Item = &'a u64>) -> AcceptRanges {
    let mut sorted: Vec<u64> = seqs.into_iter().copied().collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<(u64, u64)> = Vec::new();
    for seq in sorted {
        match ranges.last_mut() {
            Some((_, end)) if end.checked_add(1) == Some(seq) => *end = seq,
            _ => ranges.push((seq, seq)),
        }
    }

    AcceptRanges(ranges)
}

/// Expand ranges back into the covered set.
pub fn expand(ranges: &AcceptRanges) -> BTreeSet<u64> {
    ranges.seqs().collect()
}
