//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding for the
//! handful of shapes Autochannel puts on the wire:
//! - Map keys are small unsigned integers, written in ascending order
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats, no tags
//!
//! Encoding is hand-written so it cannot fail. Decoding goes through
//! `ciborium::Value` and then re-encodes the result: any input whose bytes
//! differ from the canonical re-encoding is rejected, which also rules out
//! trailing garbage, duplicate keys and unknown fields.

use ciborium::value::Value;

use crate::entry::{Entry, EntryKind, ENTRY_VERSION};
use crate::error::CoreError;
use crate::ranges::AcceptRanges;
use crate::types::EventId;

/// Entry field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const VERSION: u64 = 0;
    pub const KIND: u64 = 1;
    pub const PAYLOAD: u64 = 2;
    pub const CAUSAL_MARK: u64 = 3;
    pub const COMMITMENT: u64 = 4;
    pub const EVENT_ID: u64 = 5;
}

const MAJOR_UINT: u8 = 0;
const MAJOR_BYTES: u8 = 2;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;

const SIMPLE_FALSE: u8 = 0xf4;
const SIMPLE_TRUE: u8 = 0xf5;
const SIMPLE_NULL: u8 = 0xf6;

/// Encode an entry to canonical CBOR bytes.
pub fn encode_entry(entry: &Entry) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entry.payload.len() + 48);

    encode_uint(&mut buf, MAJOR_MAP, 6);

    encode_uint(&mut buf, MAJOR_UINT, keys::VERSION);
    encode_uint(&mut buf, MAJOR_UINT, ENTRY_VERSION as u64);

    encode_uint(&mut buf, MAJOR_UINT, keys::KIND);
    encode_uint(&mut buf, MAJOR_UINT, entry.kind.to_u8() as u64);

    encode_uint(&mut buf, MAJOR_UINT, keys::PAYLOAD);
    encode_bytes(&mut buf, &entry.payload);

    encode_uint(&mut buf, MAJOR_UINT, keys::CAUSAL_MARK);
    encode_uint(&mut buf, MAJOR_UINT, entry.causal_mark);

    encode_uint(&mut buf, MAJOR_UINT, keys::COMMITMENT);
    buf.push(if entry.commitment { SIMPLE_TRUE } else { SIMPLE_FALSE });

    encode_uint(&mut buf, MAJOR_UINT, keys::EVENT_ID);
    match &entry.event_id {
        Some(id) => encode_bytes(&mut buf, &id.0),
        None => buf.push(SIMPLE_NULL),
    }

    buf
}

/// The bytes an event id is computed over: `{1: kind, 2: payload, 3: causal_mark}`.
pub fn event_preimage(kind: EntryKind, payload: &[u8], causal_mark: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 24);
    encode_uint(&mut buf, MAJOR_MAP, 3);
    encode_uint(&mut buf, MAJOR_UINT, keys::KIND);
    encode_uint(&mut buf, MAJOR_UINT, kind.to_u8() as u64);
    encode_uint(&mut buf, MAJOR_UINT, keys::PAYLOAD);
    encode_bytes(&mut buf, payload);
    encode_uint(&mut buf, MAJOR_UINT, keys::CAUSAL_MARK);
    encode_uint(&mut buf, MAJOR_UINT, causal_mark);
    buf
}

/// Encode accept ranges as an array of `[start, end]` pairs.
pub fn encode_ranges(ranges: &AcceptRanges) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + ranges.len() * 6);
    encode_uint(&mut buf, MAJOR_ARRAY, ranges.len() as u64);
    for &(start, end) in ranges.iter() {
        encode_uint(&mut buf, MAJOR_ARRAY, 2);
        encode_uint(&mut buf, MAJOR_UINT, start);
        encode_uint(&mut buf, MAJOR_UINT, end);
    }
    buf
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, MAJOR_BYTES, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn parse_value(bytes: &[u8]) -> Result<Value, CoreError> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Integer(i) => {
            let n: i128 = (*i).into();
            u64::try_from(n).ok()
        }
        _ => None,
    }
}

/// Decode an entry from canonical bytes.
pub fn decode_entry(bytes: &[u8]) -> Result<Entry, CoreError> {
    let value = parse_value(bytes)?;
    let map = match &value {
        Value::Map(m) => m,
        _ => return Err(CoreError::MalformedEntry("expected map".into())),
    };

    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| as_u64(k) == Some(key))
            .map(|(_, v)| v)
    };

    let version = get(keys::VERSION)
        .and_then(as_u64)
        .ok_or_else(|| CoreError::MalformedEntry("missing version".into()))?;
    if version != ENTRY_VERSION as u64 {
        return Err(CoreError::UnsupportedVersion(version.min(u8::MAX as u64) as u8));
    }

    let kind_tag = get(keys::KIND)
        .and_then(as_u64)
        .ok_or_else(|| CoreError::MalformedEntry("missing kind".into()))?;
    let kind = EntryKind::from_u64(kind_tag).ok_or(CoreError::UnknownKind(kind_tag))?;

    let payload = match get(keys::PAYLOAD) {
        Some(Value::Bytes(b)) => b.clone(),
        _ => return Err(CoreError::MalformedEntry("invalid payload".into())),
    };

    let causal_mark = get(keys::CAUSAL_MARK)
        .and_then(as_u64)
        .ok_or_else(|| CoreError::MalformedEntry("missing causal mark".into()))?;

    let commitment = match get(keys::COMMITMENT) {
        Some(Value::Bool(b)) => *b,
        _ => return Err(CoreError::MalformedEntry("invalid commitment flag".into())),
    };

    let event_id = match get(keys::EVENT_ID) {
        Some(Value::Bytes(b)) => Some(
            EventId::try_from(b.as_slice())
                .map_err(|_| CoreError::MalformedEntry("invalid event id".into()))?,
        ),
        Some(Value::Null) => None,
        _ => return Err(CoreError::MalformedEntry("invalid event id".into())),
    };

    let entry = Entry {
        kind,
        payload: payload.into(),
        causal_mark,
        commitment,
        event_id,
    };

    if encode_entry(&entry) != bytes {
        return Err(CoreError::NonCanonical);
    }

    Ok(entry)
}

/// Decode accept ranges. Structure is checked here; ordering invariants are
/// checked by [`AcceptRanges::from_pairs`].
pub fn decode_ranges(bytes: &[u8]) -> Result<AcceptRanges, CoreError> {
    let value = parse_value(bytes)?;
    let items = match &value {
        Value::Array(items) => items,
        _ => return Err(CoreError::MalformedRanges("expected array".into())),
    };

    let mut pairs = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Array(pair) if pair.len() == 2 => {
                let start = as_u64(&pair[0])
                    .ok_or_else(|| CoreError::MalformedRanges("invalid range start".into()))?;
                let end = as_u64(&pair[1])
                    .ok_or_else(|| CoreError::MalformedRanges("invalid range end".into()))?;
                pairs.push((start, end));
            }
            _ => return Err(CoreError::MalformedRanges("expected [start, end] pair".into())),
        }
    }

    let ranges = AcceptRanges::from_pairs(pairs)?;
    if encode_ranges(&ranges) != bytes {
        return Err(CoreError::NonCanonical);
    }
    Ok(ranges)
}
