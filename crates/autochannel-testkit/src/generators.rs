//! Proptest generators for property-based testing.

use proptest::prelude::*;

use autochannel_core::{Entry, EntryKind, EventId, Keypair};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random EventId.
pub fn event_id() -> impl Strategy<Value = EventId> {
    any::<[u8; 32]>().prop_map(EventId::from_bytes)
}

/// Generate an EntryKind.
pub fn entry_kind() -> impl Strategy<Value = EntryKind> {
    prop_oneof![
        Just(EntryKind::Data),
        Just(EntryKind::Accept),
        Just(EntryKind::Commit),
    ]
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate an arbitrary entry. Payloads are opaque, so `Accept` entries
/// here need not carry valid ranges.
pub fn entry() -> impl Strategy<Value = Entry> {
    (
        entry_kind(),
        payload(256),
        any::<u64>(),
        any::<bool>(),
        proptest::option::of(event_id()),
    )
        .prop_map(|(kind, payload, mark, commitment, event_id)| Entry {
            kind,
            payload: payload.into(),
            causal_mark: mark,
            commitment,
            event_id,
        })
}

/// One step of a two-peer schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// The initiator appends an entry marked with its mirror length.
    InitiatorWrites { commitment: bool },
    /// The responder appends an entry marked with its mirror length.
    ResponderWrites { commitment: bool },
    /// Everything the responder has written reaches the initiator's mirror.
    DeliverToInitiator,
    /// Everything the initiator has written reaches the responder's mirror.
    DeliverToResponder,
}

/// Generate a single schedule step. Writes are twice as likely as deliveries.
pub fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => any::<bool>().prop_map(|commitment| Op::InitiatorWrites { commitment }),
        2 => any::<bool>().prop_map(|commitment| Op::ResponderWrites { commitment }),
        1 => Just(Op::DeliverToInitiator),
        1 => Just(Op::DeliverToResponder),
    ]
}

/// Generate an interleaving of writes and deliveries.
pub fn schedule(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op(), 0..=max_len)
}
