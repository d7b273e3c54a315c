//! End-to-end scenario tests (spec.md §8) driving a shared `Fib`/`Pit`/
//! `ContentStore` through multiple `Pipeline::process` calls the way a
//! running forwarder would see them, rather than exercising one pipeline
//! step in isolation the way the `#[cfg(test)]` unit modules do.

use std::sync::Arc;

use athena_common::{ContentObject, ContentObjectHash, Interest, LinkId, LinkSet, Message, MessageKind, Name};
use athena_forwarder::codec::{Codec, SimpleCodec};
use athena_forwarder::content_store::ContentStore;
use athena_forwarder::fib::Fib;
use athena_forwarder::pipeline::Pipeline;
use athena_forwarder::pit::Pit;
use athena_forwarder::stats::CoreStats;
use athena_transport::Locality;
use bytes::Bytes;

struct Forwarder {
    fib: Fib,
    pit: Pit,
    content_store: ContentStore,
    stats: CoreStats,
    codec: SimpleCodec,
    management_prefix: Name,
}

impl Forwarder {
    fn new() -> Self {
        Forwarder {
            fib: Fib::new(),
            pit: Pit::new(),
            content_store: ContentStore::new(1),
            stats: CoreStats::new(),
            codec: SimpleCodec::new(),
            management_prefix: Name::parse("ccnx:/local/athena"),
        }
    }

    fn pipeline(&mut self) -> Pipeline<'_> {
        Pipeline {
            fib: &mut self.fib,
            pit: &mut self.pit,
            content_store: &mut self.content_store,
            stats: &mut self.stats,
            codec: &self.codec,
            management_prefix: &self.management_prefix,
        }
    }
}

fn interest_message(path: &str, codec: &SimpleCodec) -> Arc<Message> {
    codec.encode_message(MessageKind::Interest(Interest::new(Name::parse(path))))
}

fn content_object_message(path: &str, hash: &[u8], payload: &[u8], codec: &SimpleCodec) -> Arc<Message> {
    let content_object = ContentObject {
        name: Name::parse(path),
        key_id: None,
        content_object_hash: ContentObjectHash::copy_from_slice(hash),
        expiry_time_ms: None,
        payload: Bytes::copy_from_slice(payload),
    };
    codec.encode_message(MessageKind::ContentObject(content_object))
}

fn decode(codec: &SimpleCodec, frame: &Bytes) -> MessageKind {
    codec.decode(frame).expect("well-formed frame")
}

// ─── Scenario 1: content-store hit short-circuits FIB/PIT ────────────────

#[test]
fn content_store_hit_answers_without_touching_fib_or_pit() {
    let mut fw = Forwarder::new();
    fw.content_store
        .put(content_object_message("ccnx:/video/1", b"hash", b"frame-data", &fw.codec))
        .unwrap();

    let consumer = LinkSet::single(LinkId::new(0));
    let message = interest_message("ccnx:/video/1", &fw.codec);
    let (sends, outcome) = fw
        .pipeline()
        .process(&message, &consumer, Locality::Local, 0);

    assert!(outcome.is_none());
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].targets, consumer);
    match decode(&fw.codec, &sends[0].frame) {
        MessageKind::ContentObject(c) => assert_eq!(c.payload, Bytes::from_static(b"frame-data")),
        other => panic!("expected a content object, got {other:?}"),
    }
    assert_eq!(fw.pit.entry_count(), 0);
    assert_eq!(fw.fib.route_count(), 0);
    assert_eq!(fw.stats.content_store_hits, 1);
}

// ─── Scenario 2: FIB-driven forward, then the content object satisfies the PIT ──

#[test]
fn fib_forward_then_content_object_return_completes_the_round_trip() {
    let mut fw = Forwarder::new();
    let consumer = LinkSet::single(LinkId::new(0));
    let producer = LinkSet::single(LinkId::new(1));
    fw.fib.add_route(&Name::parse("ccnx:/a/b"), &producer);

    let interest = interest_message("ccnx:/a/b", &fw.codec);
    let (sends, _) = fw
        .pipeline()
        .process(&interest, &consumer, Locality::Remote, 0);
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].targets, producer);
    assert_eq!(fw.pit.entry_count(), 1);

    let answer = content_object_message("ccnx:/a/b", b"h", b"payload", &fw.codec);
    let (sends, outcome) = fw.pipeline().process(&answer, &producer, Locality::Remote, 0);

    assert!(outcome.is_none());
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].targets, consumer);
    assert_eq!(fw.pit.entry_count(), 0, "PIT entry consumed by the matching reply");
    assert_eq!(fw.content_store.entry_count(), 1, "reply is cached on the way through");
}

// ─── Scenario 3: no route produces an InterestReturn and never parks in the PIT ──

#[test]
fn interest_with_no_route_returns_immediately() {
    let mut fw = Forwarder::new();
    let consumer = LinkSet::single(LinkId::new(0));

    let interest = interest_message("ccnx:/nowhere", &fw.codec);
    let (sends, outcome) = fw
        .pipeline()
        .process(&interest, &consumer, Locality::Remote, 0);

    assert!(outcome.is_none());
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].targets, consumer);
    assert!(matches!(
        decode(&fw.codec, &sends[0].frame),
        MessageKind::InterestReturn(r) if r.reason == athena_common::InterestReturnReason::NoRoute
    ));
    assert_eq!(fw.pit.entry_count(), 0);
}

// ─── Scenario 4: three-link interest aggregation, then fan-out to all three ──

#[test]
fn three_consumers_aggregate_then_all_receive_the_fan_out_reply() {
    let mut fw = Forwarder::new();
    let c0 = LinkSet::single(LinkId::new(0));
    let c1 = LinkSet::single(LinkId::new(1));
    let c2 = LinkSet::single(LinkId::new(2));
    let producer = LinkSet::single(LinkId::new(3));
    fw.fib.add_route(&Name::parse("ccnx:/live"), &producer);

    let interest = interest_message("ccnx:/live", &fw.codec);

    let (sends, _) = fw.pipeline().process(&interest, &c0, Locality::Remote, 0);
    assert_eq!(sends.len(), 1, "first consumer's interest is forwarded");
    assert_eq!(sends[0].targets, producer);

    let (sends, _) = fw.pipeline().process(&interest, &c1, Locality::Remote, 0);
    assert!(sends.is_empty(), "second consumer aggregates");

    let (sends, _) = fw.pipeline().process(&interest, &c2, Locality::Remote, 0);
    assert!(sends.is_empty(), "third consumer aggregates");

    assert_eq!(fw.pit.entry_count(), 1);
    assert_eq!(fw.stats.pit_aggregated, 2);

    let answer = content_object_message("ccnx:/live", b"h", b"keyframe", &fw.codec);
    let (sends, _) = fw.pipeline().process(&answer, &producer, Locality::Remote, 0);

    assert_eq!(sends.len(), 1, "one fan-out send carrying the union of all three consumers");
    let fanout = &sends[0].targets;
    assert!(fanout.contains(LinkId::new(0)));
    assert!(fanout.contains(LinkId::new(1)));
    assert!(fanout.contains(LinkId::new(2)));
    assert_eq!(fw.pit.entry_count(), 0);
}

// ─── Scenario 5: link removal clears its PIT entries ──────────────────────

#[test]
fn removing_the_only_ingress_link_clears_its_pending_pit_entry() {
    let mut fw = Forwarder::new();
    let consumer = LinkSet::single(LinkId::new(0));
    let producer = LinkSet::single(LinkId::new(1));
    fw.fib.add_route(&Name::parse("ccnx:/a"), &producer);

    let interest = interest_message("ccnx:/a", &fw.codec);
    fw.pipeline().process(&interest, &consumer, Locality::Remote, 0);
    assert_eq!(fw.pit.entry_count(), 1);

    // The consumer's link goes down: the engine's remove_link hook runs
    // the FIB before the PIT (spec.md §4.2).
    fw.fib.remove_link(&consumer);
    fw.pit.remove_link(&consumer);

    assert_eq!(fw.pit.entry_count(), 0, "the orphaned PIT entry is purged");

    // A reply arriving afterwards now has nowhere to go.
    let answer = content_object_message("ccnx:/a", b"h", b"payload", &fw.codec);
    let (sends, _) = fw.pipeline().process(&answer, &producer, Locality::Remote, 0);
    assert!(sends.is_empty());
    assert_eq!(fw.stats.dropped_unsolicited_content_object, 1);
}

#[test]
fn removing_the_egress_link_also_withdraws_its_route() {
    let mut fw = Forwarder::new();
    let link = LinkSet::single(LinkId::new(2));
    fw.fib.add_route(&Name::parse("ccnx:/a"), &link);
    assert_eq!(fw.fib.route_count(), 1);

    fw.fib.remove_link(&link);

    assert_eq!(fw.fib.route_count(), 0);
    assert!(fw.fib.lookup(&Name::parse("ccnx:/a")).is_none());
}
