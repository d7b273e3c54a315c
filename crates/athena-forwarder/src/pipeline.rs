//! The forwarding pipeline: classifies every inbound message and drives it
//! through hop-limit enforcement, content-store lookup, PIT aggregation,
//! FIB lookup, reverse-path delivery, and interest-return generation
//! (spec.md §4.6).

use std::sync::Arc;

use athena_common::{
    Control, ControlOp, ContentObject, Interest, InterestReturn, InterestReturnReason, LinkSet,
    MatchableKey, Message, MessageKind, Name,
};
use athena_transport::Locality;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::codec::Codec;
use crate::content_store::ContentStore;
use crate::control::{self, ControlOutcome};
use crate::fib::Fib;
use crate::pit::{AddOutcome, Pit};
use crate::stats::CoreStats;

/// One outbound send the engine must carry out against the adapter.
///
/// `key` is `Some` only for a freshly forwarded Interest: once the adapter
/// reports which links failed, the engine must feed that back into
/// [`Pit::subtract_expected_return`] for this key (spec.md §4.6 step 8).
pub struct SendAction {
    pub frame: Bytes,
    pub targets: LinkSet,
    pub key: Option<MatchableKey>,
}

impl SendAction {
    fn plain(frame: Bytes, targets: LinkSet) -> Self {
        SendAction { frame, targets, key: None }
    }
}

/// Mutable state the pipeline sequences on every call (spec.md §4.6). Held
/// together so `process` doesn't need half a dozen positional arguments.
pub struct Pipeline<'a> {
    pub fib: &'a mut Fib,
    pub pit: &'a mut Pit,
    pub content_store: &'a mut ContentStore,
    pub stats: &'a mut CoreStats,
    pub codec: &'a dyn Codec,
    pub management_prefix: &'a Name,
}

impl<'a> Pipeline<'a> {
    /// Process one received message with a single-bit ingress set
    /// (spec.md §4.6's precondition), returning the sends the engine must
    /// carry out through the adapter. `now_ms` is wall-clock time for
    /// Content Store expiry.
    pub fn process(
        &mut self,
        message: &Arc<Message>,
        ingress: &LinkSet,
        ingress_locality: Locality,
        now_ms: u64,
    ) -> (Vec<SendAction>, Option<ControlOutcome>) {
        match message.kind() {
            MessageKind::Interest(interest) => {
                let mut sends = Vec::new();
                let outcome = self.process_interest(interest, ingress, ingress_locality, now_ms, &mut sends);
                (sends, outcome)
            }
            MessageKind::ContentObject(content_object) => {
                let mut sends = Vec::new();
                self.process_content_object(message, content_object, ingress, &mut sends);
                (sends, None)
            }
            MessageKind::InterestReturn(interest_return) => {
                self.process_interest_return(interest_return);
                (Vec::new(), None)
            }
            MessageKind::Control(control) => {
                // Genuine control requests arrive as Interests carrying a
                // payload (spec.md §6, handled in step 4 of
                // `process_interest`) so they pick up a PIT entry and
                // aggregate like any other interest. A bare Control frame
                // reaching here directly is not that path — only this
                // forwarder's own ACKs are ever encoded this way, and
                // those are outbound, never fed back through `process`.
                warn!(name = %control.name, "received a bare Control frame on ingress, ignoring");
                (Vec::new(), None)
            }
        }
    }

    fn process_interest(
        &mut self,
        interest: &Interest,
        ingress: &LinkSet,
        ingress_locality: Locality,
        now_ms: u64,
        sends: &mut Vec<SendAction>,
    ) -> Option<ControlOutcome> {
        self.stats.interests_processed += 1;

        // Step 1: hop-limit enforcement only applies on non-local links.
        let mut interest = interest.clone();
        if ingress_locality == Locality::Remote {
            if interest.hop_limit == 0 {
                debug!(name = %interest.name, "hop limit exhausted, dropping");
                self.stats.dropped_hop_limit += 1;
                return None;
            }
            interest.hop_limit -= 1;
        }

        // Step 2: Content Store short-circuits FIB/PIT entirely on a hit.
        if let Some(hit) = self.content_store.get_match(&interest, now_ms) {
            self.stats.content_store_hits += 1;
            sends.push(SendAction::plain(hit.wire().clone(), ingress.clone()));
            return None;
        }
        self.stats.content_store_misses += 1;

        // Step 3: PIT aggregation.
        let key = interest.matchable_key();
        match self.pit.add_interest(&key, ingress) {
            AddOutcome::Aggregated => {
                self.stats.pit_aggregated += 1;
                return None;
            }
            AddOutcome::Forward => {}
        }

        // Step 4: management-prefix diversion. A control request is an
        // ordinary Interest carrying its structured operation as payload
        // data (spec.md §6); the PIT entry it picked up in step 3 above is
        // this forwarder's own responsibility to clear once it answers
        // (spec.md §4.6/§6), which `process_control` does as part of
        // sending its ACK.
        if control::is_management_name(self.management_prefix, &interest.name) {
            let op = match &interest.payload {
                Some(payload) => self.codec.decode_control_op(payload),
                None => ControlOp::Unknown { operation: "no-payload".to_string() },
            };
            let control = Control { name: interest.name.clone(), op };
            let outcome = self.process_control(&control, &key, ingress, sends);
            return Some(outcome);
        }

        // Step 5: FIB lookup.
        let Some(fib_result) = self.fib.lookup(&interest.name) else {
            self.emit_interest_return(&interest, ingress, InterestReturnReason::NoRoute, sends);
            self.pit.remove_interest(&key, ingress);
            return None;
        };

        // Step 6: strip ingress links from the egress set.
        let egress = fib_result.difference(ingress);
        if egress.is_empty() {
            self.emit_interest_return(&interest, ingress, InterestReturnReason::NoRoute, sends);
            // Leave the PIT entry to expire; it still has the ingress
            // recorded (spec.md §4.6 step 6).
            return None;
        }

        // Step 7: record the expected-return set.
        self.pit.set_expected_return(&key, &egress);

        // Step 8: forward, re-encoding to reflect the decremented hop limit.
        self.stats.pit_forwarded += 1;
        let wire = self.codec.encode(&MessageKind::Interest(interest));
        sends.push(SendAction { frame: wire, targets: egress, key: Some(key) });
        None
    }

    fn emit_interest_return(
        &mut self,
        interest: &Interest,
        ingress: &LinkSet,
        reason: InterestReturnReason,
        sends: &mut Vec<SendAction>,
    ) {
        self.stats.record_interest_return_reason(reason);
        let kind = MessageKind::InterestReturn(InterestReturn::new(interest.clone(), reason));
        let wire = self.codec.encode(&kind);
        sends.push(SendAction::plain(wire, ingress.clone()));
    }

    fn process_content_object(
        &mut self,
        message: &Arc<Message>,
        content_object: &ContentObject,
        ingress: &LinkSet,
        sends: &mut Vec<SendAction>,
    ) {
        self.stats.content_objects_processed += 1;

        let Some(matched_egress) = self.pit.match_content_object(content_object, ingress) else {
            self.stats.dropped_unsolicited_content_object += 1;
            debug!(name = %content_object.name, "unsolicited content object, dropping");
            return;
        };
        if matched_egress.is_empty() {
            self.stats.dropped_unsolicited_content_object += 1;
            return;
        }

        if self.content_store.put(Arc::clone(message)).is_err() {
            warn!(name = %content_object.name, "content object too large for store, not cached");
        }

        sends.push(SendAction::plain(message.wire().clone(), matched_egress));
    }

    fn process_interest_return(&mut self, interest_return: &InterestReturn) {
        self.stats.interest_returns_received += 1;
        self.stats.record_interest_return_reason(interest_return.reason);
        // The PIT entry is left to expire naturally (spec.md §4.6).
    }

    /// Apply a decoded control operation and send its ACK. `key` is the PIT
    /// entry this request's own Interest picked up in step 3; clearing it
    /// here, once an answer is ready, is this forwarder's responsibility
    /// (spec.md §4.6/§6) — it's what makes a duplicate control interest
    /// from the same link aggregate instead of being double-processed.
    fn process_control(
        &mut self,
        control: &Control,
        key: &MatchableKey,
        ingress: &LinkSet,
        sends: &mut Vec<SendAction>,
    ) -> ControlOutcome {
        self.stats.control_processed += 1;
        let outcome = control::handle_control(self.fib, control, ingress);
        self.pit.remove_interest(key, ingress);
        let ack = Control {
            name: control.name.clone(),
            op: ControlOp::Unknown { operation: "ack".to_string() },
        };
        let wire = self.codec.encode(&MessageKind::Control(ack));
        sends.push(SendAction::plain(wire, ingress.clone()));
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SimpleCodec;
    use athena_common::{ContentObjectHash, LinkId};

    fn harness() -> (Fib, Pit, ContentStore, CoreStats, SimpleCodec, Name) {
        (
            Fib::new(),
            Pit::new(),
            ContentStore::new(1),
            CoreStats::new(),
            SimpleCodec::new(),
            Name::parse("ccnx:/local/athena"),
        )
    }

    fn interest_message(path: &str, hop_limit: u8, codec: &SimpleCodec) -> Arc<Message> {
        let mut interest = Interest::new(Name::parse(path));
        interest.hop_limit = hop_limit;
        codec.encode_message(MessageKind::Interest(interest))
    }

    fn control_interest_message(path: &str, op: ControlOp, codec: &SimpleCodec) -> Arc<Message> {
        let mut interest = Interest::new(Name::parse(path));
        interest.payload = Some(codec.encode_control_op(&op));
        codec.encode_message(MessageKind::Interest(interest))
    }

    fn content_object_message(path: &str, payload: &[u8], codec: &SimpleCodec) -> Arc<Message> {
        let content_object = ContentObject {
            name: Name::parse(path),
            key_id: None,
            content_object_hash: ContentObjectHash::from_static(b"hash"),
            expiry_time_ms: None,
            payload: Bytes::copy_from_slice(payload),
        };
        codec.encode_message(MessageKind::ContentObject(content_object))
    }

    #[test]
    fn content_store_hit_short_circuits_fib_and_pit() {
        let (mut fib, mut pit, mut store, mut stats, codec, prefix) = harness();
        let l0 = LinkSet::single(LinkId::new(0));
        store.put(content_object_message("ccnx:/a/b", b"hello", &codec)).unwrap();

        let mut pipeline = Pipeline {
            fib: &mut fib,
            pit: &mut pit,
            content_store: &mut store,
            stats: &mut stats,
            codec: &codec,
            management_prefix: &prefix,
        };
        let message = interest_message("ccnx:/a/b", 5, &codec);
        let (sends, _) = pipeline.process(&message, &l0, Locality::Local, 0);

        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].targets, l0);
        assert_eq!(pit.entry_count(), 0);
        assert_eq!(stats.content_store_hits, 1);
    }

    #[test]
    fn no_route_emits_interest_return_and_clears_pit() {
        let (mut fib, mut pit, mut store, mut stats, codec, prefix) = harness();
        let l0 = LinkSet::single(LinkId::new(0));

        let mut pipeline = Pipeline {
            fib: &mut fib,
            pit: &mut pit,
            content_store: &mut store,
            stats: &mut stats,
            codec: &codec,
            management_prefix: &prefix,
        };
        let message = interest_message("ccnx:/x", 5, &codec);
        let (sends, _) = pipeline.process(&message, &l0, Locality::Remote, 0);

        assert_eq!(sends.len(), 1);
        let decoded = codec.decode(&sends[0].frame).unwrap();
        assert!(matches!(decoded, MessageKind::InterestReturn(r) if r.reason == InterestReturnReason::NoRoute));
        assert_eq!(pit.entry_count(), 0);
        assert_eq!(stats.dropped_no_route, 1);
    }

    #[test]
    fn forwarded_interest_decrements_hop_limit_and_populates_expected_return() {
        let (mut fib, mut pit, mut store, mut stats, codec, prefix) = harness();
        let l0 = LinkSet::single(LinkId::new(0));
        let l1 = LinkSet::single(LinkId::new(1));
        fib.add_route(&Name::parse("ccnx:/a"), &l1);

        let mut pipeline = Pipeline {
            fib: &mut fib,
            pit: &mut pit,
            content_store: &mut store,
            stats: &mut stats,
            codec: &codec,
            management_prefix: &prefix,
        };
        let message = interest_message("ccnx:/a/b", 5, &codec);
        let (sends, _) = pipeline.process(&message, &l0, Locality::Remote, 0);

        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].targets, l1);
        let decoded = codec.decode(&sends[0].frame).unwrap();
        match decoded {
            MessageKind::Interest(i) => assert_eq!(i.hop_limit, 4),
            _ => panic!("expected interest"),
        }
        assert_eq!(pit.entry_count(), 1);
    }

    #[test]
    fn hop_limit_zero_on_remote_link_is_dropped() {
        let (mut fib, mut pit, mut store, mut stats, codec, prefix) = harness();
        let l0 = LinkSet::single(LinkId::new(0));

        let mut pipeline = Pipeline {
            fib: &mut fib,
            pit: &mut pit,
            content_store: &mut store,
            stats: &mut stats,
            codec: &codec,
            management_prefix: &prefix,
        };
        let message = interest_message("ccnx:/a", 0, &codec);
        let (sends, _) = pipeline.process(&message, &l0, Locality::Remote, 0);

        assert!(sends.is_empty());
        assert_eq!(stats.dropped_hop_limit, 1);
        assert_eq!(pit.entry_count(), 0);
    }

    #[test]
    fn hop_limit_zero_on_local_link_passes_unchanged() {
        let (mut fib, mut pit, mut store, mut stats, codec, prefix) = harness();
        let l0 = LinkSet::single(LinkId::new(0));

        let mut pipeline = Pipeline {
            fib: &mut fib,
            pit: &mut pit,
            content_store: &mut store,
            stats: &mut stats,
            codec: &codec,
            management_prefix: &prefix,
        };
        let message = interest_message("ccnx:/x", 0, &codec);
        let (sends, _) = pipeline.process(&message, &l0, Locality::Local, 0);

        // No route installed, but it should have been accepted (not
        // dropped for hop-limit) and gone on to emit a NoRoute return.
        assert_eq!(sends.len(), 1);
        assert_eq!(stats.dropped_hop_limit, 0);
        assert_eq!(stats.dropped_no_route, 1);
    }

    #[test]
    fn content_object_forwards_to_matched_egress_and_caches() {
        let (mut fib, mut pit, mut store, mut stats, codec, prefix) = harness();
        let l0 = LinkSet::single(LinkId::new(0));
        let l1 = LinkSet::single(LinkId::new(1));
        let key = MatchableKey { name: Name::parse("ccnx:/a/b"), key_id: None, content_object_hash: None };
        pit.add_interest(&key, &l0);
        pit.set_expected_return(&key, &l1);

        let mut pipeline = Pipeline {
            fib: &mut fib,
            pit: &mut pit,
            content_store: &mut store,
            stats: &mut stats,
            codec: &codec,
            management_prefix: &prefix,
        };
        let message = content_object_message("ccnx:/a/b", b"hello", &codec);
        let (sends, _) = pipeline.process(&message, &l1, Locality::Remote, 0);

        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].targets, l0);
        assert_eq!(store.entry_count(), 1);
    }

    #[test]
    fn unsolicited_content_object_is_dropped_and_not_cached() {
        let (mut fib, mut pit, mut store, mut stats, codec, prefix) = harness();
        let l0 = LinkSet::single(LinkId::new(0));

        let mut pipeline = Pipeline {
            fib: &mut fib,
            pit: &mut pit,
            content_store: &mut store,
            stats: &mut stats,
            codec: &codec,
            management_prefix: &prefix,
        };
        let message = content_object_message("ccnx:/nobody-asked", b"x", &codec);
        let (sends, _) = pipeline.process(&message, &l0, Locality::Remote, 0);

        assert!(sends.is_empty());
        assert_eq!(store.entry_count(), 0);
        assert_eq!(stats.dropped_unsolicited_content_object, 1);
    }

    #[test]
    fn control_interest_installs_route_acks_and_clears_its_pit_entry() {
        let (mut fib, mut pit, mut store, mut stats, codec, prefix) = harness();
        let l0 = LinkSet::single(LinkId::new(0));

        let mut pipeline = Pipeline {
            fib: &mut fib,
            pit: &mut pit,
            content_store: &mut store,
            stats: &mut stats,
            codec: &codec,
            management_prefix: &prefix,
        };
        let op = ControlOp::AddRoute { name: Name::parse("ccnx:/dest") };
        let message = control_interest_message("ccnx:/local/athena/route", op, &codec);
        let (sends, outcome) = pipeline.process(&message, &l0, Locality::Local, 0);

        assert_eq!(sends.len(), 1);
        let decoded = codec.decode(&sends[0].frame).unwrap();
        assert!(matches!(decoded, MessageKind::Control(c) if matches!(c.op, ControlOp::Unknown { .. })));
        assert_eq!(outcome, Some(ControlOutcome::Continue));
        assert!(fib.lookup(&Name::parse("ccnx:/dest")).unwrap().contains(LinkId::new(0)));
        assert_eq!(pit.entry_count(), 0);
    }

    #[test]
    fn duplicate_control_interest_from_another_link_aggregates_instead_of_double_processing() {
        let (mut fib, mut pit, mut store, mut stats, codec, prefix) = harness();
        let l0 = LinkSet::single(LinkId::new(0));
        let l1 = LinkSet::single(LinkId::new(1));

        let op = ControlOp::AddRoute { name: Name::parse("ccnx:/dest") };
        let mut interest = Interest::new(Name::parse("ccnx:/local/athena/route"));
        interest.payload = Some(codec.encode_control_op(&op));
        let key = interest.matchable_key();

        // An identical control request from l1 is already outstanding.
        pit.add_interest(&key, &l1);

        let mut pipeline = Pipeline {
            fib: &mut fib,
            pit: &mut pit,
            content_store: &mut store,
            stats: &mut stats,
            codec: &codec,
            management_prefix: &prefix,
        };
        let message = codec.encode_message(MessageKind::Interest(interest));
        let (sends, outcome) = pipeline.process(&message, &l0, Locality::Local, 0);

        assert!(sends.is_empty());
        assert!(outcome.is_none());
        assert_eq!(stats.pit_aggregated, 1);
        assert_eq!(fib.route_count(), 0);
    }

    #[test]
    fn interest_return_is_dropped_and_recorded() {
        let (mut fib, mut pit, mut store, mut stats, codec, prefix) = harness();
        let l0 = LinkSet::single(LinkId::new(0));

        let mut pipeline = Pipeline {
            fib: &mut fib,
            pit: &mut pit,
            content_store: &mut store,
            stats: &mut stats,
            codec: &codec,
            management_prefix: &prefix,
        };
        let interest = Interest::new(Name::parse("ccnx:/a"));
        let message = codec.encode_message(MessageKind::InterestReturn(InterestReturn::new(
            interest,
            InterestReturnReason::Congestion,
        )));
        let (sends, outcome) = pipeline.process(&message, &l0, Locality::Remote, 0);

        assert!(sends.is_empty());
        assert!(outcome.is_none());
        assert_eq!(stats.interest_returns_received, 1);
    }
}
