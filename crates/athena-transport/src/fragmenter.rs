//! Begin/End/Idle hop-by-hop fragmentation and reassembly (spec.md §4.7).
//!
//! Outbound messages whose wire length plus link header exceeds the link
//! MTU are split into a sequence of [`wire::Fragment`]s. Inbound fragments
//! are reassembled per-peer by a small state machine:
//!
//! | State | Event | Transition |
//! |---|---|---|
//! | Idle | frame with B=1 | buffer payload; → Collecting |
//! | Idle | frame without B | drop; stay Idle |
//! | Collecting | seq == next, B=0, E=0 | append; stay |
//! | Collecting | seq == next, E=1 | append, emit, clear; → Idle |
//! | Collecting | I=1 | discard buffer; → Idle |
//! | Collecting | seq mismatch | discard buffer; → Idle |

use crate::wire::{seqnum_cmp, seqnum_next, Fragment};
use athena_common::AthenaError;
use bytes::{Bytes, BytesMut};
use std::cmp::Ordering;

/// Per-link fragmentation/reassembly behavior. Pluggable per spec.md §4.7
/// and design note §9 ("pluggable interfaces via function tables" maps to
/// a trait object here, with a single well-known implementation in scope).
pub trait Fragmenter: Send {
    /// Split `message` into a sequence of wire-ready fragment frames, none
    /// larger than `mtu`. Returns an error if `message` cannot be split to
    /// fit (e.g. `mtu` too small to carry even one byte of payload).
    fn fragment(&mut self, message: &Bytes, mtu: usize) -> Result<Vec<Bytes>, AthenaError>;

    /// Feed one received frame through reassembly. Returns `Some(message)`
    /// once a complete message has been reassembled, `None` otherwise
    /// (still collecting, or the frame was dropped/reset reassembly).
    fn receive(&mut self, frame: Bytes) -> Option<Bytes>;
}

#[derive(Debug, Default)]
struct ReassemblyState {
    collecting: bool,
    next_expected: u32,
    buffer: BytesMut,
}

impl ReassemblyState {
    fn reset(&mut self) {
        self.collecting = false;
        self.buffer.clear();
    }
}

/// The begin/end/idle (BEFS) hop-by-hop fragmenter: the sole fragmentation
/// scheme this forwarder implements (spec.md §4.7).
pub struct HopFragmenter {
    send_sequence: u32,
    reassembly: ReassemblyState,
}

impl Default for HopFragmenter {
    fn default() -> Self {
        HopFragmenter::new()
    }
}

impl HopFragmenter {
    pub fn new() -> Self {
        HopFragmenter {
            send_sequence: 0,
            reassembly: ReassemblyState::default(),
        }
    }

    /// Start the outbound sequence counter from an arbitrary base (spec.md
    /// §4.7 leaves the starting point unspecified).
    pub fn with_base_sequence(base: u32) -> Self {
        HopFragmenter {
            send_sequence: base,
            reassembly: ReassemblyState::default(),
        }
    }

    /// Send a keep-alive idle frame. Receipt clears any partial reassembly
    /// on the peer (spec.md §4.7).
    pub fn idle_frame(&self) -> Bytes {
        Fragment {
            version: crate::wire::PROTOCOL_VERSION,
            sequence: self.send_sequence,
            begin: false,
            end: false,
            idle: true,
            payload: Bytes::new(),
        }
        .encode()
    }
}

impl Fragmenter for HopFragmenter {
    fn fragment(&mut self, message: &Bytes, mtu: usize) -> Result<Vec<Bytes>, AthenaError> {
        let max_payload = mtu
            .checked_sub(crate::wire::HEADER_LEN)
            .filter(|&n| n > 0)
            .ok_or_else(|| AthenaError::policy(format!("MTU {mtu} too small for a hop fragment")))?;

        if message.is_empty() {
            return Err(AthenaError::policy("cannot fragment an empty message"));
        }

        let chunks: Vec<&[u8]> = message.chunks(max_payload).collect();
        let last = chunks.len() - 1;
        let mut frames = Vec::with_capacity(chunks.len());
        let mut seq = self.send_sequence;

        for (i, chunk) in chunks.iter().enumerate() {
            frames.push(
                Fragment {
                    version: crate::wire::PROTOCOL_VERSION,
                    sequence: seq,
                    begin: i == 0,
                    end: i == last,
                    idle: false,
                    payload: Bytes::copy_from_slice(chunk),
                }
                .encode(),
            );
            seq = seqnum_next(seq);
        }
        self.send_sequence = seq;
        Ok(frames)
    }

    fn receive(&mut self, frame: Bytes) -> Option<Bytes> {
        let fragment = Fragment::decode(frame)?;
        let state = &mut self.reassembly;

        if fragment.idle {
            state.reset();
            return None;
        }

        if !state.collecting {
            if !fragment.begin {
                return None;
            }
            state.collecting = true;
            state.buffer.clear();
            state.buffer.extend_from_slice(&fragment.payload);
            state.next_expected = seqnum_next(fragment.sequence);
            if fragment.end {
                state.collecting = false;
                return Some(state.buffer.split().freeze());
            }
            return None;
        }

        if seqnum_cmp(fragment.sequence, state.next_expected) != Ordering::Equal {
            state.reset();
            return None;
        }

        state.buffer.extend_from_slice(&fragment.payload);
        state.next_expected = seqnum_next(fragment.sequence);

        if fragment.end {
            state.collecting = false;
            return Some(state.buffer.split().freeze());
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::HEADER_LEN;

    #[test]
    fn round_trip_fragmentation() {
        let mut sender = HopFragmenter::new();
        let payload = Bytes::from(vec![0xABu8; 650]);
        let frames = sender.fragment(&payload, 200).unwrap();
        assert_eq!(frames.len(), 4);

        let mut receiver = HopFragmenter::new();
        let mut reassembled = None;
        for frame in frames {
            reassembled = receiver.receive(frame);
        }
        assert_eq!(reassembled, Some(payload));
    }

    #[test]
    fn fragment_lengths_match_scenario_six() {
        // spec.md §8 scenario 6: MTU=200, 650-byte packet -> four fragments,
        // the first three packed to the link's max payload and the last
        // carrying the remainder. With this wire format's 12-byte header
        // (version/type/length/flags+seq/headerLen/tlvType/tlvLength,
        // spec.md §6) that max payload is 188 bytes, not the illustrative
        // 192 spec.md's narrative uses for a rounder example; the shape —
        // four fragments, first three equal-sized, last smaller, B only on
        // the first and E only on the last — is what's actually testable.
        let mut sender = HopFragmenter::new();
        let payload = Bytes::from(vec![0u8; 650]);
        let frames = sender.fragment(&payload, 200).unwrap();
        let fragments: Vec<_> = frames
            .iter()
            .map(|f| Fragment::decode(f.clone()).unwrap())
            .collect();
        let lens: Vec<_> = fragments.iter().map(|f| f.payload.len()).collect();
        assert_eq!(lens, vec![188, 188, 188, 86]);
        assert_eq!(lens.iter().sum::<usize>(), 650);
        assert!(fragments.iter().all(|f| f.payload.len() + HEADER_LEN <= 200));
        assert!(fragments[0].begin && !fragments[0].end);
        assert!(fragments[3].end && !fragments[3].begin);
        assert!(!fragments[1].begin && !fragments[1].end);
    }

    #[test]
    fn idle_frame_clears_partial_reassembly() {
        let mut sender = HopFragmenter::new();
        let payload = Bytes::from(vec![1u8; 500]);
        let frames = sender.fragment(&payload, 200).unwrap();

        let mut receiver = HopFragmenter::new();
        assert!(receiver.receive(frames[0].clone()).is_none());
        assert!(receiver.receive(receiver_idle()).is_none());
        assert!(!receiver.reassembly.collecting);
    }

    fn receiver_idle() -> Bytes {
        HopFragmenter::new().idle_frame()
    }

    #[test]
    fn sequence_mismatch_resets_reassembly() {
        let mut sender = HopFragmenter::new();
        let payload = Bytes::from(vec![2u8; 500]);
        let frames = sender.fragment(&payload, 200).unwrap();

        let mut receiver = HopFragmenter::new();
        assert!(receiver.receive(frames[0].clone()).is_none());
        // skip frames[1], feed frames[2] out of order
        assert!(receiver.receive(frames[2].clone()).is_none());
        assert!(!receiver.reassembly.collecting);
    }

    #[test]
    fn frame_without_begin_in_idle_state_is_dropped() {
        let mut sender = HopFragmenter::new();
        let payload = Bytes::from(vec![3u8; 500]);
        let frames = sender.fragment(&payload, 200).unwrap();

        let mut receiver = HopFragmenter::new();
        assert!(receiver.receive(frames[1].clone()).is_none());
        assert!(!receiver.reassembly.collecting);
    }

    #[test]
    fn oversized_mtu_rejected() {
        let mut sender = HopFragmenter::new();
        let err = sender.fragment(&Bytes::from_static(b"x"), 4).unwrap_err();
        assert!(matches!(err, AthenaError::Policy(_)));
    }
}
