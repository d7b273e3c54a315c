//! Hop-by-hop fragment wire format (spec.md §4.7, §6).
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   version=1   | type=HOPFRAG  |        packetLength           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |B|E|I|x|    sequence number (20 bits)      |  headerLen (=8)   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   tlvType = HOPFRAG_PAYLOAD   |        tlvLength              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         payload bytes …                       |
//! ```
//!
//! A frame whose `packet_type` isn't [`PacketType::HopFrag`] is not a
//! fragment at all and must be passed upward unchanged (spec.md §6).

use bytes::{Buf, BufMut, Bytes};

/// Protocol version this crate emits and expects.
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed header length in bytes (version, type, packetLength, flags+seq,
/// headerLen, tlvType, tlvLength).
pub const HEADER_LEN: usize = 12;

/// The fixed `headerLength` field value this crate always emits.
const HEADER_LENGTH_FIELD: u8 = 8;

/// TLV type for the payload carried by a hop-by-hop fragment.
pub const HOPFRAG_PAYLOAD: u16 = 0x0005;

const BMASK: u8 = 0x40;
const EMASK: u8 = 0x20;
const IMASK: u8 = 0x10;

/// The 20-bit sequence-number space fragments are numbered in.
pub const SEQNUM_BITS: u32 = 20;
const SEQNUM_MASK: u32 = (1 << SEQNUM_BITS) - 1;

/// Packet type byte identifying a hop-by-hop fragment frame. Any other
/// value means "not a fragment — pass through unchanged" (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketType(pub u8);

impl PacketType {
    /// The legacy HOPFRAG type value carried over from the Metis/Athena
    /// hop-by-hop fragmentation scheme.
    pub const HOP_FRAG: PacketType = PacketType(4);

    pub fn is_hop_frag(self) -> bool {
        self == PacketType::HOP_FRAG
    }
}

/// A decoded hop-by-hop fragment header plus its payload slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub version: u8,
    pub sequence: u32,
    pub begin: bool,
    pub end: bool,
    pub idle: bool,
    pub payload: Bytes,
}

impl Fragment {
    /// Encode this fragment as a complete wire frame.
    pub fn encode(&self) -> Bytes {
        assert!(self.sequence <= SEQNUM_MASK, "sequence number exceeds 20 bits");
        let packet_len = HEADER_LEN + self.payload.len();
        let mut buf = Vec::with_capacity(packet_len);

        buf.put_u8(self.version);
        buf.put_u8(PacketType::HOP_FRAG.0);
        buf.put_u16(packet_len as u16);

        let mut flags_seq = (self.sequence >> 16) as u8 & 0x0F;
        if self.begin {
            flags_seq |= BMASK;
        }
        if self.end {
            flags_seq |= EMASK;
        }
        if self.idle {
            flags_seq |= IMASK;
        }
        buf.put_u8(flags_seq);
        buf.put_u8((self.sequence >> 8) as u8);
        buf.put_u8(self.sequence as u8);
        buf.put_u8(HEADER_LENGTH_FIELD);

        buf.put_u16(HOPFRAG_PAYLOAD);
        buf.put_u16(self.payload.len() as u16);
        buf.extend_from_slice(&self.payload);

        Bytes::from(buf)
    }

    /// Decode a fragment frame. Returns `None` if the buffer is too short,
    /// the type byte isn't HOPFRAG, or the TLV fields are inconsistent
    /// (treated as a decode error — spec.md §7 — the caller drops and
    /// counts the frame).
    pub fn decode(mut buf: Bytes) -> Option<Fragment> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let version = buf.get_u8();
        let packet_type = PacketType(buf.get_u8());
        if !packet_type.is_hop_frag() {
            return None;
        }
        let packet_length = buf.get_u16() as usize;

        let flags_seq = buf.get_u8();
        let begin = flags_seq & BMASK != 0;
        let end = flags_seq & EMASK != 0;
        let idle = flags_seq & IMASK != 0;
        let seq_hi = (flags_seq & 0x0F) as u32;
        let seq_mid = buf.get_u8() as u32;
        let seq_lo = buf.get_u8() as u32;
        let sequence = (seq_hi << 16) | (seq_mid << 8) | seq_lo;

        let _header_length = buf.get_u8();
        let tlv_type = buf.get_u16();
        let tlv_length = buf.get_u16() as usize;
        if tlv_type != HOPFRAG_PAYLOAD {
            return None;
        }
        if tlv_length != packet_length.saturating_sub(HEADER_LEN) {
            return None;
        }
        if buf.remaining() < tlv_length {
            return None;
        }

        let payload = buf.copy_to_bytes(tlv_length);
        Some(Fragment {
            version,
            sequence,
            begin,
            end,
            idle,
            payload,
        })
    }
}

/// Compare two 20-bit sequence numbers per the RFC 1982-style
/// shift-into-high-bits-and-subtract-as-signed trick (spec.md §4.7, §9):
/// right-pad the 20-bit value into the top bits of a `u32` so ordinary
/// two's-complement wraparound gives the same answer as the multi-branch
/// RFC 1982 serial comparison, without the branches.
///
/// Returns `Ordering::Less` if `a` precedes `b`, `Greater` if it follows,
/// `Equal` if they're the same. Pairs exactly `2^19` apart are ambiguous
/// under RFC 1982 and any answer is acceptable.
pub fn seqnum_cmp(a: u32, b: u32) -> std::cmp::Ordering {
    const SHIFT: u32 = 32 - SEQNUM_BITS;
    let shifted_a = (a & SEQNUM_MASK) << SHIFT;
    let shifted_b = (b & SEQNUM_MASK) << SHIFT;
    let diff = shifted_a.wrapping_sub(shifted_b) as i32;
    diff.cmp(&0)
}

/// `seq + 1`, wrapping modulo `2^20` (spec.md §4.7).
pub fn seqnum_next(seq: u32) -> u32 {
    (seq.wrapping_add(1)) & SEQNUM_MASK
}

/// Check the packet-type byte without fully decoding the frame, so the
/// adapter can tell a fragment from an ordinary message before deciding
/// whether to hand it to a [`crate::fragmenter::Fragmenter`] (spec.md §6:
/// "a received frame with type != HOPFRAG is not a fragment and is passed
/// through unchanged").
pub fn peek_is_hop_frag(frame: &[u8]) -> bool {
    frame.len() >= 2 && PacketType(frame[1]).is_hop_frag()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(seq: u32, begin: bool, end: bool, idle: bool, payload: &[u8]) -> Fragment {
        Fragment {
            version: PROTOCOL_VERSION,
            sequence: seq,
            begin,
            end,
            idle,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn round_trip_encode_decode() {
        let f = frag(42, true, false, false, b"hello world");
        let encoded = f.encode();
        let decoded = Fragment::decode(encoded).expect("decodes");
        assert_eq!(decoded, f);
    }

    #[test]
    fn non_hopfrag_type_is_not_decoded() {
        let mut buf = vec![PROTOCOL_VERSION, 0x99, 0, 12, 0, 0, 0, 8, 0, 5, 0, 0];
        buf.resize(HEADER_LEN, 0);
        assert!(Fragment::decode(Bytes::from(buf)).is_none());
    }

    #[test]
    fn sequence_number_wraps_within_20_bits() {
        let max = (1u32 << SEQNUM_BITS) - 1;
        let f = frag(max, false, true, false, b"x");
        let decoded = Fragment::decode(f.encode()).unwrap();
        assert_eq!(decoded.sequence, max);
    }

    #[test]
    fn seqnum_cmp_handles_wraparound() {
        use std::cmp::Ordering;
        let max = (1u32 << SEQNUM_BITS) - 1;
        assert_eq!(seqnum_cmp(5, 3), Ordering::Greater);
        assert_eq!(seqnum_cmp(3, 5), Ordering::Less);
        assert_eq!(seqnum_cmp(3, 3), Ordering::Equal);
        // wraps: max -> 0 is still "next"
        assert_eq!(seqnum_cmp(seqnum_next(max), max), Ordering::Greater);
        assert_eq!(seqnum_next(max), 0);
    }

    #[test]
    fn idle_flag_decodes() {
        let f = frag(7, false, false, true, &[]);
        let decoded = Fragment::decode(f.encode()).unwrap();
        assert!(decoded.idle);
        assert!(decoded.payload.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn decode_never_panics_on_arbitrary_bytes(data: Vec<u8>) {
            let _ = Fragment::decode(Bytes::from(data));
        }

        #[test]
        fn round_trip_for_arbitrary_sequence_and_payload(seq in 0u32..(1 << SEQNUM_BITS), payload in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256)) {
            let f = frag(seq, true, true, false, &payload);
            let decoded = Fragment::decode(f.encode()).unwrap();
            proptest::prop_assert_eq!(decoded, f);
        }
    }
}
