//! The seam between link-level wire bytes and typed [`MessageKind`]s.
//!
//! spec.md §1 treats the CCNx TLV wire codec as an external collaborator —
//! "we assume a library that parses and emits the wire format" — so this
//! crate never attempts to reproduce that schema. [`Codec`] is the trait
//! the pipeline and engine depend on instead; [`SimpleCodec`] is a small,
//! self-contained stand-in good enough to run the daemon and its tests
//! end-to-end without pulling in a real TLV implementation (see
//! DESIGN.md's Open Questions).

use std::sync::Arc;

use athena_common::{
    AthenaError, Control, ControlOp, ContentObject, Interest, InterestReturn,
    InterestReturnReason, Message, MessageKind, Name, Segment,
};
use bytes::{Buf, BufMut, Bytes};

/// Translates between wire bytes and the typed message union (spec.md §1,
/// §6). Implementations must be deterministic: `decode(encode(k)) == k`.
pub trait Codec: Send + Sync {
    fn decode(&self, wire: &Bytes) -> Result<MessageKind, AthenaError>;
    fn encode(&self, kind: &MessageKind) -> Bytes;

    /// Decode a wire frame into a freshly shared [`Message`].
    fn decode_message(&self, wire: Bytes) -> Result<Arc<Message>, AthenaError> {
        let kind = self.decode(&wire)?;
        Ok(Message::shared(wire, kind))
    }

    /// Encode `kind` and wrap the result as a freshly shared [`Message`].
    fn encode_message(&self, kind: MessageKind) -> Arc<Message> {
        let wire = self.encode(&kind);
        Message::shared(wire, kind)
    }

    /// Encode a control operation as the bytes a management Interest
    /// carries in its `payload` (spec.md §6).
    fn encode_control_op(&self, op: &ControlOp) -> Bytes;

    /// Decode a management Interest's `payload` back into a control
    /// operation. Payload bytes that don't parse as a recognized operation
    /// decode as `ControlOp::Unknown` rather than failing outright, the
    /// same way an unrecognized op tag does on the wire (spec.md §4.6).
    fn decode_control_op(&self, payload: &Bytes) -> ControlOp;
}

const TAG_INTEREST: u8 = 0;
const TAG_CONTENT_OBJECT: u8 = 1;
const TAG_INTEREST_RETURN: u8 = 2;
const TAG_CONTROL: u8 = 3;

const REASON_NO_ROUTE: u8 = 0;
const REASON_HOP_LIMIT_EXCEEDED: u8 = 1;
const REASON_CONGESTION: u8 = 2;
const REASON_MTU_TOO_LARGE: u8 = 3;
const REASON_DUPLICATE: u8 = 4;

const OP_ADD_ROUTE: u8 = 0;
const OP_REMOVE_ROUTE: u8 = 1;
const OP_QUIT: u8 = 2;
const OP_UNKNOWN: u8 = 255;

fn put_name(buf: &mut Vec<u8>, name: &Name) {
    buf.put_u16(name.segment_count() as u16);
    for segment in name.segments() {
        buf.put_u16(segment.segment_type());
        buf.put_u16(segment.value().len() as u16);
        buf.extend_from_slice(segment.value());
    }
}

fn get_name(buf: &mut Bytes) -> Option<Name> {
    let count = buf.get_u16() as usize;
    let mut segments = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.remaining() < 4 {
            return None;
        }
        let segment_type = buf.get_u16();
        let len = buf.get_u16() as usize;
        if buf.remaining() < len {
            return None;
        }
        let value = buf.copy_to_bytes(len);
        segments.push(Segment::new(segment_type, value.to_vec()));
    }
    Some(Name::from_segments(segments))
}

fn put_optional_bytes(buf: &mut Vec<u8>, value: Option<&Bytes>) {
    match value {
        Some(bytes) => {
            buf.put_u16(bytes.len() as u16);
            buf.extend_from_slice(bytes);
        }
        None => buf.put_u16(u16::MAX),
    }
}

fn get_optional_bytes(buf: &mut Bytes) -> Option<Option<Bytes>> {
    if buf.remaining() < 2 {
        return None;
    }
    let len = buf.get_u16();
    if len == u16::MAX {
        return Some(None);
    }
    let len = len as usize;
    if buf.remaining() < len {
        return None;
    }
    Some(Some(buf.copy_to_bytes(len)))
}

fn reason_to_byte(reason: InterestReturnReason) -> u8 {
    match reason {
        InterestReturnReason::NoRoute => REASON_NO_ROUTE,
        InterestReturnReason::HopLimitExceeded => REASON_HOP_LIMIT_EXCEEDED,
        InterestReturnReason::Congestion => REASON_CONGESTION,
        InterestReturnReason::MtuTooLarge => REASON_MTU_TOO_LARGE,
        InterestReturnReason::Duplicate => REASON_DUPLICATE,
    }
}

fn byte_to_reason(byte: u8) -> Option<InterestReturnReason> {
    Some(match byte {
        REASON_NO_ROUTE => InterestReturnReason::NoRoute,
        REASON_HOP_LIMIT_EXCEEDED => InterestReturnReason::HopLimitExceeded,
        REASON_CONGESTION => InterestReturnReason::Congestion,
        REASON_MTU_TOO_LARGE => InterestReturnReason::MtuTooLarge,
        REASON_DUPLICATE => InterestReturnReason::Duplicate,
        _ => return None,
    })
}

fn put_control_op(buf: &mut Vec<u8>, op: &ControlOp) {
    match op {
        ControlOp::AddRoute { name } => {
            buf.put_u8(OP_ADD_ROUTE);
            put_name(buf, name);
        }
        ControlOp::RemoveRoute { name } => {
            buf.put_u8(OP_REMOVE_ROUTE);
            put_name(buf, name);
        }
        ControlOp::Quit => buf.put_u8(OP_QUIT),
        ControlOp::Unknown { operation } => {
            buf.put_u8(OP_UNKNOWN);
            let bytes = operation.as_bytes();
            buf.put_u16(bytes.len() as u16);
            buf.extend_from_slice(bytes);
        }
    }
}

/// Decode a control operation, per the tag layout `put_control_op` writes.
/// A truncated or unrecognized payload decodes as `Unknown` rather than
/// failing, since a management interest with an unparsable payload is
/// still a valid (if useless) control message (spec.md §4.6).
fn get_control_op(buf: &mut Bytes) -> ControlOp {
    let unknown = |reason: &str| ControlOp::Unknown { operation: reason.to_string() };
    if buf.remaining() < 1 {
        return unknown("empty control payload");
    }
    match buf.get_u8() {
        OP_ADD_ROUTE => match get_name(buf) {
            Some(name) => ControlOp::AddRoute { name },
            None => unknown("truncated add-route name"),
        },
        OP_REMOVE_ROUTE => match get_name(buf) {
            Some(name) => ControlOp::RemoveRoute { name },
            None => unknown("truncated remove-route name"),
        },
        OP_QUIT => ControlOp::Quit,
        OP_UNKNOWN => {
            if buf.remaining() < 2 {
                return unknown("truncated unknown op");
            }
            let len = buf.get_u16() as usize;
            if buf.remaining() < len {
                return unknown("truncated unknown op string");
            }
            let bytes = buf.copy_to_bytes(len);
            ControlOp::Unknown { operation: String::from_utf8_lossy(&bytes).into_owned() }
        }
        other => unknown(&format!("unknown control op tag {other}")),
    }
}

/// A compact, internal tag-length-value encoding, used only because the
/// real wire codec is out of scope (spec.md §1) and the engine still needs
/// something to run against. Not an attempt at the CCNx TLV schema.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleCodec;

impl SimpleCodec {
    pub fn new() -> Self {
        SimpleCodec
    }

    fn encode_interest(buf: &mut Vec<u8>, interest: &Interest) {
        put_name(buf, &interest.name);
        put_optional_bytes(buf, interest.key_id.as_ref());
        put_optional_bytes(buf, interest.content_object_hash.as_ref());
        buf.put_u8(interest.hop_limit);
        put_optional_bytes(buf, interest.payload.as_ref());
    }

    fn decode_interest(buf: &mut Bytes) -> Option<Interest> {
        let name = get_name(buf)?;
        let key_id = get_optional_bytes(buf)?;
        let content_object_hash = get_optional_bytes(buf)?;
        if buf.remaining() < 1 {
            return None;
        }
        let hop_limit = buf.get_u8();
        let payload = get_optional_bytes(buf)?;
        Some(Interest {
            name,
            key_id,
            content_object_hash,
            hop_limit,
            payload,
        })
    }
}

impl Codec for SimpleCodec {
    fn encode(&self, kind: &MessageKind) -> Bytes {
        let mut buf = Vec::new();
        match kind {
            MessageKind::Interest(interest) => {
                buf.put_u8(TAG_INTEREST);
                Self::encode_interest(&mut buf, interest);
            }
            MessageKind::ContentObject(content_object) => {
                buf.put_u8(TAG_CONTENT_OBJECT);
                put_name(&mut buf, &content_object.name);
                put_optional_bytes(&mut buf, content_object.key_id.as_ref());
                buf.put_u16(content_object.content_object_hash.len() as u16);
                buf.extend_from_slice(&content_object.content_object_hash);
                match content_object.expiry_time_ms {
                    Some(expiry) => {
                        buf.put_u8(1);
                        buf.put_u64(expiry);
                    }
                    None => buf.put_u8(0),
                }
                buf.put_u32(content_object.payload.len() as u32);
                buf.extend_from_slice(&content_object.payload);
            }
            MessageKind::InterestReturn(interest_return) => {
                buf.put_u8(TAG_INTEREST_RETURN);
                Self::encode_interest(&mut buf, &interest_return.interest);
                buf.put_u8(reason_to_byte(interest_return.reason));
            }
            MessageKind::Control(control) => {
                buf.put_u8(TAG_CONTROL);
                put_name(&mut buf, &control.name);
                put_control_op(&mut buf, &control.op);
            }
        }
        Bytes::from(buf)
    }

    fn decode(&self, wire: &Bytes) -> Result<MessageKind, AthenaError> {
        let mut buf = wire.clone();
        if buf.remaining() < 1 {
            return Err(AthenaError::decode("empty frame"));
        }
        let tag = buf.get_u8();
        match tag {
            TAG_INTEREST => {
                let interest =
                    Self::decode_interest(&mut buf).ok_or_else(|| AthenaError::decode("truncated interest"))?;
                Ok(MessageKind::Interest(interest))
            }
            TAG_CONTENT_OBJECT => {
                let name = get_name(&mut buf).ok_or_else(|| AthenaError::decode("truncated name"))?;
                let key_id = get_optional_bytes(&mut buf)
                    .ok_or_else(|| AthenaError::decode("truncated keyId"))?;
                if buf.remaining() < 2 {
                    return Err(AthenaError::decode("truncated hash length"));
                }
                let hash_len = buf.get_u16() as usize;
                if buf.remaining() < hash_len + 1 {
                    return Err(AthenaError::decode("truncated hash"));
                }
                let content_object_hash = buf.copy_to_bytes(hash_len);
                let has_expiry = buf.get_u8();
                let expiry_time_ms = if has_expiry == 1 {
                    if buf.remaining() < 8 {
                        return Err(AthenaError::decode("truncated expiry"));
                    }
                    Some(buf.get_u64())
                } else {
                    None
                };
                if buf.remaining() < 4 {
                    return Err(AthenaError::decode("truncated payload length"));
                }
                let payload_len = buf.get_u32() as usize;
                if buf.remaining() < payload_len {
                    return Err(AthenaError::decode("truncated payload"));
                }
                let payload = buf.copy_to_bytes(payload_len);
                Ok(MessageKind::ContentObject(ContentObject {
                    name,
                    key_id,
                    content_object_hash,
                    expiry_time_ms,
                    payload,
                }))
            }
            TAG_INTEREST_RETURN => {
                let interest = Self::decode_interest(&mut buf)
                    .ok_or_else(|| AthenaError::decode("truncated interest-return interest"))?;
                if buf.remaining() < 1 {
                    return Err(AthenaError::decode("truncated interest-return reason"));
                }
                let reason = byte_to_reason(buf.get_u8())
                    .ok_or_else(|| AthenaError::decode("unknown interest-return reason"))?;
                Ok(MessageKind::InterestReturn(InterestReturn::new(interest, reason)))
            }
            TAG_CONTROL => {
                let name = get_name(&mut buf).ok_or_else(|| AthenaError::decode("truncated control name"))?;
                let op = get_control_op(&mut buf);
                Ok(MessageKind::Control(Control { name, op }))
            }
            other => Err(AthenaError::decode(format!("unknown message tag {other}"))),
        }
    }

    fn encode_control_op(&self, op: &ControlOp) -> Bytes {
        let mut buf = Vec::new();
        put_control_op(&mut buf, op);
        Bytes::from(buf)
    }

    fn decode_control_op(&self, payload: &Bytes) -> ControlOp {
        let mut buf = payload.clone();
        get_control_op(&mut buf)
    }
}
