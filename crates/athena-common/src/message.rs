//! The message family: `Interest`, `ContentObject`, `InterestReturn`, and
//! `Control`, plus the tagged [`Message`] union that carries any of them
//! together with the immutable wire-format buffer they were decoded from
//! (spec.md §3).
//!
//! Decoding the wire buffer into a typed view is treated as the job of an
//! external codec (spec.md §1, §6) — this crate only defines the typed
//! shapes that codec is assumed to produce, and the shared-ownership
//! container the rest of the forwarder passes them around in.

use crate::name::Name;
use bytes::Bytes;
use std::sync::Arc;

/// An opaque key-id restriction on an Interest or ContentObject.
pub type KeyId = Bytes;

/// An opaque content-object-hash restriction on an Interest, or the hash
/// carried by a ContentObject.
pub type ContentObjectHash = Bytes;

/// A request message naming desired content.
#[derive(Debug, Clone)]
pub struct Interest {
    pub name: Name,
    pub key_id: Option<KeyId>,
    pub content_object_hash: Option<ContentObjectHash>,
    pub hop_limit: u8,
    /// Carrier data. Ordinary interests leave this `None`; a management
    /// interest addressed to the forwarder's own prefix carries its
    /// structured control operation here (spec.md §6: "Control messages
    /// are encoded as Interests carrying a structured payload").
    pub payload: Option<Bytes>,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        Interest {
            name,
            key_id: None,
            content_object_hash: None,
            hop_limit: 255,
            payload: None,
        }
    }

    /// The `(Name, KeyId, Hash)` restriction tuple used for matchable
    /// equality (spec.md §3): two interests are matchable-equal when this
    /// key is equal.
    pub fn matchable_key(&self) -> MatchableKey {
        MatchableKey {
            name: self.name.clone(),
            key_id: self.key_id.clone(),
            content_object_hash: self.content_object_hash.clone(),
        }
    }
}

/// The `(Name, KeyId?, Hash?)` restriction tuple two interests are compared
/// by for PIT aggregation (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchableKey {
    pub name: Name,
    pub key_id: Option<KeyId>,
    pub content_object_hash: Option<ContentObjectHash>,
}

/// A response message carrying named content.
#[derive(Debug, Clone)]
pub struct ContentObject {
    pub name: Name,
    pub key_id: Option<KeyId>,
    pub content_object_hash: ContentObjectHash,
    /// Absolute wall-clock expiry, in milliseconds since the Unix epoch.
    pub expiry_time_ms: Option<u64>,
    pub payload: Bytes,
}

impl ContentObject {
    /// True if a ContentObject with this key would satisfy `interest`'s
    /// restriction (spec.md §4.5's "consistent with" relation): name equal,
    /// keyId matches if the interest constrained it, hash matches if the
    /// interest constrained it.
    pub fn satisfies(&self, interest: &Interest) -> bool {
        if self.name != interest.name {
            return false;
        }
        if let Some(want) = &interest.key_id {
            if self.key_id.as_ref() != Some(want) {
                return false;
            }
        }
        if let Some(want) = &interest.content_object_hash {
            if &self.content_object_hash != want {
                return false;
            }
        }
        true
    }
}

/// The reason an Interest could not be forwarded (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestReturnReason {
    NoRoute,
    HopLimitExceeded,
    Congestion,
    MtuTooLarge,
    Duplicate,
}

/// A negative acknowledgement of an Interest.
#[derive(Debug, Clone)]
pub struct InterestReturn {
    pub interest: Interest,
    pub reason: InterestReturnReason,
}

impl InterestReturn {
    pub fn new(interest: Interest, reason: InterestReturnReason) -> Self {
        InterestReturn { interest, reason }
    }
}

/// A control-plane operation carried by a [`Control`] message.
#[derive(Debug, Clone)]
pub enum ControlOp {
    /// Install a route: `name` → the link set it arrived with, merged with
    /// any prior links for that name (spec.md §4.3).
    AddRoute { name: Name },
    /// Remove a route for a link set.
    RemoveRoute { name: Name },
    /// Request forwarder shutdown (spec.md §6, "process exit").
    Quit,
    /// Anything this forwarder doesn't recognize — logged and ignored
    /// (spec.md §4.6).
    Unknown { operation: String },
}

/// A control message: a management interest carrying a structured payload,
/// or the ACK/response to one (spec.md §6).
#[derive(Debug, Clone)]
pub struct Control {
    pub name: Name,
    pub op: ControlOp,
}

/// Tagged union over the four wire message kinds, plus the raw bytes it was
/// decoded from. Shared via `Arc` so the PIT, the Content Store, and
/// in-flight send queues can each hold a reference without copying the
/// payload (spec.md §3, §5).
#[derive(Debug, Clone)]
pub enum MessageKind {
    Interest(Interest),
    ContentObject(ContentObject),
    InterestReturn(InterestReturn),
    Control(Control),
}

/// A message as it flows through the forwarder: an immutable wire buffer
/// plus its decoded typed view.
#[derive(Debug, Clone)]
pub struct Message {
    wire: Bytes,
    kind: MessageKind,
}

impl Message {
    pub fn new(wire: Bytes, kind: MessageKind) -> Self {
        Message { wire, kind }
    }

    pub fn shared(wire: Bytes, kind: MessageKind) -> Arc<Message> {
        Arc::new(Message::new(wire, kind))
    }

    pub fn wire(&self) -> &Bytes {
        &self.wire
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    pub fn name(&self) -> &Name {
        match &self.kind {
            MessageKind::Interest(i) => &i.name,
            MessageKind::ContentObject(c) => &c.name,
            MessageKind::InterestReturn(r) => &r.interest.name,
            MessageKind::Control(c) => &c.name,
        }
    }

    pub fn as_interest(&self) -> Option<&Interest> {
        match &self.kind {
            MessageKind::Interest(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_content_object(&self) -> Option<&ContentObject> {
        match &self.kind {
            MessageKind::ContentObject(c) => Some(c),
            _ => None,
        }
    }
}
