//! Link trait and per-link event/locality types (spec.md §4.1, §4.7).

use athena_common::{AthenaError, LinkId};
use bytes::Bytes;
use std::fmt;

/// Whether a link terminates in this forwarder's own applications
/// (`Local`) or leads to another forwarder (`Remote`). A hop-limit of zero
/// is only legal inbound on a `Local` link (spec.md §4.1, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    Local,
    Remote,
}

/// Events a link can report out of a non-blocking poll. Kept as discrete
/// flags (rather than a single enum) because a poll can surface more than
/// one condition at once — e.g. a socket can be both readable and in error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkEvents {
    pub receive: bool,
    pub send: bool,
    pub error: bool,
    pub closing: bool,
}

impl LinkEvents {
    pub const NONE: LinkEvents = LinkEvents {
        receive: false,
        send: false,
        error: false,
        closing: false,
    };

    pub fn is_none(self) -> bool {
        self == LinkEvents::NONE
    }
}

/// One endpoint of a transport connection: a raw byte-frame conduit.
/// Framing, fragmentation, and reassembly live above this trait in
/// [`crate::adapter::LinkAdapter`] and [`crate::fragmenter`]; a `Link`
/// only ever moves whole frames (spec.md §4.7's "transport modules treat
/// packets as opaque byte blocks").
pub trait Link: Send {
    /// Stable identity assigned by the adapter at open time.
    fn id(&self) -> LinkId;

    /// Overwrite the identity the adapter assigned. Called once, by
    /// [`crate::adapter::LinkAdapter::register_child`], for links a
    /// listener synthesizes after the fact (spec.md §4.1) — the module
    /// that builds the child doesn't know its final `LinkId` until the
    /// adapter allocates one.
    fn set_id(&mut self, id: LinkId);

    /// Human-readable name from the connection URI (spec.md §6), used in
    /// logs and in `close_by_name`.
    fn name(&self) -> &str;

    /// True for an accept-only endpoint that never itself carries data —
    /// the adapter polls it for newly-seen peers via
    /// [`crate::module::TransportModule::poll_listener`] instead of
    /// treating its `receive` as a data source (spec.md §4.1).
    fn is_listener(&self) -> bool {
        false
    }

    fn locality(&self) -> Locality;

    /// Maximum frame size this link can carry without fragmentation.
    fn mtu(&self) -> usize;

    /// Non-blocking send. `AthenaError::TransientIo` means "try again
    /// later"; the adapter does not retry internally.
    fn send(&mut self, frame: &Bytes) -> Result<(), AthenaError>;

    /// Non-blocking receive of at most one frame.
    fn receive(&mut self) -> Result<Option<Bytes>, AthenaError>;

    /// Poll for readiness without blocking. Implementations backed by a
    /// `crossbeam_channel` receiver thread (spec.md §5's "transport
    /// modules may run their own internal worker threads") report
    /// `receive: true` once a frame is queued.
    fn poll(&mut self) -> LinkEvents;

    fn close(&mut self);
}

impl fmt::Debug for dyn Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("locality", &self.locality())
            .finish()
    }
}
