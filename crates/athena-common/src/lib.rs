//! Shared types for the Athena forwarder.
//!
//! - [`name`] — hierarchical names
//! - [`linkset`] — link identifiers and link sets
//! - [`message`] — Interest / ContentObject / InterestReturn / Control
//! - [`error`] — the spec's error taxonomy
//! - [`logging`] — process-wide `tracing` initialization

pub mod error;
pub mod linkset;
pub mod logging;
pub mod message;
pub mod name;

pub use error::{AthenaError, ConfigError};
pub use linkset::{LinkId, LinkSet};
pub use message::{
    Control, ContentObject, ControlOp, Interest, InterestReturn, InterestReturnReason,
    MatchableKey, Message, MessageKind,
};
pub use name::{Name, Segment, SegmentType, SEGMENT_TYPE_NAME};
