//! Error taxonomy (spec.md §7).
//!
//! Configuration errors are surfaced to the caller that attempted the
//! operation (typically `TransportModule::open`). Everything else a link,
//! the adapter, or the forwarding core can fail at is an [`AthenaError`];
//! invariant violations are not representable here at all — per spec.md §7
//! they are programmer errors and abort the process (`unreachable!`/
//! `panic!`), not a `Result` variant.

use thiserror::Error;

/// Fatal, synchronous configuration failures — surfaced to the caller,
/// never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown connection URI key: {0}")]
    UnknownKey(String),
    #[error("duplicate connection URI key: {0}")]
    DuplicateKey(String),
    #[error("duplicate link name: {0}")]
    DuplicateLinkName(String),
    #[error("no transport module registered for scheme: {0}")]
    UnknownScheme(String),
    #[error("malformed connection URI: {0}")]
    MalformedUri(String),
    #[error("unable to open device: {0}")]
    DeviceUnavailable(String),
}

/// The recoverable/reportable error taxonomy a link, the adapter, or the
/// forwarding core can raise during normal operation.
#[derive(Debug, Error)]
pub enum AthenaError {
    /// EAGAIN/EINTR-class errors: retry at next poll, count in per-link
    /// stats, never propagate as a failure to the caller.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// EIO/EPIPE/ENOTCONN-class errors: the link is marked `Error` and the
    /// adapter closes it.
    #[error("permanent I/O error: {0}")]
    PermanentIo(String),

    /// A malformed wire frame. The frame is dropped and counted.
    #[error("decode error: {0}")]
    Decode(String),

    /// A policy violation: hop-limit zero on a non-local link, or a message
    /// larger than MTU with no fragmenter installed.
    #[error("policy violation: {0}")]
    Policy(String),

    /// PIT or content-store allocation failure.
    #[error("resource exhausted: {0}")]
    Resource(String),
}

impl AthenaError {
    pub fn transient(msg: impl Into<String>) -> Self {
        AthenaError::TransientIo(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        AthenaError::PermanentIo(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        AthenaError::Decode(msg.into())
    }

    pub fn policy(msg: impl Into<String>) -> Self {
        AthenaError::Policy(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        AthenaError::Resource(msg.into())
    }

    /// Transient errors are retried by the caller at the next poll and must
    /// never close the link; permanent ones do.
    pub fn is_permanent(&self) -> bool {
        matches!(self, AthenaError::PermanentIo(_))
    }
}
