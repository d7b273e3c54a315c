//! FIB, PIT, content store, control handler, the forwarding pipeline, and
//! the single-threaded forwarding engine for the Athena forwarder.
//!
//! - [`fib`] — longest-prefix-match routing table
//! - [`pit`] — pending interest aggregation and reverse-path tracking
//! - [`content_store`] — bounded, LRU-evicted ContentObject cache
//! - [`codec`] — the wire-bytes ⇄ typed-message seam (spec.md §1 treats the
//!   real TLV codec as external; [`codec::SimpleCodec`] stands in for it)
//! - [`control`] — management-prefix control message handling
//! - [`pipeline`] — per-message-type forwarding decisions
//! - [`stats`] — per-core counters
//! - [`engine`] — the `while running { receive(); process(); }` loop that
//!   owns the FIB, PIT, Content Store, and drives the pipeline

pub mod codec;
pub mod content_store;
pub mod control;
pub mod engine;
pub mod fib;
pub mod pipeline;
pub mod pit;
pub mod stats;

pub use codec::{Codec, SimpleCodec};
pub use content_store::ContentStore;
pub use control::ControlOutcome;
pub use engine::{Engine, EngineConfig};
pub use fib::Fib;
pub use pipeline::{Pipeline, SendAction};
pub use pit::Pit;
pub use stats::CoreStats;
