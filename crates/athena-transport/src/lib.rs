//! Links, transport modules, the hop-by-hop fragmenter, and the link
//! adapter that multiplexes them for the Athena forwarder.
//!
//! - [`wire`] — the hop-by-hop fragment wire format
//! - [`fragmenter`] — begin/end/idle fragmentation and reassembly
//! - [`link`] — the `Link` trait and locality/event types
//! - [`module`] — the `TransportModule` trait and connection URI parsing
//! - [`modules`] — concrete loopback/template/tcp/udp/ethernet modules
//! - [`adapter`] — the dense link table and send/receive multiplexer
//! - [`stats`] — per-link counters

pub mod adapter;
pub mod fragmenter;
pub mod link;
pub mod module;
pub mod modules;
pub mod stats;
pub mod wire;

pub use adapter::{LinkAdapter, Received, RemoveLinkHook};
pub use fragmenter::{Fragmenter, HopFragmenter};
pub use link::{Link, LinkEvents, Locality};
pub use module::{ConnectionUri, TransportModule, COMMON_KEYS};
pub use stats::{LinkStats, LinkStatsTable};
