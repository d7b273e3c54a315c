//! The single forwarding-engine thread (spec.md §5, §9): `while running {
//! let msg = adapter.receive(-1); if let Some(msg) = msg { process(msg) } }`,
//! grounded directly on `athena_ForwarderEngine`'s main loop. This is the
//! only mutator of the FIB, PIT, and Content Store in the common case
//! (spec.md §5's single-writer discipline) — the adapter's `remove_link`
//! hook is the one path by which link failures detected deep inside
//! `adapter.send`/`receive` reach those tables, so the FIB and PIT are held
//! behind a lock the engine itself always holds uncontended.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use athena_common::{LinkId, LinkSet, Name};
use athena_transport::{LinkAdapter, Locality, RemoveLinkHook};
use tracing::{debug, warn};

use crate::codec::Codec;
use crate::content_store::ContentStore;
use crate::control::ControlOutcome;
use crate::fib::Fib;
use crate::pipeline::Pipeline;
use crate::pit::Pit;
use crate::stats::CoreStats;

/// Configuration the engine needs beyond the links themselves.
pub struct EngineConfig {
    /// The forwarder's reserved management name prefix (spec.md §6).
    pub management_prefix: Name,
    /// Content Store capacity in megabytes (spec.md §4.5).
    pub content_store_capacity_mb: u64,
    /// How long `adapter.receive` blocks per iteration when nothing has
    /// arrived. The engine only observes shutdown at this cadence (spec.md
    /// §5: "the engine exits after its next `receive` returns (or its
    /// timeout)"), so this bounds shutdown latency.
    pub receive_timeout_ms: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            management_prefix: Name::parse("ccnx:/local/athena"),
            content_store_capacity_mb: 16,
            receive_timeout_ms: 200,
        }
    }
}

struct RemoveLinkCallback {
    fib: Arc<Mutex<Fib>>,
    pit: Arc<Mutex<Pit>>,
}

impl RemoveLinkHook for RemoveLinkCallback {
    /// FIB first, PIT second — matching `athena.c`'s `_removeLink` ordering
    /// (spec.md §4.2).
    fn remove_link(&mut self, links: &LinkSet) {
        self.fib.lock().unwrap().remove_link(links);
        self.pit.lock().unwrap().remove_link(links);
    }
}

/// Owns the adapter and the three forwarding tables, and sequences every
/// received message through a [`Pipeline`]. One instance per forwarder
/// process (spec.md §5).
pub struct Engine {
    adapter: LinkAdapter,
    fib: Arc<Mutex<Fib>>,
    pit: Arc<Mutex<Pit>>,
    content_store: ContentStore,
    stats: CoreStats,
    codec: Box<dyn Codec>,
    management_prefix: Name,
    receive_timeout_ms: i64,
    fairness_cursor: usize,
    pending_quit: bool,
}

impl Engine {
    /// Build an engine around an already-configured adapter (modules
    /// registered, links opened by the caller) and install the `remove_link`
    /// hook that keeps the FIB and PIT consistent with link removal
    /// (spec.md §4.2).
    pub fn new(mut adapter: LinkAdapter, config: EngineConfig, codec: Box<dyn Codec>) -> Self {
        let fib = Arc::new(Mutex::new(Fib::new()));
        let pit = Arc::new(Mutex::new(Pit::new()));
        adapter.set_remove_link_hook(Box::new(RemoveLinkCallback {
            fib: Arc::clone(&fib),
            pit: Arc::clone(&pit),
        }));

        Engine {
            adapter,
            fib,
            pit,
            content_store: ContentStore::new(config.content_store_capacity_mb),
            stats: CoreStats::new(),
            codec,
            management_prefix: config.management_prefix,
            receive_timeout_ms: config.receive_timeout_ms,
            fairness_cursor: 0,
            pending_quit: false,
        }
    }

    /// Install a route directly (used at startup to seed static routes from
    /// configuration, and by tests).
    pub fn add_route(&self, name: &Name, links: &LinkSet) {
        self.fib.lock().unwrap().add_route(name, links);
    }

    pub fn open_link(&mut self, uri: &str) -> Result<LinkId, athena_common::ConfigError> {
        self.adapter.open(uri)
    }

    pub fn adapter_mut(&mut self) -> &mut LinkAdapter {
        &mut self.adapter
    }

    pub fn stats(&self) -> &CoreStats {
        &self.stats
    }

    pub fn link_count(&self) -> usize {
        self.adapter.link_count()
    }

    pub fn route_count(&self) -> usize {
        self.fib.lock().unwrap().route_count()
    }

    pub fn pit_entry_count(&self) -> usize {
        self.pit.lock().unwrap().entry_count()
    }

    /// Run until `running` is cleared. Suspends only inside
    /// `adapter.receive` (spec.md §5).
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) {
            self.tick();
            if std::mem::take(&mut self.pending_quit) {
                running.store(false, Ordering::Relaxed);
            }
        }
    }

    /// One iteration: block up to `receive_timeout_ms` for a message, then
    /// process it if one arrived. Returns `true` if a message was
    /// processed (used by `run`'s quit check and by tests driving the
    /// engine one step at a time).
    pub fn tick(&mut self) -> bool {
        let Some(received) = self
            .adapter
            .receive(self.receive_timeout_ms, &mut self.fairness_cursor)
        else {
            return false;
        };

        let Some(ingress_id) = received.ingress.iter().next() else {
            return false;
        };
        let locality = self
            .adapter
            .locality(ingress_id)
            .unwrap_or(Locality::Remote);

        let message = match self.codec.decode_message(received.frame) {
            Ok(message) => message,
            Err(err) => {
                debug!(link = %ingress_id, error = %err, "decode error, dropping frame");
                self.stats.dropped_decode_error += 1;
                return true;
            }
        };

        let now_ms = now_ms();
        let (sends, control_outcome) = {
            let mut fib = self.fib.lock().unwrap();
            let mut pit = self.pit.lock().unwrap();
            let mut pipeline = Pipeline {
                fib: &mut fib,
                pit: &mut pit,
                content_store: &mut self.content_store,
                stats: &mut self.stats,
                codec: self.codec.as_ref(),
                management_prefix: &self.management_prefix,
            };
            pipeline.process(&message, &received.ingress, locality, now_ms)
        };

        for send in sends {
            let failed = self.adapter.send(&send.frame, &send.targets);
            if !failed.is_empty() {
                if let Some(key) = &send.key {
                    self.pit.lock().unwrap().subtract_expected_return(key, &failed);
                }
                warn!(?failed, "some egress links rejected the send");
            }
        }

        if matches!(control_outcome, Some(ControlOutcome::Quit)) {
            self.pending_quit = true;
        }

        true
    }
}

/// Wall-clock milliseconds since the Unix epoch, used for ContentObject
/// `ExpiryTime` comparisons (spec.md §4.5). Falls back to 0 on a clock
/// before the epoch rather than panicking.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
