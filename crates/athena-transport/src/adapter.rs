//! The link adapter: owns every open link and multiplexes send/receive
//! across them (spec.md §4.2).

use std::time::Duration;

use athena_common::{AthenaError, ConfigError, LinkId, LinkSet};
use bytes::Bytes;
use quanta::Instant;
use tracing::{debug, info, warn};

use crate::fragmenter::Fragmenter;
use crate::link::{Link, Locality};
use crate::module::{ConnectionUri, TransportModule};
use crate::stats::LinkStatsTable;
use crate::wire;

/// Called synchronously by the adapter whenever link(s) are removed, so
/// the forwarding core can purge FIB routes and PIT entries before the
/// `LinkId` is reused (spec.md §4.2: "`remove_link` must synchronously
/// remove the link from the FIB … and from the PIT").
pub trait RemoveLinkHook: Send {
    fn remove_link(&mut self, links: &LinkSet);
}

/// A received frame paired with the single-bit ingress set it arrived on.
pub struct Received {
    pub frame: Bytes,
    pub ingress: LinkSet,
}

/// Owns a dense, `LinkId`-indexed table of open links plus the transport
/// modules that know how to open more of them. Single-writer: the
/// forwarding engine thread is the adapter's only caller (spec.md §5).
pub struct LinkAdapter {
    modules: Vec<Box<dyn TransportModule>>,
    links: Vec<Option<Box<dyn Link>>>,
    names: Vec<Option<String>>,
    /// Index into `modules` that opened the link at this slot, so the
    /// receive loop knows which module to ask for fresh peers when the
    /// link is a listener (spec.md §4.1).
    owner_module: Vec<Option<usize>>,
    fragmenters: Vec<Option<Box<dyn Fragmenter>>>,
    stats: LinkStatsTable,
    remove_link_hook: Option<Box<dyn RemoveLinkHook>>,
    poll_interval: Duration,
}

impl LinkAdapter {
    pub fn new() -> Self {
        LinkAdapter {
            modules: Vec::new(),
            links: Vec::new(),
            names: Vec::new(),
            owner_module: Vec::new(),
            fragmenters: Vec::new(),
            stats: LinkStatsTable::new(),
            remove_link_hook: None,
            poll_interval: Duration::from_micros(200),
        }
    }

    /// Register a transport module. Opening a URI with an unrecognized
    /// scheme fails with [`ConfigError::UnknownScheme`].
    pub fn register_module(&mut self, module: Box<dyn TransportModule>) {
        self.modules.push(module);
    }

    /// Install the callback the forwarding core uses to keep the FIB and
    /// PIT consistent with link removal. Set once at startup.
    pub fn set_remove_link_hook(&mut self, hook: Box<dyn RemoveLinkHook>) {
        self.remove_link_hook = Some(hook);
    }

    /// Install a fragmenter for `id`. Messages that exceed the link's MTU
    /// are only ever fragmented (on send) or reassembled (on receive) for
    /// links with one configured; otherwise an oversized send fails with a
    /// policy error (spec.md §4.7: "when absent, messages exceeding MTU
    /// are rejected with an MTU-too-large error").
    pub fn set_fragmenter(&mut self, id: LinkId, fragmenter: Box<dyn Fragmenter>) {
        if id.index() < self.fragmenters.len() {
            self.fragmenters[id.index()] = Some(fragmenter);
        }
    }

    /// Read-only access to per-link counters for management/diagnostic use
    /// (spec.md §7).
    pub fn stats(&self) -> &LinkStatsTable {
        &self.stats
    }

    fn allocate_id(&mut self) -> LinkId {
        for (index, slot) in self.links.iter().enumerate() {
            if slot.is_none() {
                return LinkId::new(index as u32);
            }
        }
        self.links.push(None);
        self.names.push(None);
        self.owner_module.push(None);
        self.fragmenters.push(None);
        LinkId::new((self.links.len() - 1) as u32)
    }

    /// Dispatch a connection URI to the module whose scheme matches it,
    /// open the link, and register it (spec.md §4.2).
    pub fn open(&mut self, uri_str: &str) -> Result<LinkId, ConfigError> {
        let uri = ConnectionUri::parse(uri_str)?;

        if let Some(name) = uri.name() {
            if self.names.iter().flatten().any(|n| n == name) {
                return Err(ConfigError::DuplicateLinkName(name.to_string()));
            }
        }

        let id = self.allocate_id();
        let module_index = self
            .modules
            .iter()
            .position(|m| m.scheme() == uri.scheme)
            .ok_or_else(|| ConfigError::UnknownScheme(uri.scheme.clone()))?;

        let link = self.modules[module_index].open(&uri, id)?;
        info!(link = %id, scheme = %uri.scheme, "link opened");

        let name = uri.name().map(str::to_string);
        self.names[id.index()] = name;
        self.owner_module[id.index()] = Some(module_index);
        self.links[id.index()] = Some(link);
        Ok(id)
    }

    /// Register a link synthesized by a listener module for a
    /// previously-unseen peer (spec.md §4.1). The child's own identity is
    /// overwritten to match, since the module building it has no way to
    /// know its final `LinkId` in advance.
    pub fn register_child(&mut self, mut link: Box<dyn Link>, owner_module: usize) -> LinkId {
        let id = self.allocate_id();
        link.set_id(id);
        self.names[id.index()] = None;
        self.owner_module[id.index()] = Some(owner_module);
        self.links[id.index()] = Some(link);
        id
    }

    pub fn close_by_id(&mut self, id: LinkId) {
        if let Some(slot) = self.links.get_mut(id.index()) {
            if let Some(mut link) = slot.take() {
                link.close();
                self.names[id.index()] = None;
                self.owner_module[id.index()] = None;
                self.fragmenters[id.index()] = None;
                self.stats.remove(id);
                self.notify_removed(LinkSet::single(id));
            }
        }
    }

    pub fn close_by_name(&mut self, name: &str) {
        let id = self
            .names
            .iter()
            .position(|n| n.as_deref() == Some(name))
            .map(|i| LinkId::new(i as u32));
        if let Some(id) = id {
            self.close_by_id(id);
        }
    }

    fn notify_removed(&mut self, links: LinkSet) {
        if let Some(hook) = self.remove_link_hook.as_mut() {
            hook.remove_link(&links);
        }
    }

    /// Send `frame` to every link in `targets`. Returns the subset that
    /// rejected the send; permanent failures also close the link (spec.md
    /// §4.2, §7). Frames larger than a target's MTU are handed to that
    /// link's fragmenter, if one is configured; otherwise the send fails
    /// as an MTU-too-large policy error (spec.md §4.7).
    pub fn send(&mut self, frame: &Bytes, targets: &LinkSet) -> LinkSet {
        let mut failed = LinkSet::new();
        let mut to_close = Vec::new();

        for id in targets.iter() {
            let mtu = match self.links.get(id.index()) {
                Some(Some(link)) => link.mtu(),
                _ => {
                    failed.insert(id);
                    continue;
                }
            };

            if frame.len() > mtu {
                let fragments = {
                    let Some(fragmenter) =
                        self.fragmenters.get_mut(id.index()).and_then(Option::as_mut)
                    else {
                        warn!(link = %id, len = frame.len(), mtu, "frame exceeds MTU, no fragmenter configured");
                        failed.insert(id);
                        continue;
                    };
                    match fragmenter.fragment(frame, mtu) {
                        Ok(fragments) => fragments,
                        Err(err) => {
                            warn!(link = %id, error = %err, "fragmentation failed");
                            failed.insert(id);
                            continue;
                        }
                    }
                };

                let Some(Some(link)) = self.links.get_mut(id.index()) else {
                    failed.insert(id);
                    continue;
                };
                let mut send_err = None;
                for fragment in &fragments {
                    if let Err(err) = link.send(fragment) {
                        send_err = Some(err);
                        break;
                    }
                }
                let stat = self.stats.entry(id);
                stat.fragments_sent += fragments.len() as u64;
                match send_err {
                    None => stat.frames_sent += 1,
                    Some(err) => {
                        failed.insert(id);
                        if err.is_permanent() {
                            stat.send_failures_permanent += 1;
                            to_close.push(id);
                        } else {
                            stat.send_failures_transient += 1;
                        }
                    }
                }
                continue;
            }

            let Some(Some(link)) = self.links.get_mut(id.index()) else {
                failed.insert(id);
                continue;
            };
            match link.send(frame) {
                Ok(()) => {
                    self.stats.entry(id).frames_sent += 1;
                }
                Err(err) => {
                    failed.insert(id);
                    if err.is_permanent() {
                        warn!(link = %id, error = %err, "permanent send failure, closing link");
                        self.stats.entry(id).send_failures_permanent += 1;
                        to_close.push(id);
                    } else {
                        debug!(link = %id, error = %err, "transient send failure");
                        self.stats.entry(id).send_failures_transient += 1;
                    }
                }
            }
        }

        for id in to_close {
            self.close_by_id(id);
        }
        failed
    }

    /// Ask every listener link's owning module whether it has freshly-seen
    /// peers, registering one child link per peer (spec.md §4.1).
    fn poll_listeners(&mut self) {
        let listeners: Vec<(LinkId, usize)> = self
            .links
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let link = slot.as_ref()?;
                if !link.is_listener() {
                    return None;
                }
                let owner = self.owner_module[index]?;
                Some((LinkId::new(index as u32), owner))
            })
            .collect();

        for (id, module_index) in listeners {
            let children = self.modules[module_index].poll_listener(id);
            for child in children {
                let child_id = self.register_child(child, module_index);
                debug!(listener = %id, child = %child_id, "listener synthesized child link");
            }
        }
    }

    /// Poll every open link up to `timeout_ms` (negative = forever) for a
    /// received frame. Round-robins the starting point across calls so no
    /// single link can starve the rest (spec.md §4.2's fairness
    /// requirement).
    pub fn receive(&mut self, timeout_ms: i64, fairness_cursor: &mut usize) -> Option<Received> {
        let deadline = if timeout_ms < 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_millis(timeout_ms as u64))
        };

        loop {
            self.poll_listeners();

            let link_count = self.links.len();
            if link_count > 0 {
                for offset in 0..link_count {
                    let index = (*fairness_cursor + offset) % link_count;
                    let id = LinkId::new(index as u32);
                    let mut permanent_failure = false;
                    let outcome = {
                        let Some(Some(link)) = self.links.get_mut(index) else {
                            continue;
                        };
                        if link.is_listener() {
                            continue;
                        }
                        let events = link.poll();
                        if events.closing {
                            None
                        } else if events.error {
                            permanent_failure = true;
                            None
                        } else if events.receive {
                            match link.receive() {
                                Ok(Some(frame)) => Some(frame),
                                Ok(None) => None,
                                Err(err) if err.is_permanent() => {
                                    permanent_failure = true;
                                    None
                                }
                                Err(_) => None,
                            }
                        } else {
                            None
                        }
                    };

                    if permanent_failure {
                        self.close_by_id(id);
                        continue;
                    }

                    let Some(frame) = outcome else {
                        continue;
                    };

                    self.stats.entry(id).frames_received += 1;

                    let deliverable = if wire::peek_is_hop_frag(&frame) {
                        self.stats.entry(id).fragments_received += 1;
                        match self.fragmenters.get_mut(index).and_then(Option::as_mut) {
                            Some(fragmenter) => fragmenter.receive(frame),
                            None => {
                                debug!(link = %id, "hop fragment received with no fragmenter configured, dropping");
                                self.stats.entry(id).receive_errors_decode += 1;
                                None
                            }
                        }
                    } else {
                        Some(frame)
                    };

                    let Some(frame) = deliverable else {
                        continue;
                    };

                    *fairness_cursor = (index + 1) % link_count;
                    return Some(Received {
                        frame,
                        ingress: LinkSet::single(id),
                    });
                }
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return None;
                }
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    pub fn link_count(&self) -> usize {
        self.links.iter().filter(|l| l.is_some()).count()
    }

    /// The locality of an open link, used by the forwarding pipeline's
    /// hop-limit enforcement (spec.md §4.1). `None` if the id is unknown or
    /// closed.
    pub fn locality(&self, id: LinkId) -> Option<Locality> {
        self.links.get(id.index())?.as_ref().map(|link| link.locality())
    }
}

impl Default for LinkAdapter {
    fn default() -> Self {
        LinkAdapter::new()
    }
}
