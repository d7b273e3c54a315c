//! Pending Interest Table: request-coalescing and reverse-path tracking
//! (spec.md §4.4).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use athena_common::{ContentObject, LinkSet, MatchableKey, Name};
use quanta::Instant;

/// The default PIT entry lifetime when none is supplied. Mirrors the
/// 4-second default Interest lifetime CCNx forwarders conventionally use
/// (an Open Question in spec.md §9 left to implementation choice — see
/// DESIGN.md).
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(4);

struct PitEntry {
    ingress: LinkSet,
    expected_return: LinkSet,
    created_at: Instant,
    lifetime: Duration,
}

impl PitEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.lifetime
    }
}

/// Outcome of [`Pit::add_interest`].
#[derive(Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new entry was created; the caller must populate its
    /// expected-return set via [`Pit::set_expected_return`] once it has
    /// consulted the FIB.
    Forward,
    /// An existing, unexpired entry absorbed this interest's ingress set.
    Aggregated,
}

/// Request-coalescing table keyed by [`MatchableKey`] (spec.md §4.4),
/// grounded in the same (ingress-set, expected-return-set, created-at,
/// lifetime) shape spec.md §3 assigns to `PITEntry`.
#[derive(Default)]
pub struct Pit {
    entries: HashMap<MatchableKey, PitEntry>,
    by_name: HashMap<Name, HashSet<MatchableKey>>,
}

impl Pit {
    pub fn new() -> Self {
        Pit::default()
    }

    fn index_name(&mut self, key: &MatchableKey) {
        self.by_name
            .entry(key.name.clone())
            .or_default()
            .insert(key.clone());
    }

    fn unindex_name(&mut self, key: &MatchableKey) {
        if let Some(keys) = self.by_name.get_mut(&key.name) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_name.remove(&key.name);
            }
        }
    }

    fn evict_if_expired(&mut self, key: &MatchableKey, now: Instant) -> bool {
        let expired = self.entries.get(key).is_some_and(|e| e.is_expired(now));
        if expired {
            self.entries.remove(key);
            self.unindex_name(key);
        }
        expired
    }

    /// Aggregate `key` against `ingress` with the default lifetime.
    pub fn add_interest(&mut self, key: &MatchableKey, ingress: &LinkSet) -> AddOutcome {
        self.add_interest_with_lifetime(key, ingress, DEFAULT_LIFETIME)
    }

    pub fn add_interest_with_lifetime(
        &mut self,
        key: &MatchableKey,
        ingress: &LinkSet,
        lifetime: Duration,
    ) -> AddOutcome {
        let now = Instant::now();
        self.evict_if_expired(key, now);

        if let Some(entry) = self.entries.get_mut(key) {
            entry.ingress.union_with(ingress);
            return AddOutcome::Aggregated;
        }

        self.entries.insert(
            key.clone(),
            PitEntry {
                ingress: ingress.clone(),
                expected_return: LinkSet::new(),
                created_at: now,
                lifetime,
            },
        );
        self.index_name(key);
        AddOutcome::Forward
    }

    /// Populate the expected-return set for a freshly created entry
    /// (spec.md §4.6 step 7: "copy `egress` into the PIT entry's
    /// expected-return set").
    pub fn set_expected_return(&mut self, key: &MatchableKey, links: &LinkSet) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.expected_return = links.clone();
        }
    }

    /// Subtract links the adapter reported as failed on send (spec.md
    /// §4.6 step 8).
    pub fn subtract_expected_return(&mut self, key: &MatchableKey, failed: &LinkSet) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.expected_return.difference_with(failed);
        }
    }

    /// Find every unexpired entry consistent with `content_object` whose
    /// expected-return set intersects `ingress`, union their ingress sets
    /// minus `ingress`, and remove the consumed entries (spec.md §4.4).
    pub fn match_content_object(
        &mut self,
        content_object: &ContentObject,
        ingress: &LinkSet,
    ) -> Option<LinkSet> {
        let now = Instant::now();
        let Some(candidate_keys) = self.by_name.get(&content_object.name).cloned() else {
            return None;
        };

        let mut result = LinkSet::new();
        let mut consumed = Vec::new();

        for key in candidate_keys {
            if self.evict_if_expired(&key, now) {
                continue;
            }
            let Some(entry) = self.entries.get(&key) else {
                continue;
            };
            if !key_consistent_with(&key, content_object) {
                continue;
            }
            if !entry.expected_return.intersects(ingress) {
                continue;
            }
            result.union_with(&entry.ingress);
            consumed.push(key);
        }

        if consumed.is_empty() {
            return None;
        }

        for key in consumed {
            self.entries.remove(&key);
            self.unindex_name(&key);
        }

        result.difference_with(ingress);
        Some(result)
    }

    /// Clear `links` from `key`'s ingress set; remove the entry once
    /// empty (spec.md §4.4).
    pub fn remove_interest(&mut self, key: &MatchableKey, links: &LinkSet) {
        let should_remove = if let Some(entry) = self.entries.get_mut(key) {
            entry.ingress.difference_with(links);
            entry.ingress.is_empty()
        } else {
            false
        };
        if should_remove {
            self.entries.remove(key);
            self.unindex_name(key);
        }
    }

    /// Subtract `links` from every entry's ingress and expected-return
    /// sets; delete entries whose ingress set becomes empty (spec.md
    /// §4.4, §4.2).
    pub fn remove_link(&mut self, links: &LinkSet) {
        let mut to_remove = Vec::new();
        for (key, entry) in self.entries.iter_mut() {
            entry.ingress.difference_with(links);
            entry.expected_return.difference_with(links);
            if entry.ingress.is_empty() {
                to_remove.push(key.clone());
            }
        }
        for key in to_remove {
            self.entries.remove(&key);
            self.unindex_name(&key);
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, key: &MatchableKey) -> bool {
        self.entries.contains_key(key)
    }
}

/// A PIT entry's key is consistent with a ContentObject when the name is
/// equal, the keyId matches if the key constrained it, and the hash
/// matches if the key constrained it (spec.md §4.4, mirroring
/// `ContentObject::satisfies`'s Interest-side relation).
fn key_consistent_with(key: &MatchableKey, content_object: &ContentObject) -> bool {
    if key.name != content_object.name {
        return false;
    }
    if let Some(want) = &key.key_id {
        if content_object.key_id.as_ref() != Some(want) {
            return false;
        }
    }
    if let Some(want) = &key.content_object_hash {
        if &content_object.content_object_hash != want {
            return false;
        }
    }
    true
}
