//! Bounded, name/keyId/hash-addressed ContentObject cache with LRU
//! eviction (spec.md §4.5).

use std::collections::HashMap;
use std::sync::Arc;

use athena_common::{ContentObjectHash, Interest, KeyId, Message};
use quanta::Instant;

/// Why [`ContentStore::put`] rejected an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The object alone is larger than the store's total capacity — no
    /// amount of eviction would make room (spec.md §4.5).
    TooLarge,
}

/// The `(name, keyId?, hash)` triple a [`ContentStore`] keys entries by
/// (spec.md §3: "No two entries have identical (name, keyId, hash)
/// triples").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StoreKey {
    name: athena_common::Name,
    key_id: Option<KeyId>,
    content_object_hash: ContentObjectHash,
}

/// One cached object. The Content Store owns the wire bytes of cached
/// objects via the shared `Message` (spec.md §5: "The Content Store owns
/// the wire bytes of cached objects"); `message` is the same
/// reference-counted handle the engine forwarded, so caching never copies
/// the payload.
struct StoreEntry {
    message: Arc<Message>,
    expiry_time_ms: Option<u64>,
    size: usize,
    last_access: Instant,
}

/// Bounded cache of ContentObjects. Default eviction policy is LRU
/// (spec.md §4.5: "LRU is the default implementation").
pub struct ContentStore {
    entries: HashMap<StoreKey, StoreEntry>,
    capacity_bytes: usize,
    used_bytes: usize,
}

impl ContentStore {
    /// `capacity_mb` megabytes of total wire-byte capacity.
    pub fn new(capacity_mb: u64) -> Self {
        ContentStore {
            entries: HashMap::new(),
            capacity_bytes: (capacity_mb as usize).saturating_mul(1024 * 1024),
            used_bytes: 0,
        }
    }

    /// Evict least-recently-used entries until `needed` additional bytes
    /// fit, or nothing is left to evict.
    fn make_room(&mut self, needed: usize) {
        while self.used_bytes + needed > self.capacity_bytes {
            let victim = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| key.clone());
            let Some(victim) = victim else { break };
            if let Some(removed) = self.entries.remove(&victim) {
                self.used_bytes -= removed.size;
            }
        }
    }

    /// Insert or refresh an entry for a ContentObject-bearing `message`,
    /// evicting by LRU if capacity requires it. Rejects objects
    /// individually larger than total capacity (spec.md §4.5: "never evict
    /// to accommodate an item larger than total capacity").
    ///
    /// Panics if `message` does not carry a ContentObject; that is a
    /// programmer error, not a representable failure (spec.md §7).
    pub fn put(&mut self, message: Arc<Message>) -> Result<(), RejectReason> {
        let content_object = message
            .as_content_object()
            .expect("content_store::put requires a ContentObject message");
        let size = message.wire().len();
        if size > self.capacity_bytes {
            return Err(RejectReason::TooLarge);
        }

        let key = StoreKey {
            name: content_object.name.clone(),
            key_id: content_object.key_id.clone(),
            content_object_hash: content_object.content_object_hash.clone(),
        };
        let expiry_time_ms = content_object.expiry_time_ms;

        if let Some(existing) = self.entries.remove(&key) {
            self.used_bytes -= existing.size;
        }

        self.make_room(size);
        self.entries.insert(
            key,
            StoreEntry {
                message,
                expiry_time_ms,
                size,
                last_access: Instant::now(),
            },
        );
        self.used_bytes += size;
        Ok(())
    }

    fn is_expired(expiry_time_ms: Option<u64>, now_ms: u64) -> bool {
        matches!(expiry_time_ms, Some(expiry) if expiry <= now_ms)
    }

    /// Find an unexpired entry consistent with `interest`'s restriction,
    /// updating its last-access time on a hit (spec.md §4.5). Returns the
    /// cached `Message` so the caller can forward its wire bytes unchanged.
    pub fn get_match(&mut self, interest: &Interest, now_ms: u64) -> Option<Arc<Message>> {
        let hit_key = self.entries.iter().find_map(|(key, entry)| {
            if key.name != interest.name {
                return None;
            }
            if let Some(want) = &interest.key_id {
                if key.key_id.as_ref() != Some(want) {
                    return None;
                }
            }
            if let Some(want) = &interest.content_object_hash {
                if &key.content_object_hash != want {
                    return None;
                }
            }
            if Self::is_expired(entry.expiry_time_ms, now_ms) {
                return None;
            }
            Some(key.clone())
        })?;

        let entry = self.entries.get_mut(&hit_key)?;
        entry.last_access = Instant::now();
        Some(Arc::clone(&entry.message))
    }

    /// Remove one entry consistent with `(name, keyId?, hash?)`, if any.
    pub fn remove_match(
        &mut self,
        name: &athena_common::Name,
        key_id: Option<&KeyId>,
        hash: Option<&ContentObjectHash>,
    ) -> bool {
        let victim = self.entries.keys().find(|key| {
            &key.name == name
                && key_id.map_or(true, |want| key.key_id.as_ref() == Some(want))
                && hash.map_or(true, |want| &key.content_object_hash == want)
        });
        let Some(victim) = victim.cloned() else {
            return false;
        };
        if let Some(removed) = self.entries.remove(&victim) {
            self.used_bytes -= removed.size;
            return true;
        }
        false
    }

    pub fn set_capacity(&mut self, megabytes: u64) {
        self.capacity_bytes = (megabytes as usize).saturating_mul(1024 * 1024);
        self.make_room(0);
    }

    pub fn get_capacity_mb(&self) -> u64 {
        (self.capacity_bytes / (1024 * 1024)) as u64
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athena_common::{ContentObject, MessageKind, Name};
    use bytes::Bytes;

    fn co_message(path: &str, payload_len: usize) -> Arc<Message> {
        let content_object = ContentObject {
            name: Name::parse(path),
            key_id: None,
            content_object_hash: Bytes::from_static(b"h"),
            expiry_time_ms: None,
            payload: Bytes::from(vec![0u8; payload_len]),
        };
        let wire = Bytes::from(vec![0u8; payload_len]);
        Message::shared(wire, MessageKind::ContentObject(content_object))
    }

    fn co_message_with_expiry(path: &str, payload_len: usize, expiry_time_ms: u64) -> Arc<Message> {
        let content_object = ContentObject {
            name: Name::parse(path),
            key_id: None,
            content_object_hash: Bytes::from_static(b"h"),
            expiry_time_ms: Some(expiry_time_ms),
            payload: Bytes::from(vec![0u8; payload_len]),
        };
        let wire = Bytes::from(vec![0u8; payload_len]);
        Message::shared(wire, MessageKind::ContentObject(content_object))
    }

    #[test]
    fn put_then_get_match_round_trips() {
        let mut store = ContentStore::new(1);
        store.put(co_message("ccnx:/a", 10)).unwrap();
        let interest = Interest::new(Name::parse("ccnx:/a"));
        let found = store.get_match(&interest, 0);
        assert!(found.is_some());
    }

    #[test]
    fn oversized_object_is_rejected() {
        let mut store = ContentStore::new(1);
        let huge = co_message("ccnx:/a", 2 * 1024 * 1024);
        assert_eq!(store.put(huge), Err(RejectReason::TooLarge));
        assert_eq!(store.entry_count(), 0);
    }

    #[test]
    fn lru_eviction_makes_room() {
        let mut store = ContentStore::new(1); // 1 MiB
        let chunk = 400 * 1024;
        store.put(co_message("ccnx:/a", chunk)).unwrap();
        store.put(co_message("ccnx:/b", chunk)).unwrap();

        // touch /a so /b becomes the LRU victim
        store.get_match(&Interest::new(Name::parse("ccnx:/a")), 0);

        store.put(co_message("ccnx:/c", chunk)).unwrap();

        assert!(store
            .get_match(&Interest::new(Name::parse("ccnx:/a")), 0)
            .is_some());
        assert!(store
            .get_match(&Interest::new(Name::parse("ccnx:/c")), 0)
            .is_some());
        assert!(store
            .get_match(&Interest::new(Name::parse("ccnx:/b")), 0)
            .is_none());
    }

    #[test]
    fn expired_entry_is_treated_as_absent() {
        let mut store = ContentStore::new(1);
        store.put(co_message_with_expiry("ccnx:/a", 10, 100)).unwrap();

        assert!(store
            .get_match(&Interest::new(Name::parse("ccnx:/a")), 50)
            .is_some());
        assert!(store
            .get_match(&Interest::new(Name::parse("ccnx:/a")), 200)
            .is_none());
    }

    #[test]
    fn remove_match_deletes_one_entry() {
        let mut store = ContentStore::new(1);
        store.put(co_message("ccnx:/a", 10)).unwrap();
        assert!(store.remove_match(&Name::parse("ccnx:/a"), None, None));
        assert_eq!(store.entry_count(), 0);
    }

    #[test]
    fn set_capacity_evicts_immediately_if_needed() {
        let mut store = ContentStore::new(1);
        store.put(co_message("ccnx:/a", 900 * 1024)).unwrap();
        store.set_capacity(0);
        assert_eq!(store.entry_count(), 0);
        assert_eq!(store.used_bytes(), 0);
    }
}
