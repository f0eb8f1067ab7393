//! Memory Backend
//!
//! Keeps values in process memory for the lifetime of the backend.
//! Uses DashMap for lock-free concurrent access instead of a single RwLock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

use super::Backend;
use crate::error::Result;

/// Stored value with its optional deadline
#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

/// Deadline `ttl` from `now`, none when it lies beyond what `Instant` holds
fn deadline(now: Instant, ttl: Option<Duration>) -> Option<Instant> {
    ttl.and_then(|ttl| now.checked_add(ttl))
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    storage: DashMap<String, Slot>,
    /// Entries dropped because their TTL elapsed
    expirations: AtomicU64,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until next read
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Number of entries purged on read after expiring
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Copy of all live entries
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        let now = Instant::now();
        let mut entries: Vec<(String, Value)> = self
            .storage
            .iter()
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| (slot.key().clone(), slot.value.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn live(&self, id: &str) -> Option<Value> {
        let now = Instant::now();
        // remove_if takes the shard write lock only for expired slots
        if self
            .storage
            .remove_if(id, |_, slot| slot.is_expired(now))
            .is_some()
        {
            self.expirations.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.storage.get(id).map(|slot| slot.value.clone())
    }
}

impl Backend for MemoryBackend {
    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.live(id).is_some())
    }

    fn get(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.live(id))
    }

    fn add(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        let now = Instant::now();
        let slot = Slot {
            value,
            expires_at: deadline(now, ttl),
        };

        // Single entry lock makes add-if-absent atomic per key
        match self.storage.entry(id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(slot);
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Ok(true)
            }
        }
    }

    fn set(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        let expires_at = deadline(Instant::now(), ttl);
        self.storage.insert(id.to_string(), Slot { value, expires_at });
        Ok(true)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.storage.remove(id).is_some())
    }

    fn flush_all(&self) -> Result<bool> {
        self.storage.clear();
        Ok(true)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("foo").unwrap(), None);

        backend.set("foo", json!("bar"), None).unwrap();
        assert_eq!(backend.get("foo").unwrap(), Some(json!("bar")));

        backend.set("foo", json!("baz"), None).unwrap();
        assert_eq!(backend.get("foo").unwrap(), Some(json!("baz")));
    }

    #[test]
    fn test_falsy_values_are_present() {
        let backend = MemoryBackend::new();
        for (id, value) in [("f", json!(false)), ("n", json!(null)), ("z", json!(0))] {
            backend.set(id, value.clone(), None).unwrap();
            assert!(backend.exists(id).unwrap());
            assert_eq!(backend.get(id).unwrap(), Some(value));
        }
    }

    #[test]
    fn test_add_keeps_existing_value() {
        let backend = MemoryBackend::new();
        assert!(backend.add("foo", json!("bar"), None).unwrap());
        assert!(!backend.add("foo", json!("baz"), None).unwrap());
        assert_eq!(backend.get("foo").unwrap(), Some(json!("bar")));
    }

    #[test]
    fn test_expired_entry_is_absent() {
        let backend = MemoryBackend::new();
        backend
            .set("foo", json!("bar"), Some(Duration::from_millis(10)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));

        assert!(!backend.exists("foo").unwrap());
        assert_eq!(backend.get("foo").unwrap(), None);
        assert_eq!(backend.expirations(), 1);
        assert!(backend.is_empty());
    }

    #[test]
    fn test_add_replaces_expired_entry() {
        let backend = MemoryBackend::new();
        backend
            .set("foo", json!("old"), Some(Duration::from_millis(10)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));

        assert!(backend.add("foo", json!("new"), None).unwrap());
        assert_eq!(backend.get("foo").unwrap(), Some(json!("new")));
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let backend = MemoryBackend::new();
        let forever = Some(Duration::from_secs(u64::MAX));

        assert!(backend.set("a", json!(1), forever).unwrap());
        assert!(backend.add("b", json!(2), Some(Duration::MAX)).unwrap());
        assert_eq!(backend.get("a").unwrap(), Some(json!(1)));
        assert_eq!(backend.get("b").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_delete_and_flush() {
        let backend = MemoryBackend::new();
        backend.set("a", json!(1), None).unwrap();
        backend.set("b", json!(2), None).unwrap();

        assert!(backend.delete("a").unwrap());
        assert!(!backend.delete("a").unwrap());
        assert_eq!(backend.len(), 1);

        assert!(backend.flush_all().unwrap());
        assert!(backend.is_empty());
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let backend = MemoryBackend::new();
        backend.set("b", json!(2), None).unwrap();
        backend.set("a", json!(1), None).unwrap();

        let snapshot = backend.snapshot();
        assert_eq!(
            snapshot,
            vec![("a".to_string(), json!(1)), ("b".to_string(), json!(2))]
        );
    }
}
