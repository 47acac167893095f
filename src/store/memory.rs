//! In-process window store.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{StoreError, WindowRecord, WindowStore};

/// An entry in the in-memory store.
#[derive(Debug, Clone)]
struct Entry {
    record: WindowRecord,
    expires_at: Instant,
}

/// An in-process window store backed by a concurrent map.
///
/// Expiry is lazy: a stale entry is dropped the next time its key is read.
/// Long-idle keys that are never read again are reclaimed by
/// [`purge_expired`](MemoryStore::purge_expired), which callers can run on
/// whatever interval suits them.
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Drop every entry whose TTL has elapsed.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Number of live entries, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all entries.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WindowStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<WindowRecord>, StoreError> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.record.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            trace!(key, "Evicting expired window record");
            self.entries.remove(key);
        }

        Ok(None)
    }

    async fn put(&self, key: &str, record: WindowRecord, ttl: Duration) -> Result<(), StoreError> {
        let entry = Entry {
            record,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }
}
