// In-memory range cache — exact-key, capacity-bounded, LRU + TTL eviction.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

/// Exact-range cache key. A hit requires byte-for-byte identity of the
/// requested window; overlapping ranges are distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub content_id: String,
    pub file_index: usize,
    pub start: u64,
    pub end: u64,
}

struct CacheEntry {
    data: Bytes,
    last_access: Instant,
}

struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    current_bytes: u64,
}

/// Bounded store of fully-materialized byte ranges.
///
/// All size accounting happens under one lock, so `current_bytes` can never
/// drift from the entry set. Entries expire `ttl` after their last access;
/// a maintenance pass runs on every `put` and `get`, and LRU eviction makes
/// room under capacity pressure.
pub struct StreamCache {
    inner: Mutex<CacheInner>,
    capacity: u64,
    ttl: Duration,
}

impl StreamCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                current_bytes: 0,
            }),
            capacity,
            ttl,
        }
    }

    /// Look up an exact range. Refreshes the entry's last-access time on hit.
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        Self::purge_expired(&mut inner, now, self.ttl);

        let entry = inner.entries.get_mut(key)?;
        entry.last_access = now;
        Some(entry.data.clone())
    }

    /// Insert a fully-read range. Entries larger than the whole cache are
    /// refused outright rather than evicting everything and failing anyway.
    pub fn put(&self, key: CacheKey, data: Bytes) {
        let size = data.len() as u64;
        if size > self.capacity {
            debug!(
                "cache refuses oversized entry: {} bytes > capacity {}",
                size, self.capacity
            );
            return;
        }

        let now = Instant::now();
        let mut inner = self.inner.lock();
        Self::purge_expired(&mut inner, now, self.ttl);

        // Replacing an existing entry releases its bytes first.
        if let Some(old) = inner.entries.remove(&key) {
            inner.current_bytes -= old.data.len() as u64;
        }

        while inner.current_bytes + size > self.capacity {
            if !Self::evict_lru(&mut inner) {
                break;
            }
        }

        inner.current_bytes += size;
        inner.entries.insert(
            key,
            CacheEntry {
                data,
                last_access: now,
            },
        );
    }

    pub fn current_bytes(&self) -> u64 {
        self.inner.lock().current_bytes
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn purge_expired(inner: &mut CacheInner, now: Instant, ttl: Duration) {
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_access) > ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            if let Some(entry) = inner.entries.remove(&key) {
                inner.current_bytes -= entry.data.len() as u64;
                debug!("cache entry expired: {:?}", key);
            }
        }
    }

    /// Remove the least-recently-used entry. Returns false when empty.
    fn evict_lru(inner: &mut CacheInner) -> bool {
        let victim = inner
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone());
        match victim {
            Some(key) => {
                if let Some(entry) = inner.entries.remove(&key) {
                    inner.current_bytes -= entry.data.len() as u64;
                    debug!("cache evicted LRU entry: {:?}", key);
                }
                true
            }
            None => false,
        }
    }
}
