//! Cache storage backends.

use super::CacheEntry;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Counters exposed by a cache backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries evicted to stay within budget.
    pub evictions: u64,
    /// Entries currently stored.
    pub entries: u64,
    /// Bytes currently stored.
    pub bytes: u64,
}

/// Pluggable cache storage.
///
/// The default is the in-memory LRU below; other backends slot in behind the
/// same capability. Stored values are shared-immutable; eviction invalidates
/// by replacement.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Look up an entry.
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Store an entry, evicting as needed.
    async fn put(&self, key: String, entry: CacheEntry);

    /// Remove an entry.
    async fn delete(&self, key: &str);

    /// Remove all entries.
    async fn clear(&self);

    /// Current counters.
    fn stats(&self) -> CacheStats;
}

struct MemoryInner {
    entries: LruCache<String, CacheEntry>,
    bytes: u64,
}

/// In-memory LRU cache backend bounded by entry count and total bytes.
pub struct MemoryBackend {
    inner: Mutex<MemoryInner>,
    max_bytes: u64,
    max_entry_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryBackend {
    /// Create a backend with the given bounds.
    pub fn new(max_entries: usize, max_bytes: u64, max_entry_bytes: u64) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(MemoryInner {
                entries: LruCache::new(capacity),
                bytes: 0,
            }),
            max_bytes,
            max_entry_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn put(&self, key: String, entry: CacheEntry) {
        if entry.size > self.max_entry_bytes {
            debug!(key = %key, size = entry.size, "Cache entry exceeds per-entry limit, rejecting");
            return;
        }

        let size = entry.size;
        let mut inner = self.inner.lock();

        if let Some(old) = inner.entries.pop(&key) {
            inner.bytes -= old.size;
        }

        // Evict from the tail until the new entry fits the byte budget.
        while inner.bytes + size > self.max_bytes {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.bytes -= evicted.size;
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }

        if let Some((_, displaced)) = inner.entries.push(key, entry) {
            inner.bytes -= displaced.size;
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        inner.bytes += size;
    }

    async fn delete(&self, key: &str) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.pop(key) {
            inner.bytes -= entry.size;
        }
    }

    async fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.bytes = 0;
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: inner.entries.len() as u64,
            bytes: inner.bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::{Duration, Instant};

    fn entry(body: &[u8]) -> CacheEntry {
        CacheEntry {
            status: 200,
            headers: http::HeaderMap::new(),
            body: Bytes::copy_from_slice(body),
            stored_at: Instant::now(),
            lifetime: Duration::from_secs(60),
            etag: None,
            last_modified: None,
            vary: Vec::new(),
            size: body.len() as u64,
        }
    }

    #[tokio::test]
    async fn test_get_put_roundtrip() {
        let backend = MemoryBackend::new(16, 1024, 512);
        assert!(backend.get("k").await.is_none());

        backend.put("k".to_string(), entry(b"value")).await;
        let got = backend.get("k").await.unwrap();
        assert_eq!(got.body, Bytes::from_static(b"value"));

        let stats = backend.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.bytes, 5);
    }

    #[tokio::test]
    async fn test_oversized_entry_rejected() {
        let backend = MemoryBackend::new(16, 1024, 8);
        backend.put("big".to_string(), entry(&[0u8; 64])).await;
        assert!(backend.get("big").await.is_none());
        assert_eq!(backend.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_byte_budget_evicts_lru() {
        let backend = MemoryBackend::new(16, 20, 20);
        backend.put("a".to_string(), entry(&[0u8; 10])).await;
        backend.put("b".to_string(), entry(&[0u8; 10])).await;

        // Touch "a" so "b" is the LRU victim.
        backend.get("a").await.unwrap();
        backend.put("c".to_string(), entry(&[0u8; 10])).await;

        assert!(backend.get("a").await.is_some());
        assert!(backend.get("b").await.is_none());
        assert!(backend.get("c").await.is_some());
        assert_eq!(backend.stats().evictions, 1);
        assert_eq!(backend.stats().bytes, 20);
    }

    #[tokio::test]
    async fn test_entry_count_bound() {
        let backend = MemoryBackend::new(2, 1024, 512);
        backend.put("a".to_string(), entry(b"1")).await;
        backend.put("b".to_string(), entry(b"2")).await;
        backend.put("c".to_string(), entry(b"3")).await;

        assert_eq!(backend.stats().entries, 2);
        assert!(backend.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_replace_same_key_updates_bytes() {
        let backend = MemoryBackend::new(4, 1024, 512);
        backend.put("k".to_string(), entry(&[0u8; 10])).await;
        backend.put("k".to_string(), entry(&[0u8; 4])).await;

        let stats = backend.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.bytes, 4);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let backend = MemoryBackend::new(4, 1024, 512);
        backend.put("k".to_string(), entry(b"v")).await;
        backend.delete("k").await;
        assert_eq!(backend.stats().bytes, 0);

        backend.put("k".to_string(), entry(b"v")).await;
        backend.clear().await;
        assert_eq!(backend.stats().entries, 0);
        assert_eq!(backend.stats().bytes, 0);
    }
}
