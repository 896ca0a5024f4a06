//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! FetchOrchestrator
//!     → CacheStore::lookup(url)  (blocking pool: hit/miss counted, record decoded)
//!     → CacheStore::store(url)   (blocking pool: record encoded, replaced atomically)
//!     → store.rs backend         (sled on disk, or in-memory map)
//! ```
//!
//! # Design Decisions
//! - Keys are exact request URLs; no normalization
//! - No eviction and no TTL; freshness belongs to the orchestrator
//! - Storage failures never reach the caller: reads become misses,
//!   writes are logged and dropped
//! - Backends and LZ4 are synchronous; async callers go through
//!   `lookup`/`store`, which run them on tokio's blocking pool

pub mod entry;
pub mod store;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheBackendKind, CacheConfig};
use crate::observability::metrics;

pub use entry::{CacheEntry, ENTRY_FORMAT_VERSION};
pub use store::{CacheBackend, CacheStoreError, MemoryBackend, SledBackend};

/// Snapshot of the process-wide lookup counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Cache handle shared by all requests.
#[derive(Debug)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    /// Wrap a backend with fresh counters.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Open the backend selected by configuration.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheStoreError> {
        let backend: Arc<dyn CacheBackend> = match config.backend {
            CacheBackendKind::Sled => Arc::new(SledBackend::open(
                &config.path,
                Duration::from_millis(config.flush_every_ms),
            )?),
            CacheBackendKind::Memory => Arc::new(MemoryBackend::new()),
        };
        Ok(Self::new(backend))
    }

    /// In-memory store, mostly for tests.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Look up `key`, counting a hit if an entry is present and a miss otherwise.
    ///
    /// Unreadable or undecodable records count as misses.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = match self.backend.get(key) {
            Ok(Some(record)) => match CacheEntry::decode(&record) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding unreadable cache record");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        };

        if entry.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_cache_lookup(entry.is_some());
        entry
    }

    /// Store `entry` under `key`, replacing any previous entry.
    ///
    /// Returns whether the write landed. Failures are logged, not raised.
    pub fn set(&self, key: &str, entry: &CacheEntry) -> bool {
        let result = entry.encode().and_then(|record| self.backend.set(key, record));
        match result {
            Ok(()) => {
                metrics::record_cache_write(true);
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache write failed, continuing without caching");
                metrics::record_cache_write(false);
                false
            }
        }
    }

    /// [`get`](Self::get) on the blocking pool.
    pub async fn lookup(self: &Arc<Self>, key: &str) -> Option<CacheEntry> {
        let store = Arc::clone(self);
        let owned = key.to_string();
        match tokio::task::spawn_blocking(move || store.get(&owned)).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache lookup task failed, treating as miss");
                None
            }
        }
    }

    /// [`set`](Self::set) on the blocking pool.
    ///
    /// The write completes even if the caller is dropped while waiting.
    pub async fn store(self: &Arc<Self>, key: &str, entry: CacheEntry) -> bool {
        let store = Arc::clone(self);
        let owned = key.to_string();
        match tokio::task::spawn_blocking(move || store.set(&owned, &entry)).await {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache write task failed");
                false
            }
        }
    }

    /// Current hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    /// Flush buffered writes; called on shutdown.
    pub fn flush(&self) {
        if let Err(e) = self.backend.flush() {
            tracing::error!(error = %e, "Failed to flush cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[derive(Debug)]
    struct BrokenBackend;

    impl CacheBackend for BrokenBackend {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheStoreError> {
            Err(CacheStoreError::Corrupt("disk on fire".to_string()))
        }

        fn set(&self, _key: &str, _record: Vec<u8>) -> Result<(), CacheStoreError> {
            Err(CacheStoreError::Corrupt("disk on fire".to_string()))
        }

        fn len(&self) -> usize {
            0
        }
    }

    fn entry(body: &[u8]) -> CacheEntry {
        CacheEntry::new(200, Vec::new(), body, SystemTime::now())
    }

    #[test]
    fn counts_hits_and_misses() {
        let cache = CacheStore::in_memory();
        assert!(cache.get("http://example.com/").is_none());
        assert!(cache.set("http://example.com/", &entry(b"home")));
        assert!(cache.get("http://example.com/").is_some());
        assert!(cache.get("http://example.com/").is_some());

        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 1 });
    }

    #[test]
    fn set_replaces_whole_entry() {
        let cache = CacheStore::in_memory();
        cache.set("k", &CacheEntry::new(200, vec![("a".into(), "1".into())], b"old", SystemTime::now()));
        cache.set("k", &CacheEntry::new(404, Vec::new(), b"new", SystemTime::now()));

        let stored = cache.get("k").unwrap();
        assert_eq!(stored.status, 404);
        assert!(stored.headers.is_empty());
        assert_eq!(stored.body().unwrap(), b"new");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn broken_backend_degrades() {
        let cache = CacheStore::new(Arc::new(BrokenBackend));
        assert!(!cache.set("k", &entry(b"x")));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.stats(), CacheStats { hits: 0, misses: 1 });
    }

    #[tokio::test]
    async fn lookup_and_store_on_sled() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SledBackend::open(dir.path(), Duration::from_millis(500)).unwrap();
        let cache = Arc::new(CacheStore::new(Arc::new(backend)));

        assert!(cache.lookup("http://example.com/").await.is_none());
        assert!(cache.store("http://example.com/", entry(b"home")).await);
        let found = cache.lookup("http://example.com/").await.unwrap();

        assert_eq!(found.body().unwrap(), b"home");
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn corrupt_record_is_a_miss() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set("k", vec![ENTRY_FORMAT_VERSION, 0xff]).unwrap();
        let cache = CacheStore::new(backend);

        assert!(cache.get("k").is_none());
        assert_eq!(cache.stats().misses, 1);
    }
}
