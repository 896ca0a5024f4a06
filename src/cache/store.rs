//! Storage backends for encoded cache records.
//!
//! # Responsibilities
//! - Map an exact request URL to one encoded record
//! - Replace a key's record atomically
//! - Never evict
//!
//! Backends deal in bytes only; decoding lives in `entry.rs` and the
//! hit/miss accounting in [`super::CacheStore`].

use std::path::Path;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tracing::info;

/// Error type for cache storage.
#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("Database error: {0}")]
    Backend(#[from] sled::Error),

    #[error("Corrupt cache record: {0}")]
    Corrupt(String),

    #[error("Unsupported cache record version {0}")]
    UnsupportedVersion(u8),

    #[error("Failed to decompress body: {0}")]
    Decompress(String),
}

/// A key-value store for encoded cache records.
pub trait CacheBackend: Send + Sync + std::fmt::Debug {
    /// Fetch the record stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheStoreError>;

    /// Store `record` under `key`, replacing any previous record as one unit.
    fn set(&self, key: &str, record: Vec<u8>) -> Result<(), CacheStoreError>;

    /// Number of stored records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push buffered writes to durable storage.
    fn flush(&self) -> Result<(), CacheStoreError> {
        Ok(())
    }
}

/// Persistent backend on a sled tree.
///
/// Calls may touch the disk; async code reaches it through
/// [`CacheStore::lookup`](super::CacheStore::lookup) and
/// [`CacheStore::store`](super::CacheStore::store), never directly.
#[derive(Debug)]
pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P, flush_every: Duration) -> Result<Self, CacheStoreError> {
        let flush_every_ms = match flush_every.as_millis() {
            0 => None,
            ms => Some(ms as u64),
        };
        let db = sled::Config::new()
            .path(path.as_ref())
            .flush_every_ms(flush_every_ms)
            .open()?;
        info!(
            path = %path.as_ref().display(),
            entries = db.len(),
            "Opened cache database"
        );
        Ok(Self { db })
    }
}

impl CacheBackend for SledBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheStoreError> {
        Ok(self.db.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn set(&self, key: &str, record: Vec<u8>) -> Result<(), CacheStoreError> {
        self.db.insert(key.as_bytes(), record)?;
        Ok(())
    }

    fn len(&self) -> usize {
        self.db.len()
    }

    fn flush(&self) -> Result<(), CacheStoreError> {
        self.db.flush()?;
        Ok(())
    }
}

/// Process-local backend. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: DashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheStoreError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    fn set(&self, key: &str, record: Vec<u8>) -> Result<(), CacheStoreError> {
        self.records.insert(key.to_string(), record);
        Ok(())
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
