//! Cache entry and its on-disk record.
//!
//! # Record layout
//! ```text
//! [version: u8][meta_len: u32 LE][meta: JSON][body: LZ4 block, size prepended]
//! ```
//!
//! The version byte comes first so a future layout can be told apart from
//! this one without parsing anything else.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::cache::store::CacheStoreError;

/// Current record layout.
pub const ENTRY_FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = 1 + 4;

/// A stored upstream response, already filtered and rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Upstream status code at write time.
    pub status: u16,
    /// Response headers in upstream order, names lowercased.
    pub headers: Vec<(String, String)>,
    /// LZ4-compressed body.
    pub compressed_body: Vec<u8>,
    /// Wall-clock write time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

#[derive(Serialize, Deserialize)]
struct EntryMeta {
    status: u16,
    timestamp_ms: u64,
    headers: Vec<(String, String)>,
}

impl CacheEntry {
    /// Build an entry, compressing `body`.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: &[u8], written_at: SystemTime) -> Self {
        Self {
            status,
            headers,
            compressed_body: lz4_flex::compress_prepend_size(body),
            timestamp_ms: unix_millis(written_at),
        }
    }

    /// Decompress the stored body.
    pub fn body(&self) -> Result<Vec<u8>, CacheStoreError> {
        lz4_flex::decompress_size_prepended(&self.compressed_body)
            .map_err(|e| CacheStoreError::Decompress(e.to_string()))
    }

    /// Time elapsed since the entry was written. Zero if the clock went backwards.
    pub fn age(&self, now: SystemTime) -> Duration {
        Duration::from_millis(unix_millis(now).saturating_sub(self.timestamp_ms))
    }

    /// Serialize into a versioned record.
    pub fn encode(&self) -> Result<Vec<u8>, CacheStoreError> {
        let meta = serde_json::to_vec(&EntryMeta {
            status: self.status,
            timestamp_ms: self.timestamp_ms,
            headers: self.headers.clone(),
        })
        .map_err(|e| CacheStoreError::Corrupt(e.to_string()))?;

        let meta_len = u32::try_from(meta.len())
            .map_err(|_| CacheStoreError::Corrupt("header block too large".to_string()))?;

        let mut record = Vec::with_capacity(HEADER_LEN + meta.len() + self.compressed_body.len());
        record.push(ENTRY_FORMAT_VERSION);
        record.extend_from_slice(&meta_len.to_le_bytes());
        record.extend_from_slice(&meta);
        record.extend_from_slice(&self.compressed_body);
        Ok(record)
    }

    /// Parse a record produced by [`CacheEntry::encode`].
    pub fn decode(record: &[u8]) -> Result<Self, CacheStoreError> {
        let (&version, rest) = record
            .split_first()
            .ok_or_else(|| CacheStoreError::Corrupt("empty record".to_string()))?;
        if version != ENTRY_FORMAT_VERSION {
            return Err(CacheStoreError::UnsupportedVersion(version));
        }

        if rest.len() < 4 {
            return Err(CacheStoreError::Corrupt("truncated length".to_string()));
        }
        let (len_bytes, rest) = rest.split_at(4);
        let meta_len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;

        if rest.len() < meta_len {
            return Err(CacheStoreError::Corrupt("truncated header block".to_string()));
        }
        let (meta, body) = rest.split_at(meta_len);
        let meta: EntryMeta =
            serde_json::from_slice(meta).map_err(|e| CacheStoreError::Corrupt(e.to_string()))?;

        Ok(Self {
            status: meta.status,
            headers: meta.headers,
            compressed_body: body.to_vec(),
            timestamp_ms: meta.timestamp_ms,
        })
    }
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
