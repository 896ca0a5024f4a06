//! Freshness and cache-write eligibility.

use std::time::{Duration, SystemTime};

use crate::cache::CacheEntry;
use crate::config::CacheConfig;

/// Decisions the orchestrator delegates to configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Freshness threshold. Zero means an entry never goes stale.
    pub min_age: Duration,
    /// Cache error statuses (>= 400) like any other response.
    pub cache_error_responses: bool,
    /// Serve an existing entry when the upstream transport fails.
    pub serve_stale_on_transport_error: bool,
}

impl CachePolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            min_age: Duration::from_secs(config.min_age_secs),
            cache_error_responses: config.cache_error_responses,
            serve_stale_on_transport_error: config.serve_stale_on_transport_error,
        }
    }

    /// Stale only when a threshold is set and the entry is older than it.
    pub fn is_stale(&self, entry: &CacheEntry, now: SystemTime) -> bool {
        !self.min_age.is_zero() && entry.age(now) > self.min_age
    }

    /// Whether a fetched response with `status` is written to the cache.
    pub fn is_cacheable(&self, status: u16) -> bool {
        (100..=999).contains(&status) && (self.cache_error_responses || status < 400)
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
