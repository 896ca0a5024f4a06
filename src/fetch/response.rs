//! The assembled answer for one URL.

use std::time::Duration;

use axum::body::Bytes;

use crate::cache::CacheStats;

pub const X_CACHE_HITS: &str = "x-cache-hits";
pub const X_CACHE_MISSES: &str = "x-cache-misses";
pub const X_CACHE_AGE: &str = "x-cache-age";

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fresh cache entry.
    Cache,
    /// Fetched now and written to the cache.
    Upstream,
    /// Fetched now but not eligible for caching.
    Uncached,
    /// An older entry served because the fetch did not produce a usable answer.
    StaleFallback,
}

/// Status, headers and body ready for the transport layer.
#[derive(Debug, Clone)]
pub struct MirrorResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl MirrorResponse {
    /// Attach the diagnostic headers to a response.
    pub fn assemble(
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
        stats: CacheStats,
        age: Duration,
        source: ResponseSource,
    ) -> Self {
        Self {
            status,
            headers: merge_headers(headers, diagnostic_headers(stats, age)),
            body,
            source,
        }
    }

    /// First value of `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// `x-cache-hits`, `x-cache-misses` and `x-cache-age` (whole seconds).
pub fn diagnostic_headers(stats: CacheStats, age: Duration) -> Vec<(String, String)> {
    vec![
        (X_CACHE_HITS.to_string(), stats.hits.to_string()),
        (X_CACHE_MISSES.to_string(), stats.misses.to_string()),
        (X_CACHE_AGE.to_string(), format!("{}", age.as_secs_f64().round() as u64)),
    ]
}

/// Append `extra` headers whose names `own` does not already carry.
pub fn merge_headers(mut own: Vec<(String, String)>, extra: Vec<(String, String)>) -> Vec<(String, String)> {
    for (name, value) in extra {
        if !own.iter().any(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            own.push((name, value));
        }
    }
    own
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_rounds_to_whole_seconds() {
        let stats = CacheStats { hits: 3, misses: 1 };
        let headers = diagnostic_headers(stats, Duration::from_millis(2_600));
        assert_eq!(
            headers,
            vec![
                ("x-cache-hits".to_string(), "3".to_string()),
                ("x-cache-misses".to_string(), "1".to_string()),
                ("x-cache-age".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn own_headers_take_precedence() {
        let own = vec![("X-Cache-Age".to_string(), "upstream".to_string())];
        let merged = merge_headers(own, diagnostic_headers(CacheStats::default(), Duration::ZERO));
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], ("X-Cache-Age".to_string(), "upstream".to_string()));
    }
}
