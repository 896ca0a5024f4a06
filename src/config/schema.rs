//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the mirror.
//! All types derive Serde traits so a TOML file can seed them before the
//! environment overlay in `loader.rs` is applied.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Headers that are always stripped from upstream responses.
///
/// Their values stop being valid once the body is rewritten and re-framed.
pub const MANDATORY_EXCLUDED_HEADERS: [&str; 5] = [
    "content-encoding",
    "content-length",
    "content-security-policy",
    "connection",
    "transfer-encoding",
];

/// Root configuration for the mirror.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MirrorConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The mirrored origin and how to talk to it.
    pub origin: OriginConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Body and header rewriting.
    pub rewrite: RewriteConfig,

    /// Inbound server behaviour.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Upstream origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Base URL of the mirrored origin (required).
    pub base_url: String,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total time allowed for one upstream request in seconds.
    pub request_timeout_secs: u64,

    /// How long idle pooled connections are kept open.
    pub pool_idle_timeout_secs: u64,

    /// Attempts per fetch when the transport fails (1 = no retry).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            pool_idle_timeout_secs: 90,
            max_attempts: 2,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Storage engine behind the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// Persistent sled tree on disk.
    Sled,
    /// Process-local map, lost on restart.
    Memory,
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Storage engine.
    pub backend: CacheBackendKind,

    /// Directory of the sled database.
    pub path: String,

    /// Freshness threshold in seconds. 0 means entries never go stale.
    pub min_age_secs: u64,

    /// Cache responses with status >= 400 like any other response.
    ///
    /// When disabled, an error response falls back to the previous
    /// entry for the key if there is one.
    pub cache_error_responses: bool,

    /// Serve an existing entry, whatever its age, when the origin is unreachable.
    pub serve_stale_on_transport_error: bool,

    /// Interval between background flushes of the sled log.
    pub flush_every_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Sled,
            path: ".cache".to_string(),
            min_age_secs: 3600,
            cache_error_responses: true,
            serve_stale_on_transport_error: false,
            flush_every_ms: 500,
        }
    }
}

/// Rewriting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Identity substituted for the origin base URL. Empty disables body rewriting.
    pub replace: String,

    /// First path segment of the third-party proxy route.
    pub proxy_prefix: String,

    /// Third-party origins routed through the proxy prefix.
    pub proxy_sites: BTreeSet<String>,

    /// Third-party origins answered with an empty 204 instead of being fetched.
    pub bypass_sites: BTreeSet<String>,

    /// Extra header names to strip, on top of [`MANDATORY_EXCLUDED_HEADERS`].
    pub excluded_headers: BTreeSet<String>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            replace: String::new(),
            proxy_prefix: "proxy".to_string(),
            proxy_sites: BTreeSet::new(),
            bypass_sites: BTreeSet::new(),
            excluded_headers: BTreeSet::new(),
        }
    }
}

impl RewriteConfig {
    /// Configured exclusions plus the mandatory set, lowercased.
    pub fn effective_excluded_headers(&self) -> BTreeSet<String> {
        self.excluded_headers
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .chain(MANDATORY_EXCLUDED_HEADERS.iter().map(|h| h.to_string()))
            .collect()
    }

    /// The proxy subpath route is only mounted when there is something to route.
    pub fn proxy_route_enabled(&self) -> bool {
        !self.replace.is_empty() && !self.proxy_sites.is_empty()
    }
}

/// Inbound server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Request timeout (total time for request/response) in seconds.
    /// Must exceed the worst-case upstream fetch, retries included.
    pub request_timeout_secs: u64,

    /// Answer CORS preflights and tag responses for any origin.
    pub cors_enabled: bool,

    /// Brotli-compress responses for clients that accept it.
    pub compression_enabled: bool,

    /// Put the error chain in 500 bodies. Debugging aid only.
    pub expose_error_detail: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 90,
            cors_enabled: true,
            compression_enabled: true,
            expose_error_detail: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mandatory_headers_always_excluded() {
        let mut rewrite = RewriteConfig::default();
        rewrite.excluded_headers.insert("X-Frame-Options".to_string());

        let excluded = rewrite.effective_excluded_headers();
        assert!(excluded.contains("x-frame-options"));
        for header in MANDATORY_EXCLUDED_HEADERS {
            assert!(excluded.contains(header), "{header} missing");
        }
    }

    #[test]
    fn proxy_route_needs_replacement_and_sites() {
        let mut rewrite = RewriteConfig::default();
        assert!(!rewrite.proxy_route_enabled());

        rewrite.proxy_sites.insert("https://cdn.other.com".to_string());
        assert!(!rewrite.proxy_route_enabled());

        rewrite.replace = "https://mirror.test".to_string();
        assert!(rewrite.proxy_route_enabled());
    }

    #[test]
    fn toml_sections_fill_defaults() {
        let config: MirrorConfig = toml::from_str(
            r#"
            [origin]
            base_url = "http://example.com"

            [cache]
            backend = "memory"
            min_age_secs = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.origin.base_url, "http://example.com");
        assert_eq!(config.origin.max_attempts, 2);
        assert_eq!(config.cache.backend, CacheBackendKind::Memory);
        assert_eq!(config.cache.min_age_secs, 0);
        assert_eq!(config.rewrite.proxy_prefix, "proxy");
    }
}
