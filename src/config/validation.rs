//! Configuration validation.
//!
//! # Responsibilities
//! - Typed parsers for raw environment strings (integers, booleans, sets)
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Keep the server timeout above the worst-case upstream fetch
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MirrorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Raw values are parsed, never evaluated

use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use axum::http::HeaderName;
use url::Url;

use crate::config::schema::MirrorConfig;
use crate::resilience::RetryPolicy;

/// A single rejected setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Setting name as the operator wrote it (env key or dotted path).
    pub key: String,
    /// Why it was rejected.
    pub reason: String,
}

impl ValidationError {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// Parse a non-negative integer such as a number of seconds.
pub fn parse_u64(key: &str, raw: &str) -> Result<u64, ValidationError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| ValidationError::new(key, format!("expected a non-negative integer, got {raw:?} ({e})")))
}

/// Parse a boolean flag.
pub fn parse_bool(key: &str, raw: &str) -> Result<bool, ValidationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ValidationError::new(key, format!("expected a boolean, got {raw:?}"))),
    }
}

/// Parse a set of strings.
///
/// Accepts a JSON array of strings (`["a", "b"]`) or a comma-separated list
/// (`a, b`). Blank input is the empty set.
pub fn parse_set(key: &str, raw: &str) -> Result<BTreeSet<String>, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(BTreeSet::new());
    }

    let items: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)
            .map_err(|e| ValidationError::new(key, format!("invalid JSON string array: {e}")))?
    } else {
        trimmed.split(',').map(str::to_string).collect()
    };

    let mut set = BTreeSet::new();
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            return Err(ValidationError::new(key, "empty entry in set"));
        }
        set.insert(item.to_string());
    }
    Ok(set)
}

/// Semantic checks over a fully assembled configuration.
pub fn validate_config(config: &MirrorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.origin.base_url.trim().is_empty() {
        errors.push(ValidationError::new("BASEURL", "origin base URL is required"));
    } else {
        match Url::parse(&config.origin.base_url) {
            Ok(url) if !matches!(url.scheme(), "http" | "https") => errors.push(ValidationError::new(
                "BASEURL",
                format!("unsupported scheme {:?}", url.scheme()),
            )),
            Ok(url) if url.host_str().is_none() => {
                errors.push(ValidationError::new("BASEURL", "origin base URL has no host"))
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::new("BASEURL", format!("not an absolute URL: {e}"))),
        }
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "LISTEN",
            format!("invalid socket address {:?}", config.listener.bind_address),
        ));
    }

    let prefix = &config.rewrite.proxy_prefix;
    if prefix.is_empty() || prefix.contains('/') {
        errors.push(ValidationError::new(
            "PROXY_SLUG",
            format!("must be a single non-empty path segment, got {prefix:?}"),
        ));
    }

    for name in &config.rewrite.excluded_headers {
        if HeaderName::from_bytes(name.trim().to_ascii_lowercase().as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "EXCLUDED_HEADERS",
                format!("invalid header name {name:?}"),
            ));
        }
    }

    for (key, sites) in [
        ("PROXY_SITES", &config.rewrite.proxy_sites),
        ("BYPASS_SITES", &config.rewrite.bypass_sites),
    ] {
        if sites.iter().any(|s| s.trim().is_empty()) {
            errors.push(ValidationError::new(key, "empty origin in set"));
        }
    }

    for (key, value) in [
        ("origin.connect_timeout_secs", config.origin.connect_timeout_secs),
        ("origin.request_timeout_secs", config.origin.request_timeout_secs),
        ("server.request_timeout_secs", config.server.request_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(key, "must be greater than zero"));
        }
    }

    if config.origin.max_attempts == 0 {
        errors.push(ValidationError::new("origin.max_attempts", "must be at least 1"));
    }

    let fetch_budget = RetryPolicy::from_config(&config.origin)
        .worst_case(Duration::from_secs(config.origin.request_timeout_secs));
    if config.server.request_timeout_secs > 0
        && Duration::from_secs(config.server.request_timeout_secs) <= fetch_budget
    {
        errors.push(ValidationError::new(
            "server.request_timeout_secs",
            format!(
                "must exceed the upstream budget of {:.1}s (origin.max_attempts x origin.request_timeout_secs plus backoff)",
                fetch_budget.as_secs_f64()
            ),
        ));
    }

    if !matches!(
        config.observability.log_level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ValidationError::new(
            "LOG_LEVEL",
            format!("unknown level {:?}", config.observability.log_level),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "METRICS_ADDRESS",
            format!("invalid socket address {:?}", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
