//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{CacheBackendKind, LogFormat, MirrorConfig};
use crate::config::validation::{parse_bool, parse_set, parse_u64, validate_config, ValidationError};

/// Environment variable naming an optional TOML file to start from.
pub const CONFIG_FILE_ENV: &str = "MIRROR_CONFIG";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid setting {0}")]
    Invalid(ValidationError),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<MirrorConfig, ConfigError> {
    let config = read_file(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Resolve the process configuration.
///
/// Defaults, then the TOML file named by `MIRROR_CONFIG`, then `.env`,
/// then the process environment.
pub fn load_from_env() -> Result<MirrorConfig, ConfigError> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    let mut config = match std::env::var(CONFIG_FILE_ENV) {
        Ok(path) if !path.trim().is_empty() => read_file(Path::new(path.trim()))?,
        _ => MirrorConfig::default(),
    };

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<MirrorConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Overlay environment values onto `config`.
///
/// `lookup` abstracts the environment so callers can supply a fixed map.
pub fn apply_env<F>(config: &mut MirrorConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let invalid = ConfigError::Invalid;

    if let Some(v) = lookup("BASEURL") {
        config.origin.base_url = v.trim().to_string();
    }
    if let Some(v) = lookup("MIN_AGE") {
        config.cache.min_age_secs = parse_u64("MIN_AGE", &v).map_err(invalid)?;
    }
    if let Some(v) = lookup("EXCLUDED_HEADERS") {
        config.rewrite.excluded_headers = parse_set("EXCLUDED_HEADERS", &v).map_err(invalid)?;
    }
    if let Some(v) = lookup("REPLACE") {
        config.rewrite.replace = v.trim().to_string();
    }
    if let Some(v) = lookup("PROXY_SLUG") {
        config.rewrite.proxy_prefix = v.trim().trim_matches('/').to_string();
    }
    if let Some(v) = lookup("PROXY_SITES") {
        config.rewrite.proxy_sites = parse_set("PROXY_SITES", &v).map_err(invalid)?;
    }
    if let Some(v) = lookup("BYPASS_SITES") {
        config.rewrite.bypass_sites = parse_set("BYPASS_SITES", &v).map_err(invalid)?;
    }
    if let Some(v) = lookup("LISTEN") {
        config.listener.bind_address = v.trim().to_string();
    }
    if let Some(v) = lookup("CACHE_DIR") {
        config.cache.path = v.trim().to_string();
    }
    if let Some(v) = lookup("CACHE_BACKEND") {
        config.cache.backend = match v.trim().to_ascii_lowercase().as_str() {
            "sled" => CacheBackendKind::Sled,
            "memory" => CacheBackendKind::Memory,
            other => {
                return Err(invalid(ValidationError::new(
                    "CACHE_BACKEND",
                    format!("expected \"sled\" or \"memory\", got {other:?}"),
                )))
            }
        };
    }
    if let Some(v) = lookup("CACHE_ERROR_RESPONSES") {
        config.cache.cache_error_responses = parse_bool("CACHE_ERROR_RESPONSES", &v).map_err(invalid)?;
    }
    if let Some(v) = lookup("SERVE_STALE_ON_ERROR") {
        config.cache.serve_stale_on_transport_error =
            parse_bool("SERVE_STALE_ON_ERROR", &v).map_err(invalid)?;
    }
    if let Some(v) = lookup("DEBUG_ERRORS") {
        config.server.expose_error_detail = parse_bool("DEBUG_ERRORS", &v).map_err(invalid)?;
    }
    if let Some(v) = lookup("LOG_LEVEL") {
        config.observability.log_level = v.trim().to_ascii_lowercase();
    }
    if let Some(v) = lookup("LOG_FORMAT") {
        config.observability.log_format = match v.trim().to_ascii_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => {
                return Err(invalid(ValidationError::new(
                    "LOG_FORMAT",
                    format!("expected \"pretty\" or \"json\", got {other:?}"),
                )))
            }
        };
    }
    if let Some(v) = lookup("METRICS_ADDRESS") {
        config.observability.metrics_enabled = !v.trim().is_empty();
        config.observability.metrics_address = v.trim().to_string();
    }

    Ok(())
}
