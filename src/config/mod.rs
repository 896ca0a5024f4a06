//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → optional TOML file (MIRROR_CONFIG)
//!     → .env + process environment (loader.rs)
//!     → validation.rs (typed parsers, semantic checks)
//!     → MirrorConfig (validated, immutable)
//!     → handed by value/Arc to the subsystems at startup
//! ```
//!
//! # Design Decisions
//! - Config is resolved once; there is no hot reload
//! - All fields have defaults except the origin base URL
//! - Validation separates syntactic (serde/parsers) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    CacheBackendKind, CacheConfig, ListenerConfig, LogFormat, MirrorConfig, ObservabilityConfig,
    OriginConfig, RewriteConfig, ServerConfig, MANDATORY_EXCLUDED_HEADERS,
};
