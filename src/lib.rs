//! Caching, rewriting mirror of a single HTTP origin.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod rewrite;
pub mod upstream;

pub use config::schema::MirrorConfig;
pub use fetch::FetchOrchestrator;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
