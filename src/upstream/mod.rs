//! Upstream access.
//!
//! # Data Flow
//! ```text
//! FetchOrchestrator
//!     → Upstream::fetch(url)
//!     → client.rs (pooled reqwest client, retry on transport failure)
//!     → UpstreamResponse { status, headers, body }  or  UpstreamError
//! ```

pub mod client;

pub use client::{HttpUpstream, Upstream, UpstreamError, UpstreamResponse};
