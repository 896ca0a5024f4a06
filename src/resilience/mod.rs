//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream fetch:
//!     → reqwest timeouts (connect + whole request)
//!     → On transport failure: backoff.rs decides whether and when to retry
//! ```
//!
//! # Design Decisions
//! - Every upstream call has a deadline
//! - Only transport failures are retried; any HTTP status is an answer
//! - Jittered backoff prevents thundering herd

pub mod backoff;

pub use backoff::{calculate_backoff, RetryPolicy};
