//! Fetch orchestration subsystem.
//!
//! # State Machine
//! ```text
//! resolve(url)
//!     → CacheStore::get            (hit/miss counted)
//!     → fresh?  ── yes ──▶ serve entry, age = now - written
//!        │ no / absent
//!        ▼
//!     Upstream::fetch
//!        ├─ Ok  → rewrite headers + body
//!        │        → cacheable? ── yes ──▶ CacheStore::set, age = 0
//!        │                      └─ no ───▶ previous good entry, else serve uncached
//!        └─ Err → stale-on-error policy? ── entry ──▶ serve it
//!                                          └─ otherwise FetchError
//! ```
//!
//! # Design Decisions
//! - No single-flight: concurrent misses both fetch, last write wins
//! - Diagnostic headers carry the counters as read right after the lookup
//! - Nothing is awaited between encoding an entry and storing it

pub mod orchestrator;
pub mod policy;
pub mod response;

pub use orchestrator::{FetchError, FetchOrchestrator};
pub use policy::CachePolicy;
pub use response::{MirrorResponse, ResponseSource, X_CACHE_AGE, X_CACHE_HITS, X_CACHE_MISSES};
