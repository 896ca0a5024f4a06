//! Cache-or-fetch decision for a single URL.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::body::Bytes;
use thiserror::Error;

use crate::cache::{CacheEntry, CacheStats, CacheStore};
use crate::fetch::policy::CachePolicy;
use crate::fetch::response::{MirrorResponse, ResponseSource};
use crate::rewrite::Rewriter;
use crate::upstream::{Upstream, UpstreamError, UpstreamResponse};

/// Failure to produce any response for a URL.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Combines the cache, the upstream client and the rewriter.
///
/// Constructed once at startup and shared by reference with every handler.
#[derive(Debug)]
pub struct FetchOrchestrator {
    cache: Arc<CacheStore>,
    upstream: Arc<dyn Upstream>,
    rewriter: Rewriter,
    policy: CachePolicy,
}

impl FetchOrchestrator {
    pub fn new(
        cache: Arc<CacheStore>,
        upstream: Arc<dyn Upstream>,
        rewriter: Rewriter,
        policy: CachePolicy,
    ) -> Self {
        Self {
            cache,
            upstream,
            rewriter,
            policy,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// What should be returned for `url` right now.
    pub async fn resolve(&self, url: &str) -> Result<MirrorResponse, FetchError> {
        self.resolve_at(url, SystemTime::now()).await
    }

    /// [`resolve`](Self::resolve) with an explicit clock reading.
    pub async fn resolve_at(&self, url: &str, now: SystemTime) -> Result<MirrorResponse, FetchError> {
        let hit = self.cache.lookup(url).await;
        let stats = self.cache.stats();

        let previous = match hit {
            Some(entry) if !self.policy.is_stale(&entry, now) => {
                if let Some(response) = self.serve_entry(url, entry, stats, now, ResponseSource::Cache) {
                    tracing::debug!(url = %url, age_secs = response_age(&response), "Cache hit");
                    return Ok(response);
                }
                None
            }
            other => other,
        };

        match self.upstream.fetch(url).await {
            Ok(raw) => Ok(self.store_fetched(url, raw, previous, stats, now).await),
            Err(e) => {
                if self.policy.serve_stale_on_transport_error {
                    if let Some(response) =
                        previous.and_then(|entry| self.serve_entry(url, entry, stats, now, ResponseSource::StaleFallback))
                    {
                        tracing::warn!(url = %url, error = %e, "Upstream unreachable, serving stale entry");
                        return Ok(response);
                    }
                }
                Err(e.into())
            }
        }
    }

    async fn store_fetched(
        &self,
        url: &str,
        raw: UpstreamResponse,
        previous: Option<CacheEntry>,
        stats: CacheStats,
        now: SystemTime,
    ) -> MirrorResponse {
        let status = raw.status;
        let headers = self.rewriter.rewrite_headers(raw.headers);
        let body = self.rewriter.rewrite_body(&raw.body);

        if self.policy.is_cacheable(status) {
            let entry = CacheEntry::new(status, headers.clone(), &body, now);
            self.cache.store(url, entry).await;
            return MirrorResponse::assemble(
                status,
                headers,
                Bytes::from(body),
                stats,
                Duration::ZERO,
                ResponseSource::Upstream,
            );
        }

        // Only reachable when error statuses are not cached.
        if let Some(response) = previous
            .filter(|entry| entry.status < 400)
            .and_then(|entry| self.serve_entry(url, entry, stats, now, ResponseSource::StaleFallback))
        {
            tracing::warn!(url = %url, status, "Upstream returned an error, serving previous entry");
            return response;
        }

        MirrorResponse::assemble(
            status,
            headers,
            Bytes::from(body),
            stats,
            Duration::ZERO,
            ResponseSource::Uncached,
        )
    }

    fn serve_entry(
        &self,
        url: &str,
        entry: CacheEntry,
        stats: CacheStats,
        now: SystemTime,
        source: ResponseSource,
    ) -> Option<MirrorResponse> {
        match entry.body() {
            Ok(body) => Some(MirrorResponse::assemble(
                entry.status,
                entry.headers.clone(),
                Bytes::from(body),
                stats,
                entry.age(now),
                source,
            )),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Cached body unreadable, ignoring entry");
                None
            }
        }
    }
}

fn response_age(response: &MirrorResponse) -> &str {
    response.header(crate::fetch::response::X_CACHE_AGE).unwrap_or("0")
}
