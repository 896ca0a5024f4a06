//! Cache-warming crawler.
//!
//! # Data Flow
//! ```text
//! start path
//!     → level N: every unvisited path, bounded by a semaphore
//!         asset extension → HEAD (warms the entry, nothing to parse)
//!         otherwise      → GET, parse CSS url(...) or HTML links
//!     → same-origin links, shuffled → level N + 1
//! ```
//!
//! The crawler only talks to the mirror's public HTTP surface; it has no
//! access to the cache itself.

pub mod links;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

pub use links::{normalize, LinkExtractor};

/// Crawl tuning.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Maximum in-flight requests.
    pub concurrency: usize,
    /// Maximum number of pages requested over the whole crawl.
    pub max_fetches: usize,
    /// Paths starting with any of these are never requested.
    pub skip_prefixes: Vec<String>,
    /// Paths ending with any of these are warmed with HEAD.
    pub asset_extensions: Vec<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            concurrency: 64,
            max_fetches: 100,
            skip_prefixes: vec!["/proxy".to_string()],
            asset_extensions: vec![".png".to_string(), ".jpg".to_string(), ".js".to_string()],
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Totals for one crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Distinct paths discovered, including skipped ones.
    pub visited: usize,
    /// Requests issued.
    pub fetched: usize,
    /// Requests that failed at the transport level.
    pub failed: usize,
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Invalid base URL: {0}")]
    BaseUrl(#[from] url::ParseError),

    #[error("Start path {0:?} is not on the mirror's origin")]
    OutsideOrigin(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid link pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Breadth-first crawler against a running mirror.
#[derive(Debug)]
pub struct Crawler {
    fetcher: Fetcher,
    options: CrawlOptions,
}

#[derive(Debug, Clone)]
struct Fetcher {
    client: reqwest::Client,
    base: Url,
    links: Arc<LinkExtractor>,
    asset_extensions: Arc<[String]>,
}

impl Crawler {
    pub fn new(base_url: &str, options: CrawlOptions) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()?;
        let fetcher = Fetcher {
            client,
            base: Url::parse(base_url)?,
            links: Arc::new(LinkExtractor::new()?),
            asset_extensions: options.asset_extensions.clone().into(),
        };
        Ok(Self { fetcher, options })
    }

    /// Crawl from `start` until no new links remain or the fetch ceiling is hit.
    pub async fn crawl(&self, start: &str) -> Result<CrawlReport, CrawlError> {
        let base = &self.fetcher.base;
        let start_path =
            normalize(base, base, start).ok_or_else(|| CrawlError::OutsideOrigin(start.to_string()))?;

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut visited = HashSet::new();
        let mut report = CrawlReport::default();
        let mut level = vec![start_path];
        let mut depth = 0usize;

        while !level.is_empty() {
            let mut tasks = JoinSet::new();

            for path in level.drain(..) {
                if !visited.insert(path.clone()) {
                    continue;
                }
                report.visited += 1;

                if self.is_skipped(&path) || report.fetched >= self.options.max_fetches {
                    continue;
                }
                report.fetched += 1;

                let fetcher = self.fetcher.clone();
                let semaphore = semaphore.clone();
                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let result = fetcher.visit(&path).await;
                    (path, result)
                });
            }

            let mut next = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, Ok(links))) => next.extend(links),
                    Ok((path, Err(e))) => {
                        report.failed += 1;
                        tracing::warn!(path = %path, error = %e, "Fetch failed");
                    }
                    Err(e) => {
                        report.failed += 1;
                        tracing::error!(error = %e, "Crawl task panicked");
                    }
                }
            }

            next.sort();
            next.dedup();
            next.retain(|path| !visited.contains(path));
            next.shuffle(&mut rand::thread_rng());

            tracing::info!(
                depth,
                fetched = report.fetched,
                discovered = next.len(),
                "Crawl level complete"
            );
            depth += 1;
            level = next;
        }

        Ok(report)
    }

    fn is_skipped(&self, path: &str) -> bool {
        self.options
            .skip_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl Fetcher {
    /// Request `path` and return the same-origin paths it references.
    async fn visit(&self, path: &str) -> Result<Vec<String>, reqwest::Error> {
        let url = match self.base.join(path) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "Unresolvable path");
                return Ok(Vec::new());
            }
        };

        if self
            .asset_extensions
            .iter()
            .any(|ext| url.path().ends_with(ext.as_str()))
        {
            let response = self.client.head(url).send().await?;
            tracing::debug!(path = %path, status = response.status().as_u16(), "Warmed asset");
            return Ok(Vec::new());
        }

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("html"));
        let is_css = url.path().ends_with(".css");
        if !is_html && !is_css {
            tracing::debug!(path = %path, status, "Warmed");
            return Ok(Vec::new());
        }

        let text = response.text().await?;
        let raw = if is_css {
            self.links.css_links(&text)
        } else {
            self.links.html_links(&text)
        };
        let found: Vec<String> = raw
            .iter()
            .filter_map(|link| normalize(&self.base, &url, link))
            .collect();

        tracing::debug!(path = %path, status, links = found.len(), "Crawled");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn serve_site(hits: Arc<AtomicUsize>) -> String {
        let count = move || {
            hits.fetch_add(1, Ordering::SeqCst);
        };
        let c1 = count.clone();
        let c2 = count.clone();
        let c3 = count.clone();
        let c4 = count.clone();
        let c5 = count;

        let app = Router::new()
            .route(
                "/",
                get(move || async move {
                    c1();
                    (
                        [(header::CONTENT_TYPE, "text/html")],
                        r#"<link href="/style.css"><a href="/about">a</a><a href="/proxy/cdn.test/x">p</a>
                           <a href="https://elsewhere.test/">e</a><img src="/logo.png">"#,
                    )
                }),
            )
            .route(
                "/about",
                get(move || async move {
                    c2();
                    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], r#"<a href="/">home</a>"#)
                }),
            )
            .route(
                "/style.css",
                get(move || async move {
                    c3();
                    ([(header::CONTENT_TYPE, "text/css")], "body { background: url('/bg.jpg') }")
                }),
            )
            .route("/logo.png", get(move || async move { c4(); "png" }))
            .route("/bg.jpg", get(move || async move { c5(); "jpg" }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn crawls_same_origin_links_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve_site(hits.clone()).await;

        let crawler = Crawler::new(&base, CrawlOptions::default()).unwrap();
        let report = crawler.crawl("/").await.unwrap();

        // /, /style.css, /about, /proxy/... (skipped), /logo.png, /bg.jpg
        assert_eq!(report.visited, 6);
        assert_eq!(report.fetched, 5);
        assert_eq!(report.failed, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn stops_at_fetch_ceiling() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve_site(hits.clone()).await;

        let options = CrawlOptions {
            max_fetches: 2,
            ..CrawlOptions::default()
        };
        let report = Crawler::new(&base, options).unwrap().crawl("/").await.unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_host_counts_failures() {
        let crawler = Crawler::new("http://127.0.0.1:1", CrawlOptions::default()).unwrap();
        let report = crawler.crawl("/").await.unwrap();
        assert_eq!(report, CrawlReport { visited: 1, fetched: 1, failed: 1 });
    }

    #[tokio::test]
    async fn rejects_foreign_start() {
        let crawler = Crawler::new("http://localhost:8000", CrawlOptions::default()).unwrap();
        let err = crawler.crawl("https://elsewhere.test/").await.unwrap_err();
        assert!(matches!(err, CrawlError::OutsideOrigin(_)));
    }
}
