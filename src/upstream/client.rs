//! HTTP client for the mirrored origin and proxied third-party origins.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::redirect::Policy;
use thiserror::Error;
use url::Url;

use crate::config::OriginConfig;
use crate::observability::metrics;
use crate::resilience::RetryPolicy;

/// A fully buffered upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    /// Header pairs in wire order, names lowercased.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Transport-level failure talking to an upstream.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("transport error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed reading body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl UpstreamError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::InvalidUrl { .. } => "invalid_url",
            UpstreamError::Timeout { .. } => "timeout",
            UpstreamError::Transport { .. } => "transport",
            UpstreamError::Body { .. } => "body",
        }
    }

    fn is_retryable(&self) -> bool {
        !matches!(self, UpstreamError::InvalidUrl { .. })
    }
}

/// Something that can fetch a URL.
#[async_trait]
pub trait Upstream: Send + Sync + fmt::Debug {
    /// GET `url` and buffer the whole response.
    ///
    /// Any HTTP status is a successful fetch; only transport failures are errors.
    async fn fetch(&self, url: &str) -> Result<UpstreamResponse, UpstreamError>;
}

/// Pooled HTTP/1.1 + HTTP/2 client (HTTP/2 negotiated over rustls ALPN).
///
/// Redirects are returned to the caller rather than followed, and bodies are
/// not transparently decompressed.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpUpstream {
    pub fn new(config: &OriginConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .user_agent(concat!("mirror-proxy/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            retry: RetryPolicy::from_config(config),
        })
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_once(&self, url: &Url) -> Result<UpstreamResponse, UpstreamError> {
        let classify = |source: reqwest::Error| {
            if source.is_timeout() {
                UpstreamError::Timeout { url: url.to_string() }
            } else {
                UpstreamError::Transport {
                    url: url.to_string(),
                    source,
                }
            }
        };

        let response = self.client.get(url.clone()).send().await.map_err(classify)?;

        let status = response.status().as_u16();
        // Values carrying obs-text are dropped whole; a lossy copy would
        // replay a different value than the origin sent.
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| match value.to_str() {
                Ok(text) => Some((name.as_str().to_string(), text.to_string())),
                Err(_) => {
                    tracing::debug!(url = %url, header = %name, "Dropping non-ASCII upstream header value");
                    None
                }
            })
            .collect();

        let body = response.bytes().await.map_err(|source| {
            if source.is_timeout() {
                UpstreamError::Timeout { url: url.to_string() }
            } else {
                UpstreamError::Body {
                    url: url.to_string(),
                    source,
                }
            }
        })?;

        Ok(UpstreamResponse { status, headers, body })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, url: &str) -> Result<UpstreamResponse, UpstreamError> {
        let parsed = Url::parse(url).map_err(|e| UpstreamError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(UpstreamError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {:?}", parsed.scheme()),
            });
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let start = Instant::now();
            tracing::info!(url = %parsed, attempt, "Fetching upstream");

            match self.fetch_once(&parsed).await {
                Ok(response) => {
                    metrics::record_upstream_response(response.status, start);
                    tracing::info!(
                        url = %parsed,
                        status = response.status,
                        bytes = response.body.len(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Upstream responded"
                    );
                    for (name, value) in &response.headers {
                        tracing::debug!(url = %parsed, header = %name, value = %value, "Upstream header");
                    }
                    return Ok(response);
                }
                Err(e) => {
                    metrics::record_upstream_error(e.kind());
                    if e.is_retryable() && self.retry.should_retry(attempt) {
                        let delay = self.retry.delay(attempt);
                        tracing::warn!(url = %parsed, attempt, delay = ?delay, error = %e, "Retrying upstream fetch");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    tracing::error!(url = %parsed, attempt, error = %e, "Upstream fetch failed");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn origin_config() -> OriginConfig {
        OriginConfig {
            base_url: "http://127.0.0.1".to_string(),
            request_timeout_secs: 2,
            ..OriginConfig::default()
        }
    }

    async fn serve_once(raw: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(raw).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/page")
    }

    #[tokio::test]
    async fn redirects_are_not_followed() {
        let url = serve_once(
            b"HTTP/1.1 302 Found\r\nLocation: http://127.0.0.1:1/elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let upstream = HttpUpstream::new(&origin_config()).unwrap();

        let response = upstream.fetch(&url).await.unwrap();
        assert_eq!(response.status, 302);
        assert!(response
            .headers
            .iter()
            .any(|(k, v)| k == "location" && v == "http://127.0.0.1:1/elsewhere"));
    }

    #[tokio::test]
    async fn error_statuses_are_responses() {
        let url = serve_once(
            b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\ndown",
        )
        .await;
        let upstream = HttpUpstream::new(&origin_config()).unwrap();

        let response = upstream.fetch(&url).await.unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(&response.body[..], b"down");
    }

    #[tokio::test]
    async fn non_ascii_header_values_are_dropped() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nX-Title: caf\xe9\r\nX-Plain: ok\r\nContent-Length: 2\r\nConnection: close\r\n\r\nhi",
        )
        .await;
        let upstream = HttpUpstream::new(&origin_config()).unwrap();

        let response = upstream.fetch(&url).await.unwrap();
        assert_eq!(response.status, 200);
        assert!(!response.headers.iter().any(|(k, _)| k == "x-title"));
        assert!(response.headers.iter().any(|(k, v)| k == "x-plain" && v == "ok"));
        assert_eq!(&response.body[..], b"hi");
    }

    #[tokio::test]
    async fn silent_origin_times_out_on_every_attempt() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let seen = accepted.clone();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                seen.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });

        let config = OriginConfig {
            request_timeout_secs: 1,
            max_attempts: 2,
            base_delay_ms: 10,
            ..origin_config()
        };
        let upstream = HttpUpstream::new(&config).unwrap();
        let err = upstream.fetch(&format!("http://{addr}/slow")).await.unwrap_err();

        assert!(matches!(err, UpstreamError::Timeout { .. }), "{err:?}");
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let upstream = HttpUpstream::new(&origin_config())
            .unwrap()
            .with_retry(RetryPolicy::none());
        let err = upstream.fetch(&format!("http://{addr}/")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Transport { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let upstream = HttpUpstream::new(&origin_config()).unwrap();
        let err = upstream.fetch("ftp://example.com/file").await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidUrl { .. }));
        let err = upstream.fetch("cdn.other.com/a.png").await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidUrl { .. }));
    }
}
