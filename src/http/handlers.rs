//! Request handlers: map inbound paths onto [`FetchOrchestrator::resolve`].
//!
//! HEAD is served by the same handlers; axum strips the body and keeps the
//! status and headers.

use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::Response;
use url::Url;

use crate::config::MirrorConfig;
use crate::fetch::{FetchOrchestrator, MirrorResponse, ResponseSource};
use crate::http::error::AppError;
use crate::http::request::request_id;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Inbound URL to upstream URL mapping.
#[derive(Debug, Clone)]
pub struct Dispatch {
    base_url: Url,
    bypass_sites: Vec<String>,
    expose_error_detail: bool,
}

impl Dispatch {
    pub fn from_config(config: &MirrorConfig) -> Result<Self, url::ParseError> {
        Ok(Self {
            base_url: Url::parse(&config.origin.base_url)?,
            bypass_sites: config.rewrite.bypass_sites.iter().cloned().collect(),
            expose_error_detail: config.server.expose_error_detail,
        })
    }

    /// Resolve an inbound path and query against the origin base URL.
    ///
    /// The result is the cache key. Paths that would leave the origin are rejected.
    pub fn origin_url(&self, uri: &Uri) -> Result<String, AppError> {
        let relative = match uri.query() {
            Some(query) => format!("{}?{query}", uri.path().trim_start_matches('/')),
            None => uri.path().trim_start_matches('/').to_string(),
        };
        let url = self
            .base_url
            .join(&relative)
            .map_err(|e| AppError::BadRequest(format!("cannot resolve {:?}: {e}", uri.path())))?;

        if url.origin() != self.base_url.origin() {
            return Err(AppError::BadRequest(format!(
                "path {:?} resolves outside the mirrored origin",
                uri.path()
            )));
        }
        Ok(url.into())
    }

    /// Whether a proxy subpath targets a bypassed origin.
    pub fn is_bypassed(&self, path: &str) -> bool {
        self.bypass_sites.iter().any(|site| path.starts_with(site.as_str()))
    }

    pub fn expose_error_detail(&self) -> bool {
        self.expose_error_detail
    }
}

/// Absolute URL for a proxy subpath. Bare hosts are fetched over https.
pub fn external_url(path: &str, query: Option<&str>) -> String {
    let mut url = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("https://{path}")
    };
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// `GET|HEAD /` and `GET|HEAD /{*path}`.
pub async fn origin(State(state): State<AppState>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    let start = Instant::now();
    let result = match state.dispatch.origin_url(&uri) {
        Ok(url) => resolve(&state.orchestrator, &url).await,
        Err(e) => Err(e),
    };
    finish(&state, &method, &uri, &headers, start, result)
}

/// `GET|HEAD /{prefix}/{*rest}`.
pub async fn proxied(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let start = Instant::now();
    let result = if state.dispatch.is_bypassed(&rest) {
        tracing::debug!(request_id = %request_id(&headers), path = %rest, "Bypassed origin");
        let stats = state.orchestrator.cache().stats();
        to_http(MirrorResponse::assemble(
            StatusCode::NO_CONTENT.as_u16(),
            Vec::new(),
            Bytes::new(),
            stats,
            Duration::ZERO,
            ResponseSource::Uncached,
        ))
    } else {
        resolve(&state.orchestrator, &external_url(&rest, uri.query())).await
    };
    finish(&state, &method, &uri, &headers, start, result)
}

async fn resolve(orchestrator: &FetchOrchestrator, url: &str) -> Result<Response, AppError> {
    let mirrored = orchestrator.resolve(url).await?;
    tracing::debug!(url = %url, status = mirrored.status, source = ?mirrored.source, "Resolved");
    to_http(mirrored)
}

fn finish(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    start: Instant,
    result: Result<Response, AppError>,
) -> Response {
    let response = match result {
        Ok(response) => response,
        Err(e) => {
            if e.status().is_server_error() {
                tracing::error!(request_id = %request_id(headers), path = %uri.path(), error = %e, "Request failed");
            } else {
                tracing::warn!(request_id = %request_id(headers), path = %uri.path(), error = %e, "Request rejected");
            }
            e.render(state.dispatch.expose_error_detail())
        }
    };
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

fn to_http(mirrored: MirrorResponse) -> Result<Response, AppError> {
    let status = StatusCode::from_u16(mirrored.status)
        .map_err(|e| AppError::Internal(format!("unusable status {}: {e}", mirrored.status)))?;

    let mut response = Response::new(Body::from(mirrored.body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in &mirrored.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!(header = %name, "Dropping header that is not valid HTTP"),
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatch(base_url: &str, bypass: &[&str]) -> Dispatch {
        let mut config = MirrorConfig::default();
        config.origin.base_url = base_url.to_string();
        config.rewrite.bypass_sites = bypass.iter().map(|s| s.to_string()).collect();
        Dispatch::from_config(&config).unwrap()
    }

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn resolves_paths_against_origin() {
        let d = dispatch("http://example.com", &[]);
        assert_eq!(d.origin_url(&uri("/")).unwrap(), "http://example.com/");
        assert_eq!(d.origin_url(&uri("/index.html")).unwrap(), "http://example.com/index.html");
        assert_eq!(d.origin_url(&uri("/a/b?x=1&y=2")).unwrap(), "http://example.com/a/b?x=1&y=2");
    }

    #[test]
    fn keeps_base_path_directory() {
        let d = dispatch("http://example.com/docs/", &[]);
        assert_eq!(d.origin_url(&uri("/guide.html")).unwrap(), "http://example.com/docs/guide.html");
    }

    #[test]
    fn rejects_paths_leaving_origin() {
        let d = dispatch("http://example.com", &[]);
        let err = d.origin_url(&uri("/http://evil.test/x")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn bypass_matches_prefix() {
        let d = dispatch("http://example.com", &["assets.cdn.other.com"]);
        assert!(d.is_bypassed("assets.cdn.other.com/x.js"));
        assert!(!d.is_bypassed("cdn.other.com/x.js"));
    }

    #[test]
    fn external_urls() {
        assert_eq!(external_url("cdn.other.com/a.png", None), "https://cdn.other.com/a.png");
        assert_eq!(external_url("cdn.other.com/a.png", Some("")), "https://cdn.other.com/a.png");
        assert_eq!(
            external_url("http://cdn.other.com/a.js", Some("v=1")),
            "http://cdn.other.com/a.js?v=1"
        );
    }

    #[test]
    fn invalid_header_values_are_dropped() {
        let mirrored = MirrorResponse {
            status: 200,
            headers: vec![
                ("bad header".to_string(), "x".to_string()),
                ("x-ok".to_string(), "yes".to_string()),
            ],
            body: Bytes::from_static(b"hi"),
            source: ResponseSource::Upstream,
        };
        let response = to_http(mirrored).unwrap();
        assert_eq!(response.headers().len(), 1);
        assert_eq!(response.headers()["x-ok"], "yes");
    }
}
