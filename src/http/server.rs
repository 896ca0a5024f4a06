//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared [`FetchOrchestrator`] from configuration
//! - Create the Axum router (origin catch-all, optional proxy subpath)
//! - Wire up middleware (request ID, tracing, timeout, CORS, compression)
//! - Serve until shutdown, then flush the cache

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::cache::{CacheStore, CacheStoreError};
use crate::config::MirrorConfig;
use crate::fetch::{CachePolicy, FetchOrchestrator};
use crate::http::handlers::{self, Dispatch};
use crate::http::request::{request_id, UuidRequestId, X_REQUEST_ID};
use crate::rewrite::Rewriter;
use crate::upstream::{HttpUpstream, Upstream};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<FetchOrchestrator>,
    pub dispatch: Arc<Dispatch>,
}

/// Failure to assemble the server at startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to open cache: {0}")]
    Cache(#[from] CacheStoreError),

    #[error("Failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid origin base URL: {0}")]
    BaseUrl(#[from] url::ParseError),
}

/// HTTP server for the mirror.
pub struct HttpServer {
    router: Router,
    orchestrator: Arc<FetchOrchestrator>,
    config: MirrorConfig,
}

impl HttpServer {
    /// Open the configured cache and upstream client and build the router.
    pub fn new(config: MirrorConfig) -> Result<Self, ServerError> {
        let cache = Arc::new(CacheStore::from_config(&config.cache)?);
        let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(&config.origin)?);
        Self::with_parts(config, cache, upstream)
    }

    /// Build the server around an existing cache and upstream.
    pub fn with_parts(
        config: MirrorConfig,
        cache: Arc<CacheStore>,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Self, ServerError> {
        let orchestrator = Arc::new(FetchOrchestrator::new(
            cache,
            upstream,
            Rewriter::from_config(&config),
            CachePolicy::from_config(&config.cache),
        ));
        let state = AppState {
            orchestrator: orchestrator.clone(),
            dispatch: Arc::new(Dispatch::from_config(&config)?),
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            orchestrator,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &MirrorConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/", get(handlers::origin))
            .route("/{*path}", get(handlers::origin));

        if config.rewrite.proxy_route_enabled() {
            let proxy_path = format!("/{}/{{*rest}}", config.rewrite.proxy_prefix);
            tracing::info!(route = %proxy_path, "Proxy subpath enabled");
            router = router.route(&proxy_path, get(handlers::proxied));
        }

        let mut router = router.with_state(state);

        if config.server.compression_enabled {
            router = router.layer(CompressionLayer::new());
        }
        if config.server.cors_enabled {
            let mut cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::HEAD]);
            if config.cache.min_age_secs > 0 {
                cors = cors.max_age(Duration::from_secs(config.cache.min_age_secs));
            }
            router = router.layer(cors);
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id(request.headers())
                    )
                }))
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                // Outlives the upstream budget (checked by validation); if it still
                // fires, answer like any other failed fetch.
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Duration::from_secs(config.server.request_timeout_secs),
                )),
        )
    }

    /// The assembled router, for serving on a custom listener or in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn orchestrator(&self) -> &Arc<FetchOrchestrator> {
        &self.orchestrator
    }

    /// Run the server until `shutdown` fires, then flush the cache.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            origin = %self.config.origin.base_url,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Draining connections");
            })
            .await?;

        self.orchestrator.cache().flush();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }
}
