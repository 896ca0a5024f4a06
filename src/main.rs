//! Mirror Proxy
//!
//! Serves a single origin through a persistent cache, rewriting bodies and
//! redirects so the origin's identity is replaced by the mirror's.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────┐
//!                       │                   MIRROR PROXY                   │
//!    Client Request     │  ┌──────────┐    ┌──────────────────────┐        │
//!    ───────────────────┼─▶│   http   │───▶│   FetchOrchestrator  │        │
//!                       │  │ handlers │    │  fresh? serve cache  │        │
//!                       │  └──────────┘    │  else fetch+rewrite  │        │
//!                       │                  └───┬────────┬─────┬───┘        │
//!                       │                      │        │     │            │
//!                       │               ┌──────▼─┐ ┌────▼───┐ │            │
//!                       │               │ cache  │ │rewrite │ │            │
//!                       │               │ (sled) │ │        │ │            │
//!                       │               └────────┘ └────────┘ │            │
//!                       │                             ┌───────▼───────┐    │   Origin
//!                       │                             │   upstream    │────┼──▶ Server
//!                       │                             └───────────────┘    │
//!                       │  config · observability · resilience · lifecycle │
//!                       └──────────────────────────────────────────────────┘
//! ```

use tokio::net::TcpListener;

use mirror_proxy::config::{self, ObservabilityConfig};
use mirror_proxy::http::HttpServer;
use mirror_proxy::lifecycle::{self, Shutdown};
use mirror_proxy::observability::{logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match config::load_from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(2);
        }
    };
    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mirror-proxy starting");
    tracing::info!(
        origin = %config.origin.base_url,
        bind_address = %config.listener.bind_address,
        cache_backend = ?config.cache.backend,
        min_age_secs = config.cache.min_age_secs,
        rewriting = !config.rewrite.replace.is_empty(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let signals = lifecycle::spawn_signal_listener(shutdown.clone());
    server.run(listener, shutdown.subscribe()).await?;
    signals.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
