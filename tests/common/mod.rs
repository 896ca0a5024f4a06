//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use mirror_proxy::config::{CacheBackendKind, MirrorConfig};
use mirror_proxy::http::HttpServer;
use mirror_proxy::lifecycle::Shutdown;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// What the mock origin sends back for one request.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// A running mock origin.
pub struct MockOrigin {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockOrigin {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Request lines seen so far, as `"METHOD /path?query"`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// Start a programmable origin on an ephemeral port.
///
/// `f` receives the request target (path and query) and decides the reply.
pub async fn start_programmable_origin<F>(f: F) -> MockOrigin
where
    F: Fn(&str) -> MockReply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let seen = requests.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let seen = seen.clone();
                    tokio::spawn(async move {
                        let mut buf = Vec::new();
                        let mut chunk = [0u8; 1024];
                        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                            }
                        }

                        let head = String::from_utf8_lossy(&buf).to_string();
                        let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
                        let method = request_line.next().unwrap_or_default().to_string();
                        let target = request_line.next().unwrap_or("/").to_string();
                        seen.lock().unwrap().push(format!("{method} {target}"));

                        let reply = f(&target);
                        let reason = StatusCode::from_u16(reply.status)
                            .ok()
                            .and_then(|s| s.canonical_reason())
                            .unwrap_or("Unknown");
                        let mut response = format!("HTTP/1.1 {} {}\r\n", reply.status, reason);
                        for (name, value) in &reply.headers {
                            response.push_str(&format!("{name}: {value}\r\n"));
                        }
                        response.push_str(&format!(
                            "Content-Length: {}\r\nConnection: close\r\n\r\n",
                            reply.body.len()
                        ));
                        if method != "HEAD" {
                            response.push_str(&reply.body);
                        }

                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockOrigin { addr, requests }
}

/// Start an origin that accepts connections, reads the request and never answers.
pub async fn start_silent_origin() -> MockOrigin {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let seen = requests.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let seen = seen.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                if let Ok(n) = socket.read(&mut buf).await {
                    let head = String::from_utf8_lossy(&buf[..n]).to_string();
                    let line = head.lines().next().unwrap_or_default();
                    let mut parts = line.split_whitespace();
                    let method = parts.next().unwrap_or_default();
                    let target = parts.next().unwrap_or("/");
                    seen.lock().unwrap().push(format!("{method} {target}"));
                }
                // Hold the connection open until the peer gives up.
                let _ = socket.read(&mut buf).await;
            });
        }
    });

    MockOrigin { addr, requests }
}

/// Start an origin that always answers 200 with `body`.
pub async fn start_mock_origin(body: &'static str) -> MockOrigin {
    start_programmable_origin(move |_| MockReply::new(200, body).header("Content-Type", "text/html")).await
}

/// Mirror configuration pointing at `origin`, with an in-memory cache.
pub fn mirror_config(origin: &MockOrigin) -> MirrorConfig {
    let mut config = MirrorConfig::default();
    config.origin.base_url = origin.base_url();
    config.origin.max_attempts = 1;
    config.cache.backend = CacheBackendKind::Memory;
    config.server.compression_enabled = false;
    config
}

/// Start the mirror on an ephemeral port.
pub async fn start_mirror(config: MirrorConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    (addr, shutdown)
}

/// Client that never follows redirects or reuses connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

pub fn header<'a>(res: &'a reqwest::Response, name: &str) -> Option<&'a str> {
    res.headers().get(name).and_then(|v| v.to_str().ok())
}
