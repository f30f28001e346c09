//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use portmux::config::{Backend, Group, PortBinding, ProxyConfig};

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

pub fn url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

/// Client without connection reuse or system proxy settings.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Proxy config bound to loopback with short timeouts.
pub fn proxy_config(proxies: Vec<PortBinding>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.bind_host = "127.0.0.1".into();
    config.timeouts.connect_secs = 1;
    config.timeouts.upstream_secs = 2;
    config.health_check.timeout_ms = 500;
    config.shutdown.grace_period_secs = 2;
    config.proxies = proxies;
    config
}

pub fn binding(port: u16, groups: Vec<Group>) -> PortBinding {
    PortBinding { port, groups }
}

pub fn group(path: &str, backend_ports: &[u16], current: Option<usize>) -> Group {
    Group::new(path)
        .with_backends(backend_ports.iter().map(|p| Backend::new(url(*p))).collect())
        .with_current(current)
}

async fn serve(port: u16, app: Router) {
    let listener = TcpListener::bind(addr(port)).await.unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
}

/// Raw TCP backend that answers every connection with a fixed 200.
pub async fn start_mock_backend(port: u16, response: &'static str) {
    let listener = TcpListener::bind(addr(port)).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Backend that echoes the request as JSON and tags its response.
pub async fn start_echo_backend(port: u16, tag: &'static str) {
    let app = Router::new().fallback(
        move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| async move {
            let mut header_map = Map::new();
            for name in headers.keys() {
                let values: Vec<Value> = headers
                    .get_all(name)
                    .iter()
                    .map(|v| Value::from(v.to_str().unwrap_or_default()))
                    .collect();
                header_map.insert(name.as_str().to_string(), Value::Array(values));
            }
            (
                [("x-backend", tag)],
                Json(json!({
                    "tag": tag,
                    "method": method.as_str(),
                    "path": uri.path(),
                    "query": uri.query(),
                    "headers": header_map,
                    "body": String::from_utf8_lossy(&body),
                })),
            )
        },
    );
    serve(port, app).await;
}

/// Backend whose status and body come from `f`.
pub async fn start_programmable_backend<F, Fut>(port: u16, f: F)
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let f = Arc::new(f);
    let app = Router::new().fallback(move || {
        let f = Arc::clone(&f);
        async move {
            let (status, body) = f().await;
            (
                StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
                body,
            )
                .into_response()
        }
    });
    serve(port, app).await;
}

/// Backend that sleeps before answering 200 "slow".
pub async fn start_slow_backend(port: u16, delay: Duration) {
    start_programmable_backend(port, move || async move {
        tokio::time::sleep(delay).await;
        (200, "slow".to_string())
    })
    .await;
}

/// Backend that sends `chunks` pieces of `chunk`, `gap` apart.
pub async fn start_streaming_backend(port: u16, chunks: usize, chunk: &'static str, gap: Duration) {
    let app = Router::new().fallback(move || async move {
        let stream = futures_util::stream::unfold(0usize, move |sent| async move {
            if sent == chunks {
                return None;
            }
            if sent > 0 {
                tokio::time::sleep(gap).await;
            }
            Some((Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes())), sent + 1))
        });
        Body::from_stream(stream)
    });
    serve(port, app).await;
}

/// Raw TCP backend that waits `delay` before answering. Each time a peer
/// closes its connection before then, the close time is sent on the
/// returned channel.
pub async fn start_hanging_backend(port: u16, delay: Duration) -> mpsc::UnboundedReceiver<Instant> {
    let listener = TcpListener::bind(addr(port)).await.unwrap();
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let closed_tx = closed_tx.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        let _ = socket
                            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nlate")
                            .await;
                    }
                    _ = async {
                        while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
                    } => {
                        let _ = closed_tx.send(Instant::now());
                    }
                }
            });
        }
    });
    closed_rx
}

/// Send a GET with `target` written to the wire exactly as given and return
/// the whole raw response.
pub async fn raw_get(port: u16, target: &str) -> String {
    let mut stream = TcpStream::connect(addr(port)).await.unwrap();
    let request = format!("GET {target} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

/// A loopback port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
