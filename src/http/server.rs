//! Per-port HTTP server.
//!
//! # Responsibilities
//! - Build the Axum router served on each proxy port
//! - Dispatch every request to the routing engine, then the forwarder
//! - Bind and run listeners on behalf of the lifecycle `ServerSet`
//!
//! # Design Decisions
//! - One catch-all handler; the registry decides everything per request
//! - Handler never panics on a miss: every failure is a structured response
//! - Each listener owns a request tracker and a shutdown watch channel
//! - A request stays tracked until its response body has been sent

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    response::IntoResponse,
    routing::any,
    Router as AxumRouter,
};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::http::forward::Forwarder;
use crate::lifecycle::server_set::{ListenerFactory, ListenerHandle};
use crate::net::{bind_port, ListenerError, RequestTracker};
use crate::observability::metrics;
use crate::routing::Router;

/// State injected into the handler of one port.
#[derive(Clone)]
pub struct PortState {
    pub port: u16,
    pub router: Router,
    pub forwarder: Arc<Forwarder>,
    pub tracker: RequestTracker,
}

/// Build the Axum router for one proxy port.
pub fn build_router(state: PortState) -> AxumRouter {
    let port = state.port;
    AxumRouter::new()
        .route("/{*path}", any(proxy_handler))
        .route("/", any(proxy_handler))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(move |request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    port,
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
}

/// Route and forward one request.
async fn proxy_handler(State(state): State<PortState>, request: Request<Body>) -> Response<Body> {
    let guard = state.tracker.track();
    let start = Instant::now();

    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);

    let target = match state.router.route(state.port, &path, query.as_deref()) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(port = state.port, path = %path, error = %e, "Request not routed");
            let response = e.into_response();
            metrics::record_request(state.port, "none", response.status().as_u16(), start);
            return response;
        }
    };

    tracing::debug!(
        port = state.port,
        group = %target.group,
        backend = %target.backend_url,
        upstream = %target.target,
        "Proxying request"
    );

    let response = match state.forwarder.forward(&target, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(
                port = state.port,
                group = %target.group,
                backend = %target.backend_url,
                error = %e,
                "Upstream error"
            );
            e.into_response()
        }
    };

    metrics::record_request(state.port, &target.group, response.status().as_u16(), start);
    response.map(|body| guard.attach(body))
}

/// Starts real TCP listeners serving [`build_router`].
#[derive(Clone)]
pub struct HttpListenerFactory {
    bind_host: String,
    router: Router,
    forwarder: Arc<Forwarder>,
}

impl HttpListenerFactory {
    pub fn new(bind_host: impl Into<String>, router: Router, forwarder: Arc<Forwarder>) -> Self {
        Self {
            bind_host: bind_host.into(),
            router,
            forwarder,
        }
    }

    pub fn bind_host(&self) -> &str {
        &self.bind_host
    }
}

impl ListenerFactory for HttpListenerFactory {
    async fn start(&self, port: u16) -> Result<ListenerHandle, ListenerError> {
        let listener = bind_port(&self.bind_host, port).await?;
        let tracker = RequestTracker::new();
        let app = build_router(PortState {
            port,
            router: self.router.clone(),
            forwarder: Arc::clone(&self.forwarder),
            tracker: tracker.clone(),
        });

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                tracing::error!(port, error = %e, "Listener exited with error");
            }
        });

        Ok(ListenerHandle::new(port, shutdown_tx, task, tracker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::http::StatusCode;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    use crate::config::schema::{Backend, Group, PortBinding};
    use crate::registry::Registry;

    async fn spawn_backend(tag: &'static str) -> SocketAddr {
        let app = AxumRouter::new().fallback(move |request: Request<Body>| async move {
            format!("{tag} {}", request.uri())
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn app(groups: Vec<Group>) -> (AxumRouter, RequestTracker) {
        let registry = Arc::new(Registry::from_bindings(&[PortBinding {
            port: 8080,
            groups,
        }]));
        let tracker = RequestTracker::new();
        let router = build_router(PortState {
            port: 8080,
            router: Router::new(registry),
            forwarder: Arc::new(Forwarder::new(Duration::from_secs(1), Duration::from_secs(5))),
            tracker: tracker.clone(),
        });
        (router, tracker)
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn forwards_to_active_backend_with_prefix_stripped() {
        let a = spawn_backend("a").await;
        let b = spawn_backend("b").await;
        let group = Group::new("/api")
            .with_backends(vec![
                Backend::new(format!("http://{a}")),
                Backend::new(format!("http://{b}")),
            ])
            .with_current(Some(1));
        let (app, tracker) = app(vec![group]);

        let response = app
            .oneshot(Request::get("/api/users?id=7").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        // Counted until the relayed body has been read.
        assert_eq!(tracker.in_flight(), 1);
        assert_eq!(body_text(response).await, "b /users?id=7");
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn unmatched_path_is_404() {
        let (app, _) = app(vec![Group::new("/api")]);
        let response = app
            .oneshot(Request::get("/other").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-proxy-error"], "NO_GROUP_MATCH");
    }

    #[tokio::test]
    async fn group_without_selection_is_503() {
        let group = Group::new("/api").with_backends(vec![Backend::new("http://127.0.0.1:9")]);
        let (app, _) = app(vec![group]);
        let response = app
            .oneshot(Request::get("/api/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["x-proxy-error"], "NO_ACTIVE_BACKEND");
    }

    #[tokio::test]
    async fn dead_backend_is_503_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let group = Group::new("/")
            .with_backends(vec![Backend::new(format!("http://127.0.0.1:{port}"))])
            .with_current(Some(0));
        let (app, _) = app(vec![group]);
        let response = app
            .oneshot(Request::get("/anything").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["x-proxy-error"], "UPSTREAM_UNREACHABLE");
    }
}
