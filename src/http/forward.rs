//! Upstream forwarding.
//!
//! # Responsibilities
//! - Send the prepared request to the routed backend
//! - Bound connection setup and time-to-headers
//! - Classify transport failures as unreachable or timed out
//!
//! # Design Decisions
//! - No connection reuse: idle pool size is zero
//! - No retries; one attempt per client request
//! - The response body is streamed back, never buffered

use std::error::Error as StdError;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::schema::TimeoutConfig;
use crate::http::request::upstream_request;
use crate::http::response::relay;
use crate::routing::RouteTarget;

/// Forwarding failure.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("cannot reach {url}: {reason}")]
    UpstreamUnreachable { url: String, reason: String },

    #[error("{url} did not respond within {after:?}")]
    UpstreamTimeout { url: String, after: Duration },
}

/// Forwards requests to backends.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    connect_timeout: Duration,
    upstream_timeout: Duration,
}

impl Forwarder {
    pub fn new(connect_timeout: Duration, upstream_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(connector);

        Self {
            client,
            connect_timeout,
            upstream_timeout,
        }
    }

    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self::new(
            Duration::from_secs(config.connect_secs),
            Duration::from_secs(config.upstream_secs),
        )
    }

    /// Forward `request` to `target` and return the relayed response.
    pub async fn forward(
        &self,
        target: &RouteTarget,
        request: Request<Body>,
    ) -> Result<Response<Body>, ForwardError> {
        let uri = target.target.clone();
        let url = uri.to_string();

        let (parts, body) = request.into_parts();
        let upstream = upstream_request(parts, body, uri);

        let pending = self.client.request(upstream);
        let response: Response<Incoming> = match tokio::time::timeout(self.upstream_timeout, pending).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if is_timeout(&e) => {
                return Err(ForwardError::UpstreamTimeout {
                    url,
                    after: self.connect_timeout,
                });
            }
            Ok(Err(e)) => {
                return Err(ForwardError::UpstreamUnreachable {
                    url,
                    reason: error_chain(&e),
                });
            }
            Err(_) => {
                return Err(ForwardError::UpstreamTimeout {
                    url,
                    after: self.upstream_timeout,
                });
            }
        };

        Ok(relay(response))
    }
}

fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = e.source();
    }
    false
}

/// Render an error with its causes, e.g. "client error (Connect): Connection refused".
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        out.push_str(": ");
        out.push_str(&e.to_string());
        source = e.source();
    }
    out
}
