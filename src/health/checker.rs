//! On-demand backend probing.
//!
//! # Responsibilities
//! - Probe a candidate backend URL with a short fixed timeout
//! - Offer a liveness form (any response) and a strict form (200 on a path)
//! - Probe several backends concurrently for "test all"
//!
//! # Design Decisions
//! - Probes are independent; the checker holds no per-backend state
//! - Never selects a backend on its own; callers decide what to do

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, Uri};
use futures_util::future::join_all;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time;

use crate::config::schema::{Backend, HealthCheckConfig};
use crate::observability::metrics;
use crate::routing::rewrite::upstream_url;

/// Default probe timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
enum ProbeError {
    InvalidUrl(String),
    Transport(hyper_util::client::legacy::Error),
    Timeout,
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::InvalidUrl(reason) => write!(f, "invalid URL: {}", reason),
            ProbeError::Transport(e) => write!(f, "connection error: {}", e),
            ProbeError::Timeout => write!(f, "timeout"),
        }
    }
}

/// Issues bounded-timeout liveness probes.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(HttpConnector::new());

        Self { client, timeout }
    }

    pub fn from_config(config: &HealthCheckConfig) -> Self {
        Self::new(Duration::from_millis(config.timeout_ms))
    }

    /// Liveness probe: `true` if `url` answers at all, whatever the status.
    pub async fn check(&self, url: &str) -> bool {
        let healthy = match self.probe(url).await {
            Ok(status) => {
                tracing::debug!(url = %url, status = %status, "Backend reachable");
                true
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Health check failed");
                false
            }
        };
        metrics::record_health_check(healthy);
        healthy
    }

    /// Strict probe: `true` only if `url` + `health_check_path` returns 200.
    pub async fn check_with_path(&self, url: &str, health_check_path: &str) -> bool {
        let probe_url = match upstream_url(url, "", health_check_path, None) {
            Ok(u) => u.to_string(),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Health check failed: invalid URL");
                metrics::record_health_check(false);
                return false;
            }
        };

        let healthy = match self.probe(&probe_url).await {
            Ok(StatusCode::OK) => true,
            Ok(status) => {
                tracing::warn!(url = %probe_url, status = %status, "Health check failed: non-200 status");
                false
            }
            Err(e) => {
                tracing::warn!(url = %probe_url, error = %e, "Health check failed");
                false
            }
        };
        metrics::record_health_check(healthy);
        healthy
    }

    /// Strict probe when `health_check_path` is set, liveness probe otherwise.
    pub async fn check_backend(&self, url: &str, health_check_path: Option<&str>) -> bool {
        match health_check_path {
            Some(path) => self.check_with_path(url, path).await,
            None => self.check(url).await,
        }
    }

    /// Probe every URL concurrently. Results keep input order.
    pub async fn check_all(
        &self,
        urls: &[String],
        health_check_path: Option<&str>,
    ) -> Vec<(String, bool)> {
        let results = join_all(
            urls.iter()
                .map(|url| self.check_backend(url, health_check_path)),
        )
        .await;
        urls.iter().cloned().zip(results).collect()
    }

    /// Index of the first backend that passes a probe, scanning in order.
    ///
    /// Uses the strict form when `health_check_path` is set, the liveness
    /// form otherwise.
    pub async fn first_healthy(
        &self,
        backends: &[Backend],
        health_check_path: Option<&str>,
    ) -> Option<usize> {
        for (index, backend) in backends.iter().enumerate() {
            if self.check_backend(&backend.url, health_check_path).await {
                return Some(index);
            }
        }
        None
    }

    async fn probe(&self, url: &str) -> Result<StatusCode, ProbeError> {
        let uri: Uri = url
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| ProbeError::InvalidUrl(e.to_string()))?;

        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("user-agent", "portmux-health-check")
            .body(Body::empty())
            .map_err(|e| ProbeError::InvalidUrl(e.to_string()))?;

        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response.status()),
            Ok(Err(e)) => Err(ProbeError::Transport(e)),
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}
