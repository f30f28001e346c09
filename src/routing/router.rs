//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Find the port's group list in the registry
//! - Pick the owning group by registration-order prefix scan
//! - Resolve the active backend and the rewritten upstream URL
//!
//! # Design Decisions
//! - Reads a fresh registry snapshot per request (edits apply without restart)
//! - First registered match wins; no longest-prefix ordering
//! - Explicit errors for every miss rather than a silent default

use std::sync::Arc;

use axum::http::Uri;

use crate::registry::Registry;
use crate::routing::rewrite::upstream_url;

/// Why a request could not be routed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("port {0} is not configured")]
    NoSuchPort(u16),

    #[error("no group on port {port} matches {path}")]
    NoGroupMatch { port: u16, path: String },

    #[error("group {group} on port {port} has no active backend")]
    NoActiveBackend { port: u16, group: String },

    #[error("backend URL {url:?} is not usable: {reason}")]
    InvalidBackendUrl { url: String, reason: String },
}

/// Where a request should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub port: u16,
    /// Path prefix of the matched group.
    pub group: String,
    pub backend_index: usize,
    pub backend_url: String,
    /// Fully rewritten upstream URI, query included.
    pub target: Uri,
}

/// Resolves requests against the shared registry.
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<Registry>,
}

impl Router {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Route a request arriving on `port`.
    pub fn route(&self, port: u16, path: &str, query: Option<&str>) -> Result<RouteTarget, RouteError> {
        let groups = self
            .registry
            .groups(port)
            .ok_or(RouteError::NoSuchPort(port))?;

        let group = groups
            .iter()
            .find(|g| g.matches(path))
            .ok_or_else(|| RouteError::NoGroupMatch {
                port,
                path: path.to_string(),
            })?;

        let (backend_index, backend) = group
            .current_backend
            .and_then(|i| group.backends.get(i).map(|b| (i, b)))
            .ok_or_else(|| RouteError::NoActiveBackend {
                port,
                group: group.path.clone(),
            })?;

        let target = upstream_url(&backend.url, &group.path, path, query).map_err(|e| {
            RouteError::InvalidBackendUrl {
                url: backend.url.clone(),
                reason: e.to_string(),
            }
        })?;
        let scheme = target.scheme_str().unwrap_or_default();
        if !matches!(scheme, "http" | "https") {
            return Err(RouteError::InvalidBackendUrl {
                url: backend.url.clone(),
                reason: format!("unsupported scheme {scheme:?}"),
            });
        }

        Ok(RouteTarget {
            port,
            group: group.path.clone(),
            backend_index,
            backend_url: backend.url.clone(),
            target,
        })
    }
}
