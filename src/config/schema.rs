//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy,
//! including the routing data model (ports, groups, backends).
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Host/IP every port listener binds to (e.g., "0.0.0.0").
    pub bind_host: String,

    /// Upstream timeout configuration.
    pub timeouts: TimeoutConfig,

    /// On-demand health check settings.
    pub health_check: HealthCheckConfig,

    /// Listener shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Port bindings, one listener each.
    pub proxies: Vec<PortBinding>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            timeouts: TimeoutConfig::default(),
            health_check: HealthCheckConfig::default(),
            shutdown: ShutdownConfig::default(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
            proxies: Vec::new(),
        }
    }
}

/// An upstream service reachable over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Backend {
    /// Absolute base URL, e.g. "http://localhost:9001".
    pub url: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Backend {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// A path-prefix routing rule bound to one port.
///
/// Owns an ordered pool of candidate backends and at most one active
/// selection. `current_backend`, when set, is always a valid index into
/// `backends`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Group {
    /// Path prefix, starting with "/".
    pub path: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Candidate backends, in display order.
    #[serde(default)]
    pub backends: Vec<Backend>,

    /// Index of the active backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_backend: Option<usize>,

    /// Path probed by the strict health check (expects a 200).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_path: Option<String>,
}

impl Group {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            alias: None,
            backends: Vec::new(),
            current_backend: None,
            health_check_path: None,
        }
    }

    pub fn with_backends(mut self, backends: Vec<Backend>) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_current(mut self, index: Option<usize>) -> Self {
        self.current_backend = index;
        self
    }

    /// True if this group owns `path` (plain prefix test, case-sensitive).
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.path)
    }

    /// The active backend, if one is selected and the index is valid.
    pub fn active_backend(&self) -> Option<&Backend> {
        self.current_backend.and_then(|i| self.backends.get(i))
    }
}

/// The set of groups served on one listening port.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PortBinding {
    /// Listening port, 1..=65535.
    pub port: u16,

    /// Groups in registration order.
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl PortBinding {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            groups: Vec::new(),
        }
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the upstream to produce response headers, in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 60,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Clear the active backend when an activation probe fails,
    /// instead of keeping the previous selection.
    pub clear_on_failed_activation: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            clear_on_failed_activation: false,
        }
    }
}

/// Listener shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time a stopping listener may spend draining in-flight requests.
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:9900".to_string(),
        }
    }
}
