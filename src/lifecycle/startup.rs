//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize logging and metrics from the loaded configuration
//! - Build the control service and bring up one listener per port
//! - Start background tasks (admin API, config reload loop)
//! - Tear everything down in order on shutdown
//!
//! # Design Decisions
//! - Fail fast on process-level errors (bad admin address, watcher setup)
//! - A port that cannot bind is logged and skipped, never fatal
//! - Listeners start before the admin API so status reflects reality

use std::io;
use std::net::{AddrParseError, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::RecommendedWatcher;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::ProxyConfig;
use crate::config::sink::{ConfigSink, NoopSink, TomlFileSink};
use crate::config::watcher::ConfigWatcher;
use crate::control::ProxyService;
use crate::lifecycle::server_set::ReconcileReport;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::{next_signal, SignalEvent};
use crate::observability::logging::{init_logging, LoggingError};
use crate::observability::metrics;

/// Process-level startup failure.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("invalid {what} address {value:?}: {source}")]
    Address {
        what: &'static str,
        value: String,
        #[source]
        source: AddrParseError,
    },

    #[error("failed to bind admin API on {addr}: {source}")]
    AdminBind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("config watcher failed: {0}")]
    Watch(#[from] notify::Error),

    #[error("signal handling failed: {0}")]
    Signal(#[source] io::Error),
}

/// Install the tracing subscriber and, if enabled, the metrics exporter.
pub fn init_observability(config: &ProxyConfig) -> Result<(), StartupError> {
    init_logging(&config.observability)?;

    if config.observability.metrics_enabled {
        let addr = parse_addr("metrics", &config.observability.metrics_address)?;
        metrics::init_metrics(addr);
    }
    Ok(())
}

/// A started proxy.
pub struct Running {
    config_path: Option<PathBuf>,
    service: Arc<ProxyService>,
    shutdown: Shutdown,
    admin_addr: Option<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
    _watcher: Option<RecommendedWatcher>,
}

/// Start listeners, the admin API and, with a config path, file persistence
/// plus hot reload.
pub async fn launch(config: ProxyConfig, config_path: Option<&Path>) -> Result<Running, StartupError> {
    let sink: Arc<dyn ConfigSink> = match config_path {
        Some(path) => Arc::new(TomlFileSink::new(path, config.clone())),
        None => Arc::new(NoopSink),
    };
    let service = Arc::new(ProxyService::from_config(&config, sink));
    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    log_report(&service.reconcile().await);

    let admin_addr = if config.admin.enabled {
        let addr = parse_addr("admin", &config.admin.bind_address)?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StartupError::AdminBind { addr, source })?;
        let local = listener.local_addr().unwrap_or(addr);
        let app = setup_admin_router(AdminState::new(Arc::clone(&service), &config.admin.api_key));
        let stop = shutdown.wait();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(stop).await {
                tracing::error!(error = %e, "Admin API exited with error");
            }
        }));
        tracing::info!(address = %local, "Admin API listening");
        Some(local)
    } else {
        None
    };

    let watcher = match config_path {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;
            let service = Arc::clone(&service);
            let mut stop = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(new_config) = updates.recv() => apply(&service, &new_config).await,
                        _ = stop.recv() => break,
                        else => break,
                    }
                }
            }));
            Some(watcher)
        }
        None => None,
    };

    Ok(Running {
        config_path: config_path.map(Path::to_path_buf),
        service,
        shutdown,
        admin_addr,
        tasks,
        _watcher: watcher,
    })
}

impl Running {
    pub fn service(&self) -> &Arc<ProxyService> {
        &self.service
    }

    /// Bound admin API address, if the admin API is enabled.
    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    /// Re-read the config file and apply it.
    pub async fn reload(&self) {
        let Some(path) = &self.config_path else {
            tracing::warn!("Reload requested but no config file is in use");
            return;
        };
        match load_config(path) {
            Ok(config) => apply(&self.service, &config).await,
            Err(e) => tracing::error!(
                path = ?path,
                error = %e,
                "Failed to reload config; keeping current configuration"
            ),
        }
    }

    /// Serve until SIGINT/SIGTERM, reloading on SIGHUP, then shut down.
    pub async fn run_until_signal(self) -> Result<(), StartupError> {
        loop {
            match next_signal().await.map_err(StartupError::Signal)? {
                SignalEvent::Reload => self.reload().await,
                SignalEvent::Shutdown => break,
            }
        }
        self.stop().await;
        Ok(())
    }

    /// Drain every listener, then stop background tasks.
    pub async fn stop(self) {
        tracing::info!("Shutting down");
        let ports = self.service.shutdown_all().await;
        self.shutdown.trigger();
        for task in self.tasks {
            let _ = task.await;
        }
        tracing::info!(ports = ?ports, "Shutdown complete");
    }
}

async fn apply(service: &ProxyService, config: &ProxyConfig) {
    match service.apply_config(config).await {
        Ok(report) => log_report(&report),
        Err(e) => tracing::error!(error = %e, "Rejected configuration update"),
    }
}

fn log_report(report: &ReconcileReport) {
    for (port, reason) in &report.failed {
        tracing::error!(port, reason = %reason, "Port listener not started");
    }
}

fn parse_addr(what: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|source| StartupError::Address {
        what,
        value: value.to_string(),
        source,
    })
}
