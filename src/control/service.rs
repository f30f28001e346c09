//! The proxy control surface.
//!
//! # Responsibilities
//! - Validate and apply edits to the port → groups registry
//! - Health-check a backend before making it active
//! - Bring listeners in line with the registry on `reconcile`
//! - Hand the resulting state to the configuration sink
//!
//! # Design Decisions
//! - Edits take effect for routing immediately; port set changes wait
//!   for `reconcile`
//! - Sink failures are logged, never rolled back
//! - Activation never picks a backend on its own; `select_healthy_backend`
//!   is the explicit opt-in scan

use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::{Backend, Group, PortBinding, ProxyConfig};
use crate::config::sink::{ConfigSink, NoopSink};
use crate::config::validation::{validate_config, validate_group, validate_port};
use crate::control::error::ControlError;
use crate::health::HealthChecker;
use crate::http::{Forwarder, HttpListenerFactory};
use crate::lifecycle::server_set::{ListenerFactory, ListenerStatus, ReconcileReport, ServerSet};
use crate::registry::{Registry, RegistryError};
use crate::routing::Router;

/// UI-driven proxy API.
pub struct ProxyService<F = HttpListenerFactory> {
    registry: Arc<Registry>,
    servers: ServerSet<F>,
    health: HealthChecker,
    sink: Arc<dyn ConfigSink>,
    clear_on_failed_activation: bool,
}

impl ProxyService<HttpListenerFactory> {
    /// Wire registry, router, forwarder and real listeners from a config.
    pub fn from_config(config: &ProxyConfig, sink: Arc<dyn ConfigSink>) -> Self {
        let registry = Arc::new(Registry::from_bindings(&config.proxies));
        let forwarder = Arc::new(Forwarder::from_config(&config.timeouts));
        let factory = HttpListenerFactory::new(
            config.bind_host.clone(),
            Router::new(Arc::clone(&registry)),
            forwarder,
        );

        Self::new(
            registry,
            factory,
            HealthChecker::from_config(&config.health_check),
            Duration::from_secs(config.shutdown.grace_period_secs),
        )
        .with_sink(sink)
        .with_clear_on_failed_activation(config.health_check.clear_on_failed_activation)
    }
}

impl<F: ListenerFactory> ProxyService<F> {
    pub fn new(
        registry: Arc<Registry>,
        factory: F,
        health: HealthChecker,
        grace_period: Duration,
    ) -> Self {
        Self {
            registry,
            servers: ServerSet::new(factory, grace_period),
            health,
            sink: Arc::new(NoopSink),
            clear_on_failed_activation: false,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ConfigSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_clear_on_failed_activation(mut self, clear: bool) -> Self {
        self.clear_on_failed_activation = clear;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // ----- port set -----

    /// Register a port. Its listener starts on the next `reconcile`.
    pub fn add_port(&self, port: u16) -> Result<(), ControlError> {
        validate_port(port)?;
        self.registry.insert_port(port)?;
        tracing::info!(port, "Port added");
        self.persist_all();
        Ok(())
    }

    /// Unregister a port. Requests to it are refused at once; its listener
    /// drains on the next `reconcile`.
    pub fn remove_port(&self, port: u16) -> Result<PortBinding, ControlError> {
        let removed = self.registry.remove_port(port)?;
        tracing::info!(port, groups = removed.groups.len(), "Port removed");
        self.persist_all();
        Ok(removed)
    }

    // ----- groups -----

    pub fn add_group(&self, port: u16, group: Group) -> Result<(), ControlError> {
        validate_group(port, &group)?;
        let saved = group.clone();
        self.registry.add_group(port, group)?;
        tracing::info!(port, path = %saved.path, backends = saved.backends.len(), "Group added");
        self.persist_group(port, &saved);
        Ok(())
    }

    pub fn remove_group(&self, port: u16, path: &str) -> Result<Group, ControlError> {
        let removed = self.registry.remove_group(port, path)?;
        tracing::info!(port, path = %path, "Group removed");
        self.persist_all();
        Ok(removed)
    }

    /// Replace a group's backend list wholesale.
    pub fn update_backends(
        &self,
        port: u16,
        path: &str,
        backends: Vec<Backend>,
    ) -> Result<Group, ControlError> {
        let group = self.registry.update_backends(port, path, backends)?;
        tracing::info!(
            port,
            path = %path,
            backends = group.backends.len(),
            current = ?group.current_backend,
            "Backends updated"
        );
        self.persist_group(port, &group);
        Ok(group)
    }

    // ----- activation -----

    /// Make backend `index` the group's active backend after it passes a
    /// health check.
    ///
    /// On failure the previous selection stays, unless the service was built
    /// with `clear_on_failed_activation`, in which case it is cleared.
    pub async fn activate_backend(
        &self,
        port: u16,
        path: &str,
        index: usize,
    ) -> Result<Group, ControlError> {
        let group = self.find_group(port, path)?;
        let backend = group
            .backends
            .get(index)
            .ok_or(RegistryError::BackendIndexOutOfRange {
                index,
                len: group.backends.len(),
            })?;

        let healthy = self
            .health
            .check_backend(&backend.url, group.health_check_path.as_deref())
            .await;

        if !healthy {
            tracing::warn!(port, path = %path, index, url = %backend.url, "Activation refused: backend unhealthy");
            if self.clear_on_failed_activation {
                let cleared = self.registry.set_current(port, path, None, None)?;
                self.persist_group(port, &cleared);
            }
            return Err(ControlError::HealthCheckFailed {
                port,
                path: path.to_string(),
                index,
                url: backend.url.clone(),
            });
        }

        let updated = self
            .registry
            .set_current(port, path, Some(index), Some(&backend.url))?;
        tracing::info!(port, path = %path, index, url = %backend.url, "Backend activated");
        self.persist_group(port, &updated);
        Ok(updated)
    }

    /// Clear the active backend; the group answers 503 until re-activated.
    pub fn deactivate_backend(&self, port: u16, path: &str) -> Result<Group, ControlError> {
        let updated = self.registry.set_current(port, path, None, None)?;
        tracing::info!(port, path = %path, "Backend deactivated");
        self.persist_group(port, &updated);
        Ok(updated)
    }

    /// Activate the first backend, in list order, that passes a health check.
    pub async fn select_healthy_backend(&self, port: u16, path: &str) -> Result<Group, ControlError> {
        let group = self.find_group(port, path)?;
        let index = self
            .health
            .first_healthy(&group.backends, group.health_check_path.as_deref())
            .await
            .ok_or_else(|| ControlError::NoHealthyBackend {
                port,
                path: path.to_string(),
            })?;

        let url = &group.backends[index].url;
        let updated = self.registry.set_current(port, path, Some(index), Some(url))?;
        tracing::info!(port, path = %path, index, url = %url, "Healthy backend selected");
        self.persist_group(port, &updated);
        Ok(updated)
    }

    // ----- health -----

    /// Liveness probe: any response counts.
    pub async fn check_backend(&self, url: &str) -> bool {
        self.health.check(url).await
    }

    /// Strict probe: `url` + `health_check_path` must answer 200.
    pub async fn check_backend_with_path(&self, url: &str, health_check_path: &str) -> bool {
        self.health.check_with_path(url, health_check_path).await
    }

    /// Probe every backend of a group concurrently.
    pub async fn check_all(&self, port: u16, path: &str) -> Result<Vec<(String, bool)>, ControlError> {
        let group = self.find_group(port, path)?;
        let urls: Vec<String> = group.backends.iter().map(|b| b.url.clone()).collect();
        Ok(self
            .health
            .check_all(&urls, group.health_check_path.as_deref())
            .await)
    }

    // ----- listeners -----

    /// Start and stop listeners until they match the registered ports.
    pub async fn reconcile(&self) -> ReconcileReport {
        let desired = self.registry.ports();
        let report = self.servers.reconcile(&desired).await;
        if !report.is_noop() {
            tracing::info!(
                started = ?report.started,
                stopped = ?report.stopped,
                failed = report.failed.len(),
                "Reconciled listeners"
            );
        }
        report
    }

    /// Replace every port binding with `config.proxies`, then reconcile.
    pub async fn apply_config(&self, config: &ProxyConfig) -> Result<ReconcileReport, ControlError> {
        validate_config(config).map_err(ControlError::InvalidConfig)?;
        self.registry.replace_all(&config.proxies);
        self.sink.reloaded(config);
        tracing::info!(ports = config.proxies.len(), "Configuration applied");
        Ok(self.reconcile().await)
    }

    pub fn snapshot(&self) -> Vec<PortBinding> {
        self.registry.snapshot()
    }

    pub fn listeners(&self) -> Vec<ListenerStatus> {
        self.servers.listeners()
    }

    pub async fn shutdown_all(&self) -> Vec<u16> {
        self.servers.shutdown_all().await
    }

    // ----- helpers -----

    fn find_group(&self, port: u16, path: &str) -> Result<Group, RegistryError> {
        if !self.registry.contains_port(port) {
            return Err(RegistryError::NoSuchPort(port));
        }
        self.registry
            .group(port, path)
            .ok_or_else(|| RegistryError::NoSuchGroup {
                port,
                path: path.to_string(),
            })
    }

    fn persist_group(&self, port: u16, group: &Group) {
        if let Err(e) = self.sink.save_group(port, group) {
            tracing::error!(port, path = %group.path, error = %e, "Failed to save group");
        }
    }

    fn persist_all(&self) {
        if let Err(e) = self.sink.save_all(&self.registry.snapshot()) {
            tracing::error!(error = %e, "Failed to save configuration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::watch;

    use crate::config::sink::SinkError;
    use crate::lifecycle::server_set::ListenerHandle;
    use crate::net::{ListenerError, RequestTracker};

    /// Starts listeners that bind nothing.
    struct NullFactory;

    impl ListenerFactory for NullFactory {
        async fn start(&self, port: u16) -> Result<ListenerHandle, ListenerError> {
            let (tx, mut rx) = watch::channel(false);
            let task = tokio::spawn(async move {
                let _ = rx.wait_for(|stop| *stop).await;
            });
            Ok(ListenerHandle::new(port, tx, task, RequestTracker::new()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        groups: Mutex<Vec<(u16, Group)>>,
        full_saves: Mutex<usize>,
    }

    impl ConfigSink for RecordingSink {
        fn save_group(&self, port: u16, group: &Group) -> Result<(), SinkError> {
            self.groups.lock().unwrap().push((port, group.clone()));
            Ok(())
        }

        fn save_all(&self, _proxies: &[PortBinding]) -> Result<(), SinkError> {
            *self.full_saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// Answers every connection with a bare 200.
    async fn live_backend() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                        .await;
                });
            }
        });
        format!("http://{addr}")
    }

    async fn dead_backend() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    fn service(bindings: &[PortBinding]) -> (ProxyService<NullFactory>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let service = ProxyService::new(
            Arc::new(Registry::from_bindings(bindings)),
            NullFactory,
            HealthChecker::new(Duration::from_millis(500)),
            Duration::from_secs(1),
        )
        .with_sink(sink.clone());
        (service, sink)
    }

    fn api_binding(urls: [&str; 2], current: Option<usize>) -> PortBinding {
        PortBinding {
            port: 8080,
            groups: vec![Group::new("/api")
                .with_backends(urls.iter().map(|u| Backend::new(*u)).collect())
                .with_current(current)],
        }
    }

    #[tokio::test]
    async fn activation_of_reachable_backend_commits() {
        let live = live_backend().await;
        let dead = dead_backend().await;
        let (service, sink) = service(&[api_binding([&dead, &live], Some(0))]);

        let group = service.activate_backend(8080, "/api", 1).await.unwrap();
        assert_eq!(group.current_backend, Some(1));
        assert_eq!(
            service.registry().group(8080, "/api").unwrap().current_backend,
            Some(1)
        );
        assert_eq!(sink.groups.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_activation_keeps_previous_selection() {
        let live = live_backend().await;
        let dead = dead_backend().await;
        let (service, sink) = service(&[api_binding([&live, &dead], Some(0))]);

        let err = service.activate_backend(8080, "/api", 1).await.unwrap_err();
        assert!(matches!(err, ControlError::HealthCheckFailed { index: 1, .. }));
        assert_eq!(
            service.registry().group(8080, "/api").unwrap().current_backend,
            Some(0)
        );
        assert!(sink.groups.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_activation_can_clear_selection() {
        let live = live_backend().await;
        let dead = dead_backend().await;
        let (service, _) = service(&[api_binding([&live, &dead], Some(0))]);
        let service = service.with_clear_on_failed_activation(true);

        assert!(service.activate_backend(8080, "/api", 1).await.is_err());
        assert_eq!(service.registry().group(8080, "/api").unwrap().current_backend, None);
    }

    #[tokio::test]
    async fn activation_index_out_of_range_is_rejected() {
        let (service, _) = service(&[api_binding(["http://a", "http://b"], None)]);
        let err = service.activate_backend(8080, "/api", 5).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Registry(RegistryError::BackendIndexOutOfRange { index: 5, len: 2 })
        ));
    }

    #[tokio::test]
    async fn select_healthy_backend_picks_first_live() {
        let live = live_backend().await;
        let dead = dead_backend().await;
        let (service, _) = service(&[api_binding([&dead, &live], None)]);

        let group = service.select_healthy_backend(8080, "/api").await.unwrap();
        assert_eq!(group.current_backend, Some(1));

        let results = service.check_all(8080, "/api").await.unwrap();
        assert_eq!(results, vec![(dead.clone(), false), (live.clone(), true)]);
    }

    #[test]
    fn invalid_edits_change_nothing() {
        let (service, sink) = service(&[]);
        assert!(matches!(service.add_port(0), Err(ControlError::Invalid(_))));
        assert!(service.add_port(8080).is_ok());
        assert!(matches!(
            service.add_port(8080),
            Err(ControlError::Registry(RegistryError::PortExists(8080)))
        ));
        assert!(matches!(
            service.add_group(8080, Group::new("api")),
            Err(ControlError::Invalid(_))
        ));
        assert!(service.add_group(8080, Group::new("/api")).is_ok());
        assert!(matches!(
            service.add_group(8080, Group::new("/api")),
            Err(ControlError::Registry(RegistryError::DuplicateGroup { .. }))
        ));
        assert!(matches!(
            service.add_group(9999, Group::new("/x")),
            Err(ControlError::Registry(RegistryError::NoSuchPort(9999)))
        ));

        let snapshot = service.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].groups.len(), 1);
        assert_eq!(*sink.full_saves.lock().unwrap(), 1);
    }

    #[test]
    fn update_backends_follows_active_url() {
        let (service, _) = service(&[api_binding(["http://a", "http://b"], Some(1))]);
        let group = service
            .update_backends(
                8080,
                "/api",
                vec![Backend::new("http://b"), Backend::new("http://c")],
            )
            .unwrap();
        assert_eq!(group.current_backend, Some(0));

        let group = service
            .update_backends(8080, "/api", vec![Backend::new("http://c")])
            .unwrap();
        assert_eq!(group.current_backend, None);
    }

    #[tokio::test]
    async fn reconcile_follows_port_set_and_is_idempotent() {
        let (service, _) = service(&[PortBinding::new(8080)]);

        let first = service.reconcile().await;
        assert_eq!(first.started, vec![8080]);
        assert!(service.reconcile().await.is_noop());

        service.add_port(8081).unwrap();
        service.remove_port(8080).unwrap();
        let report = service.reconcile().await;
        assert_eq!(report.started, vec![8081]);
        assert_eq!(report.stopped, vec![8080]);

        let live: BTreeSet<u16> = service.listeners().iter().map(|l| l.port).collect();
        assert_eq!(live, BTreeSet::from([8081]));
        assert_eq!(service.shutdown_all().await, vec![8081]);
    }

    #[tokio::test]
    async fn apply_config_rejects_invalid_and_replaces_valid() {
        let (service, _) = service(&[PortBinding::new(8080)]);

        let mut bad = ProxyConfig::default();
        bad.proxies = vec![PortBinding::new(0)];
        assert!(matches!(
            service.apply_config(&bad).await,
            Err(ControlError::InvalidConfig(_))
        ));
        assert_eq!(service.registry().ports(), BTreeSet::from([8080]));

        let mut good = ProxyConfig::default();
        good.proxies = vec![PortBinding::new(9000)];
        let report = service.apply_config(&good).await.unwrap();
        assert_eq!(report.started, vec![9000]);
        assert_eq!(service.registry().ports(), BTreeSet::from([9000]));
    }
}
