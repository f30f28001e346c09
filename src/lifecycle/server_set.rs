//! Live set of per-port listeners.
//!
//! # Responsibilities
//! - Own the port → listener handle map
//! - Bring live listeners in line with the desired port set
//! - Drain stopping listeners, bounded by a grace period
//!
//! # State Machine (per port)
//! ```text
//! absent → starting → serving → draining → absent
//!              └── bind failure ──────────→ absent
//! ```
//!
//! # Design Decisions
//! - Reconciliation = pure diff (`plan_reconcile`) + imperative start/stop
//! - Listener creation behind `ListenerFactory` so tests need no sockets
//! - Start/stop calls are serialized; state is readable at any time
//! - A listener that outlives the grace period is aborted

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::net::{ListenerError, RequestTracker};
use crate::observability::metrics;

/// Observable listener state. `absent` ports have no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    Starting,
    Serving,
    Draining,
}

/// Creates running listeners.
pub trait ListenerFactory: Send + Sync + 'static {
    /// Bind and start serving `port`. Resolves once the port is bound.
    fn start(&self, port: u16) -> impl Future<Output = Result<ListenerHandle, ListenerError>> + Send;
}

/// A running listener, owned by [`ServerSet`].
#[derive(Debug)]
pub struct ListenerHandle {
    port: u16,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    tracker: RequestTracker,
}

impl ListenerHandle {
    /// `task` must finish after `shutdown_tx` flips to `true` and its
    /// in-flight work completes.
    pub fn new(
        port: u16,
        shutdown_tx: watch::Sender<bool>,
        task: JoinHandle<()>,
        tracker: RequestTracker,
    ) -> Self {
        Self {
            port,
            shutdown_tx,
            task,
            tracker,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight()
    }

    /// Signal shutdown and wait up to `grace` for in-flight requests
    /// (streamed bodies included) and the task to finish.
    /// Returns false if the task had to be aborted.
    async fn drain(mut self, grace: Duration) -> bool {
        let _ = self.shutdown_tx.send(true);
        let tracker = self.tracker.clone();
        let task = &mut self.task;
        let outcome = tokio::time::timeout(grace, async move {
            tracker.wait_idle().await;
            task.await
        })
        .await;
        match outcome {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(port = self.port, error = %e, "Listener task failed");
                true
            }
            Err(_) => {
                tracing::warn!(
                    port = self.port,
                    in_flight = self.tracker.in_flight(),
                    grace_secs = grace.as_secs_f64(),
                    "Grace period elapsed; aborting listener"
                );
                self.task.abort();
                false
            }
        }
    }
}

/// What a reconciliation has to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_start: BTreeSet<u16>,
    pub to_stop: BTreeSet<u16>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_start.is_empty() && self.to_stop.is_empty()
    }
}

/// Diff live ports against desired ports. Ports in both are left alone.
pub fn plan_reconcile(live: &BTreeSet<u16>, desired: &BTreeSet<u16>) -> ReconcilePlan {
    ReconcilePlan {
        to_start: desired.difference(live).copied().collect(),
        to_stop: live.difference(desired).copied().collect(),
    }
}

/// Outcome of a reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub started: Vec<u16>,
    pub stopped: Vec<u16>,
    /// Ports that failed to start, with the reason.
    pub failed: Vec<(u16, String)>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty() && self.failed.is_empty()
    }
}

/// Point-in-time view of one listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerStatus {
    pub port: u16,
    pub state: ListenerState,
}

/// Port → listener manager.
pub struct ServerSet<F> {
    factory: F,
    grace_period: Duration,
    handles: Mutex<BTreeMap<u16, ListenerHandle>>,
    states: DashMap<u16, ListenerState>,
}

impl<F: ListenerFactory> ServerSet<F> {
    pub fn new(factory: F, grace_period: Duration) -> Self {
        Self {
            factory,
            grace_period,
            handles: Mutex::new(BTreeMap::new()),
            states: DashMap::new(),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Ports with a listener in any state.
    pub fn live_ports(&self) -> BTreeSet<u16> {
        self.states.iter().map(|e| *e.key()).collect()
    }

    pub fn state(&self, port: u16) -> Option<ListenerState> {
        self.states.get(&port).map(|e| *e.value())
    }

    pub fn listeners(&self) -> Vec<ListenerStatus> {
        let mut all: Vec<_> = self
            .states
            .iter()
            .map(|e| ListenerStatus {
                port: *e.key(),
                state: *e.value(),
            })
            .collect();
        all.sort_by_key(|s| s.port);
        all
    }

    /// Start a listener for `port` unless one is already running.
    ///
    /// Returns `Ok(true)` if a listener was started.
    pub async fn ensure_listener(&self, port: u16) -> Result<bool, ListenerError> {
        let mut handles = self.handles.lock().await;
        if handles.contains_key(&port) {
            return Ok(false);
        }
        let handle = self.start(port).await?;
        handles.insert(port, handle);
        metrics::set_live_listeners(handles.len());
        Ok(true)
    }

    /// Stop the listener on `port`, if any. Returns true if one was stopped.
    pub async fn stop_listener(&self, port: u16) -> bool {
        let mut handles = self.handles.lock().await;
        let Some(handle) = handles.remove(&port) else {
            return false;
        };
        self.stop(handle).await;
        metrics::set_live_listeners(handles.len());
        true
    }

    /// Converge on `desired`: stop extra listeners, start missing ones.
    pub async fn reconcile(&self, desired: &BTreeSet<u16>) -> ReconcileReport {
        let mut handles = self.handles.lock().await;
        let live: BTreeSet<u16> = handles.keys().copied().collect();
        let plan = plan_reconcile(&live, desired);
        let mut report = ReconcileReport::default();

        if plan.is_empty() {
            tracing::debug!(ports = ?desired, "Listeners already reconciled");
            return report;
        }

        tracing::info!(
            start = ?plan.to_start,
            stop = ?plan.to_stop,
            "Reconciling listeners"
        );

        // Stop first so a port can be handed between configurations.
        let stopping: Vec<ListenerHandle> = plan
            .to_stop
            .iter()
            .filter_map(|port| handles.remove(port))
            .collect();
        join_all(stopping.into_iter().map(|h| self.stop(h))).await;
        report.stopped = plan.to_stop.iter().copied().collect();

        for port in plan.to_start {
            match self.start(port).await {
                Ok(handle) => {
                    handles.insert(port, handle);
                    report.started.push(port);
                }
                Err(e) => report.failed.push((port, e.to_string())),
            }
        }

        metrics::set_live_listeners(handles.len());
        report
    }

    /// Gracefully stop every listener. Returns the stopped ports.
    pub async fn shutdown_all(&self) -> Vec<u16> {
        let mut handles = self.handles.lock().await;
        let all = std::mem::take(&mut *handles);
        let ports: Vec<u16> = all.keys().copied().collect();
        tracing::info!(ports = ?ports, "Shutting down all listeners");
        join_all(all.into_values().map(|h| self.stop(h))).await;
        metrics::set_live_listeners(0);
        ports
    }

    async fn start(&self, port: u16) -> Result<ListenerHandle, ListenerError> {
        self.states.insert(port, ListenerState::Starting);
        match self.factory.start(port).await {
            Ok(handle) => {
                self.states.insert(port, ListenerState::Serving);
                tracing::info!(port, "Listener serving");
                Ok(handle)
            }
            Err(e) => {
                self.states.remove(&port);
                tracing::error!(port, error = %e, "Listener failed to start");
                Err(e)
            }
        }
    }

    async fn stop(&self, handle: ListenerHandle) {
        let port = handle.port();
        self.states.insert(port, ListenerState::Draining);
        tracing::info!(port, in_flight = handle.in_flight(), "Listener draining");
        let clean = handle.drain(self.grace_period).await;
        self.states.remove(&port);
        tracing::info!(port, clean, "Listener stopped");
    }
}
