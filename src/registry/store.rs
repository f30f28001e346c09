//! Port → groups store.
//!
//! # Responsibilities
//! - Hold the authoritative group list for every configured port
//! - Hand listeners consistent, immutable snapshots
//! - Funnel every mutation through one serialized write path
//!
//! # Design Decisions
//! - Each port's group list lives behind an `ArcSwap`; readers never block
//! - Writers clone, modify and swap under a single mutex
//! - Port membership uses a `DashMap` so lookups stay lock-free

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::config::schema::{Backend, Group, PortBinding};

/// Errors raised by registry mutations. No state changes when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("port {0} is not configured")]
    NoSuchPort(u16),

    #[error("port {0} is already configured")]
    PortExists(u16),

    #[error("no group with path {path:?} on port {port}")]
    NoSuchGroup { port: u16, path: String },

    #[error("group {path:?} already exists on port {port}")]
    DuplicateGroup { port: u16, path: String },

    #[error("backend index {index} is out of range ({len} backends)")]
    BackendIndexOutOfRange { index: usize, len: usize },

    #[error("backend {index} changed while it was being activated")]
    BackendChanged { index: usize },
}

/// The groups served on one port.
#[derive(Debug)]
pub struct PortTable {
    port: u16,
    groups: ArcSwap<Vec<Group>>,
}

impl PortTable {
    fn new(port: u16, groups: Vec<Group>) -> Self {
        Self {
            port,
            groups: ArcSwap::from_pointee(groups),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Current group list. Never observes a half-applied edit.
    pub fn snapshot(&self) -> Arc<Vec<Group>> {
        self.groups.load_full()
    }
}

/// Shared, synchronized port → groups mapping.
#[derive(Debug, Default)]
pub struct Registry {
    ports: DashMap<u16, Arc<PortTable>>,
    writer: Mutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configured bindings. Later duplicates of a port
    /// replace earlier ones.
    pub fn from_bindings(bindings: &[PortBinding]) -> Self {
        let registry = Self::new();
        for binding in bindings {
            registry.ports.insert(
                binding.port,
                Arc::new(PortTable::new(binding.port, binding.groups.clone())),
            );
        }
        registry
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configured ports.
    pub fn ports(&self) -> BTreeSet<u16> {
        self.ports.iter().map(|entry| *entry.key()).collect()
    }

    pub fn contains_port(&self, port: u16) -> bool {
        self.ports.contains_key(&port)
    }

    pub fn table(&self, port: u16) -> Option<Arc<PortTable>> {
        self.ports.get(&port).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of one port's groups.
    pub fn groups(&self, port: u16) -> Option<Arc<Vec<Group>>> {
        self.table(port).map(|t| t.snapshot())
    }

    /// First group registered with exactly `path`.
    pub fn group(&self, port: u16, path: &str) -> Option<Group> {
        self.groups(port)?.iter().find(|g| g.path == path).cloned()
    }

    /// All bindings, ordered by port.
    pub fn snapshot(&self) -> Vec<PortBinding> {
        self.ports()
            .into_iter()
            .filter_map(|port| {
                self.groups(port).map(|groups| PortBinding {
                    port,
                    groups: groups.as_ref().clone(),
                })
            })
            .collect()
    }

    pub fn insert_port(&self, port: u16) -> Result<(), RegistryError> {
        let _guard = self.lock();
        if self.ports.contains_key(&port) {
            return Err(RegistryError::PortExists(port));
        }
        self.ports
            .insert(port, Arc::new(PortTable::new(port, Vec::new())));
        Ok(())
    }

    pub fn remove_port(&self, port: u16) -> Result<PortBinding, RegistryError> {
        let _guard = self.lock();
        let (_, table) = self
            .ports
            .remove(&port)
            .ok_or(RegistryError::NoSuchPort(port))?;
        Ok(PortBinding {
            port,
            groups: table.snapshot().as_ref().clone(),
        })
    }

    /// Replace every binding at once (configuration reload).
    ///
    /// Ports that survive keep their table so running listeners observe the
    /// new groups immediately.
    pub fn replace_all(&self, bindings: &[PortBinding]) {
        let _guard = self.lock();
        let wanted: BTreeSet<u16> = bindings.iter().map(|b| b.port).collect();
        self.ports.retain(|port, _| wanted.contains(port));
        for binding in bindings {
            if let Some(table) = self.table(binding.port) {
                table.groups.store(Arc::new(binding.groups.clone()));
            } else {
                self.ports.insert(
                    binding.port,
                    Arc::new(PortTable::new(binding.port, binding.groups.clone())),
                );
            }
        }
    }

    pub fn add_group(&self, port: u16, group: Group) -> Result<(), RegistryError> {
        let _guard = self.lock();
        let table = self.table(port).ok_or(RegistryError::NoSuchPort(port))?;
        let current = table.snapshot();
        if current.iter().any(|g| g.path == group.path) {
            return Err(RegistryError::DuplicateGroup {
                port,
                path: group.path,
            });
        }
        let mut next = current.as_ref().clone();
        next.push(group);
        table.groups.store(Arc::new(next));
        Ok(())
    }

    pub fn remove_group(&self, port: u16, path: &str) -> Result<Group, RegistryError> {
        let _guard = self.lock();
        let table = self.table(port).ok_or(RegistryError::NoSuchPort(port))?;
        let mut next = table.snapshot().as_ref().clone();
        let idx = next
            .iter()
            .position(|g| g.path == path)
            .ok_or_else(|| RegistryError::NoSuchGroup {
                port,
                path: path.to_string(),
            })?;
        let removed = next.remove(idx);
        table.groups.store(Arc::new(next));
        Ok(removed)
    }

    /// Replace a group's backend list.
    ///
    /// The active selection follows the previously active URL: it is
    /// re-pointed to that URL's new position, or cleared if the URL is gone.
    pub fn update_backends(
        &self,
        port: u16,
        path: &str,
        backends: Vec<Backend>,
    ) -> Result<Group, RegistryError> {
        self.update_group(port, path, |group| {
            let active_url = group.active_backend().map(|b| b.url.clone());
            group.current_backend =
                active_url.and_then(|url| backends.iter().position(|b| b.url == url));
            group.backends = backends;
            Ok(())
        })
    }

    /// Set or clear the active backend.
    ///
    /// With `expected_url`, the write only happens if the backend at `index`
    /// still has that URL; this guards an activation whose health check ran
    /// while the list was being edited.
    pub fn set_current(
        &self,
        port: u16,
        path: &str,
        index: Option<usize>,
        expected_url: Option<&str>,
    ) -> Result<Group, RegistryError> {
        self.update_group(port, path, |group| {
            if let Some(index) = index {
                let backend = group.backends.get(index).ok_or(
                    RegistryError::BackendIndexOutOfRange {
                        index,
                        len: group.backends.len(),
                    },
                )?;
                if expected_url.is_some_and(|url| url != backend.url) {
                    return Err(RegistryError::BackendChanged { index });
                }
            }
            group.current_backend = index;
            Ok(())
        })
    }

    /// Read-modify-write of the first group with `path`, under the writer lock.
    fn update_group<F>(&self, port: u16, path: &str, f: F) -> Result<Group, RegistryError>
    where
        F: FnOnce(&mut Group) -> Result<(), RegistryError>,
    {
        let _guard = self.lock();
        let table = self.table(port).ok_or(RegistryError::NoSuchPort(port))?;
        let mut next = table.snapshot().as_ref().clone();
        let group = next
            .iter_mut()
            .find(|g| g.path == path)
            .ok_or_else(|| RegistryError::NoSuchGroup {
                port,
                path: path.to_string(),
            })?;
        f(group)?;
        let updated = group.clone();
        table.groups.store(Arc::new(next));
        Ok(updated)
    }
}
