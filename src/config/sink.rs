//! Configuration persistence hooks.
//!
//! The proxy core never writes configuration itself. After a mutation it
//! hands the new state to a [`ConfigSink`] supplied by the embedding
//! application.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::schema::{Group, PortBinding, ProxyConfig};

/// Error returned by a sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Receives the authoritative state after the core mutates it.
pub trait ConfigSink: Send + Sync {
    /// Persist one group on one port (insert or replace by path).
    fn save_group(&self, port: u16, group: &Group) -> Result<(), SinkError>;

    /// Persist the full port → groups mapping.
    fn save_all(&self, proxies: &[PortBinding]) -> Result<(), SinkError>;

    /// Adopt a configuration just loaded from storage, without writing it.
    fn reloaded(&self, _config: &ProxyConfig) {}
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ConfigSink for NoopSink {
    fn save_group(&self, _port: u16, _group: &Group) -> Result<(), SinkError> {
        Ok(())
    }

    fn save_all(&self, _proxies: &[PortBinding]) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes the whole configuration back to a TOML file.
///
/// Keeps a cached copy of the last written config so non-proxy sections
/// (timeouts, admin, ...) survive every save.
#[derive(Debug)]
pub struct TomlFileSink {
    path: PathBuf,
    cache: Mutex<ProxyConfig>,
}

impl TomlFileSink {
    pub fn new(path: impl Into<PathBuf>, config: ProxyConfig) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(config),
        }
    }

    fn write(&self, config: &ProxyConfig) -> Result<(), SinkError> {
        let content = toml::to_string_pretty(config)?;
        // Readers of the file only ever see a complete document.
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = ?self.path, "Configuration saved");
        Ok(())
    }
}

impl ConfigSink for TomlFileSink {
    fn save_group(&self, port: u16, group: &Group) -> Result<(), SinkError> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());

        let idx = match cache.proxies.iter().position(|p| p.port == port) {
            Some(idx) => idx,
            None => {
                cache.proxies.push(PortBinding::new(port));
                cache.proxies.len() - 1
            }
        };
        let groups = &mut cache.proxies[idx].groups;
        match groups.iter_mut().find(|g| g.path == group.path) {
            Some(existing) => *existing = group.clone(),
            None => groups.push(group.clone()),
        }

        self.write(&cache)
    }

    fn save_all(&self, proxies: &[PortBinding]) -> Result<(), SinkError> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.proxies = proxies.to_vec();
        self.write(&cache)
    }

    fn reloaded(&self, config: &ProxyConfig) {
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = config.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::load_config;
    use crate::config::schema::Backend;

    #[test]
    fn save_group_upserts_and_keeps_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portmux.toml");

        let mut config = ProxyConfig::default();
        config.timeouts.upstream_secs = 90;
        let sink = TomlFileSink::new(&path, config);

        let mut group = Group::new("/api").with_backends(vec![Backend::new("http://localhost:9001")]);
        sink.save_group(8080, &group).unwrap();

        group.current_backend = Some(0);
        sink.save_group(8080, &group).unwrap();
        sink.save_group(8080, &Group::new("/web")).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.timeouts.upstream_secs, 90);
        assert_eq!(loaded.proxies.len(), 1);
        assert_eq!(loaded.proxies[0].groups.len(), 2);
        assert_eq!(loaded.proxies[0].groups[0], group);
    }

    #[test]
    fn save_all_replaces_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portmux.toml");
        let sink = TomlFileSink::new(&path, ProxyConfig::default());

        sink.save_group(8080, &Group::new("/api")).unwrap();
        sink.save_all(&[PortBinding::new(9090)]).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.proxies, vec![PortBinding::new(9090)]);
    }
}
