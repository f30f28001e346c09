//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, timeouts, backend indices)
//! - Report ambiguous routing (duplicate group paths) as warnings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - The same group/port checks guard the runtime control API

use std::collections::HashSet;

use crate::config::schema::{Group, PortBinding, ProxyConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("port 0 is not a valid listening port")]
    InvalidPort,

    #[error("port {0} is bound more than once")]
    DuplicatePort(u16),

    #[error("group on port {port} has an empty path")]
    EmptyPath { port: u16 },

    #[error("group path {path:?} on port {port} must start with '/'")]
    RelativePath { port: u16, path: String },

    #[error("group {path:?} on port {port}: current_backend {index} is out of range ({len} backends)")]
    CurrentOutOfRange {
        port: u16,
        path: String,
        index: usize,
        len: usize,
    },

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

/// Validate a whole configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.connect_secs"));
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.upstream_secs"));
    }
    if config.health_check.timeout_ms == 0 {
        errors.push(ValidationError::ZeroValue("health_check.timeout_ms"));
    }

    let mut seen_ports = HashSet::new();
    for binding in &config.proxies {
        if let Err(e) = validate_port(binding.port) {
            errors.push(e);
        }
        if !seen_ports.insert(binding.port) {
            errors.push(ValidationError::DuplicatePort(binding.port));
        }
        for group in &binding.groups {
            if let Err(e) = validate_group(binding.port, group) {
                errors.push(e);
            }
        }
        for path in duplicate_paths(binding) {
            tracing::warn!(
                port = binding.port,
                path = %path,
                "Duplicate group path; the first registered group wins"
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Reject port 0. Every other `u16` is a valid listening port.
pub fn validate_port(port: u16) -> Result<(), ValidationError> {
    if port == 0 {
        return Err(ValidationError::InvalidPort);
    }
    Ok(())
}

/// Check a single group's path and active index.
pub fn validate_group(port: u16, group: &Group) -> Result<(), ValidationError> {
    if group.path.is_empty() {
        return Err(ValidationError::EmptyPath { port });
    }
    if !group.path.starts_with('/') {
        return Err(ValidationError::RelativePath {
            port,
            path: group.path.clone(),
        });
    }
    if let Some(index) = group.current_backend {
        if index >= group.backends.len() {
            return Err(ValidationError::CurrentOutOfRange {
                port,
                path: group.path.clone(),
                index,
                len: group.backends.len(),
            });
        }
    }
    Ok(())
}

/// Paths registered more than once on the same port.
pub fn duplicate_paths(binding: &PortBinding) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for group in &binding.groups {
        if !seen.insert(group.path.as_str()) && !duplicates.contains(&group.path) {
            duplicates.push(group.path.clone());
        }
    }
    duplicates
}
