//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated)
//!     → registry (port → groups) + listener settings
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → ProxyService::apply_config swaps groups and reconciles ports
//!
//! After a runtime mutation:
//!     ProxyService → sink.rs (ConfigSink::save_group / save_all)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The core never chooses a storage format; persistence goes through a sink

pub mod loader;
pub mod schema;
pub mod sink;
pub mod validation;
pub mod watcher;

pub use schema::{
    AdminConfig, Backend, Group, HealthCheckConfig, ObservabilityConfig, PortBinding, ProxyConfig,
    ShutdownConfig, TimeoutConfig,
};
pub use sink::{ConfigSink, NoopSink, SinkError, TomlFileSink};
