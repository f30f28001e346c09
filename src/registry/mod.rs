//! Shared routing state.
//!
//! # Data Flow
//! ```text
//! ProxyConfig.proxies / control API edits
//!     → store.rs (serialized writers, snapshot swap per port)
//!     → port listeners read a snapshot on every request
//! ```
//!
//! # Design Decisions
//! - One registry per process, passed explicitly as `Arc<Registry>`
//! - Raw containers never leave this module; edits go through methods
//! - Invalid edits are rejected before anything is written

pub mod store;

pub use store::{PortTable, Registry, RegistryError};
