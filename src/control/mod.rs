//! Control subsystem.
//!
//! # Data Flow
//! ```text
//! Admin API / config reload / embedding application
//!     → service.rs (validate → registry edit → sink)
//!     → health checker (activation, test-all)
//!     → lifecycle ServerSet (reconcile)
//! ```

pub mod error;
pub mod service;

pub use error::ControlError;
pub use service::ProxyService;
