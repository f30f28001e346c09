//! portmux: a reconfigurable multi-port HTTP reverse proxy.
//!
//! Each configured port runs its own listener. Requests are routed by path
//! prefix to a group, and each group forwards to its one manually chosen
//! active backend.

pub mod admin;
pub mod config;
pub mod control;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod registry;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use control::{ControlError, ProxyService};
pub use lifecycle::Shutdown;
