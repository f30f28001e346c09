//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Port added to the desired set
//!     → listener.rs (bind host:port)
//!     → http/server.rs (serve the port's router)
//!     → connection.rs (count in-flight requests for draining)
//!
//! Listener States:
//!     Starting → Serving → Draining → (gone)
//! ```
//!
//! # Design Decisions
//! - Bind failures are per-port and never affect other listeners
//! - Every request tracked so shutdown can report what it waits on

pub mod connection;
pub mod listener;

pub use connection::{RequestGuard, RequestTracker};
pub use listener::{bind_port, ListenerError};
