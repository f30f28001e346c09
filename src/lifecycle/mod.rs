//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Init logging/metrics → Build service → Start listeners
//!     → Admin API → Config watcher
//!
//! Listeners (server_set.rs):
//!     desired ports → plan_reconcile → start / drain per port
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Drain listeners → Stop background tasks → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Ordered shutdown: drain listeners, then stop admin and reload loop
//! - Draining has a grace period: stragglers are aborted after it

pub mod server_set;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use server_set::{ListenerFactory, ListenerHandle, ListenerState, ServerSet};
pub use shutdown::Shutdown;
pub use startup::{init_observability, launch, Running, StartupError};
