//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (port, path, query)
//!     → router.rs (registry snapshot → first matching group → active backend)
//!     → rewrite.rs (strip prefix, resolve against backend URL)
//!     → Return: RouteTarget or RouteError
//! ```
//!
//! # Design Decisions
//! - Routes are data in the registry, not compiled matchers
//! - No regex in hot path (plain prefix test)
//! - Deterministic: same snapshot and path always match the same group
//! - First match wins (registration order)

pub mod rewrite;
pub mod router;

pub use rewrite::RewriteError;
pub use router::{RouteError, RouteTarget, Router};
