//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Per request (http/server.rs):
//!     TraceLayer span carrying the port and the client's x-request-id
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - The proxy never adds request IDs; a client's ID reaches the upstream untouched
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
