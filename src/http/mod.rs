//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection on a proxy port
//!     → server.rs (Axum setup, per-request span, catch-all handler)
//!     → [routing layer resolves group, backend, upstream URL]
//!     → request.rs (strip Host and hop-by-hop headers)
//!     → forward.rs (single upstream attempt, bounded by timeouts)
//!     → response.rs (relay stream, or structured error)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use forward::{ForwardError, Forwarder};
pub use response::{error_response, ErrorCode, X_PROXY_ERROR};
pub use server::{build_router, HttpListenerFactory, PortState};
