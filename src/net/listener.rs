//! TCP listener binding.
//!
//! # Responsibilities
//! - Bind one listener per configured port on the configured host
//! - Report bind failures (port in use, permission denied) with the address

use std::net::SocketAddr;

use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind {host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

impl ListenerError {
    pub fn port(&self) -> u16 {
        match self {
            ListenerError::Bind { port, .. } => *port,
        }
    }
}

/// Bind `host:port`. `host` may be an IP literal or a resolvable name.
pub async fn bind_port(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let listener = TcpListener::bind((host, port))
        .await
        .map_err(|source| ListenerError::Bind {
            host: host.to_string(),
            port,
            source,
        })?;

    let local_addr: Option<SocketAddr> = listener.local_addr().ok();
    tracing::info!(
        port,
        address = ?local_addr,
        "Listener bound"
    );

    Ok(listener)
}
