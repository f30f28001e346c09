//! portmux
//!
//! A reconfigurable multi-port HTTP reverse proxy built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────────┐
//!                        │                     PORTMUX                        │
//!                        │                                                    │
//!   Client Request       │  ┌──────────┐   ┌─────────┐   ┌───────────────┐   │
//!   ─────────────────────┼─▶│ listener │──▶│  http   │──▶│   routing     │   │
//!        (port N)        │  │ (port N) │   │ server  │   │ group→backend │   │
//!                        │  └──────────┘   └─────────┘   └───────┬───────┘   │
//!                        │                                       ▼           │
//!   Client Response      │                ┌─────────┐   ┌───────────────┐   │
//!   ◀────────────────────┼────────────────│response │◀──│   forwarder   │◀──┼── Backend
//!                        │                └─────────┘   └───────────────┘   │
//!                        │                                                    │
//!                        │  ┌──────────────────────────────────────────────┐ │
//!                        │  │ registry ◀── control service ◀── admin API   │ │
//!                        │  │     ▲              │                         │ │
//!                        │  │  watcher      server set / health checker    │ │
//!                        │  └──────────────────────────────────────────────┘ │
//!                        └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use portmux::config::loader::load_config;
use portmux::lifecycle::{init_observability, launch};

#[derive(Parser)]
#[command(name = "portmux")]
#[command(about = "Multi-port HTTP reverse proxy", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "portmux.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    init_observability(&config)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        ports = config.proxies.len(),
        bind_host = %config.bind_host,
        upstream_timeout_secs = config.timeouts.upstream_secs,
        "portmux starting"
    );

    let running = launch(config, Some(args.config.as_path())).await?;
    running.run_until_signal().await?;
    Ok(())
}
