//! RPC gateway.
//!
//! Serves a small HTTP front over a directory of logical services, each
//! called through the resilient pipeline.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                     RPC GATEWAY                       │
//!                         │                                                       │
//!   Client request        │  ┌─────────┐    ┌───────────┐    ┌────────────────┐  │
//!   ──────────────────────┼─▶│ gateway │───▶│ directory │───▶│ LogicalService │  │
//!                         │  │ (axum)  │    │           │    │  stage list    │  │
//!                         │  └─────────┘    └───────────┘    └───────┬────────┘  │
//!                         │                                          │           │
//!                         │     Observe → Admission → Breaker → Retry            │
//!                         │                                          │           │
//!                         │                                          ▼           │
//!   Client response       │                      ┌──────────────┐  ┌──────────┐  │
//!   ◀─────────────────────┼──────────────────────│load_balancer │─▶│transport │──┼──▶ Instance
//!                         │                      │ instance set │  │ HTTP/2   │  │
//!                         │                      └──────▲───────┘  └──────────┘  │
//!                         │                             │                        │
//!                         │                      ┌──────┴───────┐                │
//!                         │                      │  discovery   │◀───────────────┼─── Registry
//!                         │                      │  feed        │                │
//!                         │                      └──────────────┘                │
//!                         └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use rpc_gateway::config::load_config;
use rpc_gateway::gateway::GatewayServer;
use rpc_gateway::lifecycle::{build_directory, build_discovery, signals, Shutdown};
use rpc_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "rpc-gateway")]
#[command(about = "HTTP gateway over resilient RPC clients", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rpc-gateway starting");
    tracing::info!(
        config = %args.config.display(),
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        discovery = ?config.discovery.backend,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let discovery = build_discovery(&config)?;
    let directory = Arc::new(build_directory(&config, discovery));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    GatewayServer::new(&config.listener, directory)
        .run(listener, shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
