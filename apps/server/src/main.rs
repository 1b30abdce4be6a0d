//! Mediagate Server - standalone headless binary for the media streaming
//! gateway.
//!
//! Exposes the authenticated, range-aware download surface and stream
//! telemetry endpoints over plain HTTP, suitable for running as a background
//! service behind a reverse proxy.

mod config;
mod upstream_stub;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mediagate_core::{bootstrap_services, start_server, AppState};
use tokio::signal;

use crate::config::ServerConfig;
use crate::upstream_stub::UnconfiguredUpstreamClient;

/// Mediagate Server - headless media streaming gateway.
#[derive(Parser, Debug)]
#[command(name = "mediagate-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "MEDIAGATE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "MEDIAGATE_BIND_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Mediagate Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.bind_port = port;
    }

    log::info!(
        "Configuration: bind_port={}, prefetch={}, parallelism={}, clients={}",
        config.bind_port,
        config.parallel,
        config.pre_fetch,
        config.client_dc_map.len(),
    );

    if config.client_dc_map.is_empty() {
        log::warn!(
            "No client_dc_map entries configured; the upstream client is unconfigured and \
             every download request will fail until a real wire-protocol client is wired in"
        );
    }

    let core_config = config.to_core_config();
    let upstream = Arc::new(UnconfiguredUpstreamClient::new(&core_config.client_dc_map));
    let services = bootstrap_services(core_config, upstream, None);

    let app_state = AppState::builder().from_services(&services).build();

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.bind_port));
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, addr).await {
            log::error!("Server error: {e}");
        }
    });

    log::info!("HTTP server started on port {}", config.bind_port);

    shutdown_signal().await;

    log::info!("Shutdown signal received, draining in-flight streams...");

    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
