//! channel-managerd - control-plane daemon for a multi-channel live
//! streaming system.
//!
//! Loads the declared channel catalog, bootstraps the lifecycle manager and
//! health/metrics supervisors, and serves the HTTP control API until a
//! shutdown signal arrives.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use streamcore::{bootstrap_services, start_server, TaskSpawner, TokioSpawner};
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// channel-managerd - multi-channel live stream control plane.
#[derive(Parser, Debug)]
#[command(name = "channel-managerd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the channel catalog (YAML).
    #[arg(short, long, value_name = "FILE", env = "CHANNELD_CONFIG", default_value = "channels.yaml")]
    config: PathBuf,

    /// Log filter, e.g. "info" or "streamcore=debug,warn".
    #[arg(short, long, default_value = "info", env = "CHANNELD_LOG_LEVEL")]
    log_level: String,

    /// Path to the `pipeline-role` binary the lifecycle manager spawns.
    #[arg(long, value_name = "PATH", env = "CHANNELD_ROLE_BINARY", default_value = "pipeline-role")]
    role_binary: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(&args.log_level)).init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "channel-managerd starting");

    let services =
        bootstrap_services(&args.config, args.role_binary.clone()).with_context(|| format!("failed to bootstrap from {}", args.config.display()))?;

    tracing::info!(channels = services.catalog.names().count(), bind_addr = %services.ctx.bind_addr(), "services bootstrapped");

    let spawner = TokioSpawner::current();
    services.spawn_background_tasks(&spawner);

    let app_state = services.app_state();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            tracing::error!(error = %e, "HTTP server exited with an error");
        }
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received");

    server_handle.abort();
    tracing::info!("shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
