//! # Concord Node
//!
//! Runs one cluster node: holds the local keystore, publishes hashes of
//! consistent secure settings while it is the coordinator, and checks its
//! own values against the published hashes.
//!
//! ## Architecture
//! ```text
//! keystore → Settings → ConsistentSettingsService ⇄ LocalCluster (metadata)
//!                               ↓
//!                     /ready, /status, /hashes
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use concord_common::NodeRole;
use concord_common::constants::DEFAULT_CONFIG_PATH;

mod config;
mod routes;
mod state;

use config::AppConfig;
use state::{AppState, consistency_worker};

/// Node role given on the command line
#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    Coordinator,
    Follower,
}

impl From<RoleArg> for NodeRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Coordinator => NodeRole::Coordinator,
            RoleArg::Follower => NodeRole::Follower,
        }
    }
}

/// Concord Node - consistent secure settings
#[derive(Parser, Debug)]
#[command(name = "concord-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Node ID (overrides config)
    #[arg(long, env = "NODE_ID")]
    node_id: Option<String>,

    /// Node role (overrides config)
    #[arg(long, value_enum, env = "NODE_ROLE")]
    role: Option<RoleArg>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up .env before clap reads env fallbacks
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!(
        "🔐 Starting Concord node v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;
    info!("📋 Configuration loaded from {}", args.config);

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // Initialize application state
    let state = AppState::new(config.clone())?;
    info!(
        node_id = %state.node_id,
        role = ?config.role,
        declarations = state.service.declarations().len(),
        "✅ Consistent settings service ready"
    );

    // Coordinators elect themselves, which publishes this term's hashes
    state.start_role().await?;

    // Spawn periodic consistency check
    let worker_state = state.clone();
    let worker_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        consistency_worker(worker_state, worker_shutdown).await;
    });

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("🚀 Concord listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("🛑 Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("👋 Concord shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
