//! gridjobd — the GridJob cluster daemon.
//!
//! Single binary that assembles:
//! - Job registry (redb)
//! - In-process cluster with the acknowledging executor
//! - Health monitor
//! - REST API
//!
//! # Usage
//!
//! ```text
//! gridjobd standalone --port 8470 --data-dir /var/lib/gridjob --health-level noisy
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gridjob_cluster::{LocalCluster, NoopExecutor};
use gridjob_core::config::DEFAULT_PORT;
use gridjob_health::{HealthLevel, HealthMonitor};
use gridjob_state::RegistryStore;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "gridjobd", about = "GridJob daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single-node cluster.
    Standalone {
        /// Port to listen on.
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Data directory for the job registry.
        #[arg(long, default_value = "/var/lib/gridjob")]
        data_dir: PathBuf,

        /// Health monitor level: off, silent or noisy.
        #[arg(long, default_value = "silent")]
        health_level: HealthLevel,

        /// Health sample interval in seconds.
        #[arg(long, default_value = "20")]
        health_interval: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,gridjobd=debug,gridjob=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            port,
            data_dir,
            health_level,
            health_interval,
        } => run_standalone(port, data_dir, health_level, health_interval).await,
    }
}

async fn run_standalone(
    port: u16,
    data_dir: PathBuf,
    health_level: HealthLevel,
    health_interval: u64,
) -> anyhow::Result<()> {
    info!("GridJob daemon starting in standalone mode");

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("registry.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = RegistryStore::open(&db_path)?;
    info!(path = ?db_path, "job registry opened");

    let cluster = Arc::new(LocalCluster::new(store, Arc::new(NoopExecutor))?);
    let resumed = cluster.list_jobs()?.len();
    info!(jobs = resumed, "cluster initialized");

    let active = Arc::clone(&cluster);
    let monitor = HealthMonitor::new(health_level, Duration::from_secs(health_interval))
        .with_active_jobs(Arc::new(move || active.active_jobs()))
        .start();

    // ── Start API server ───────────────────────────────────────

    let router = gridjob_api::build_router(Arc::clone(&cluster));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    if let Some(monitor) = monitor {
        monitor.stop().await;
    }

    info!("GridJob daemon stopped");
    Ok(())
}
