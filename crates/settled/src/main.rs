//! settled — the RollSettle daemon.
//!
//! Single binary that assembles the rollout-settle detector:
//! - Record store (redb)
//! - Event reducer behind an HTTP notification ingress
//! - Reconciler loop applying the settle policy
//! - Follow-up job rendering + task-runner submission
//!
//! # Usage
//!
//! ```text
//! settled run --port 8787
//! ```
//!
//! Everything else is environment-configured; see [`config::Config`].

mod config;
mod ingress;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use rollsettle_action::{submit_job, JobConfig};
use rollsettle_reconcile::{ActionCallback, Reconciler};
use rollsettle_reducer::{AttributeCapture, EventReducer};
use rollsettle_state::RecordStore;

use crate::config::Config;
use crate::ingress::IngressState;

#[derive(Parser)]
#[command(name = "settled", about = "RollSettle daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the detector: ingress, reconciler, and follow-up wiring.
    Run {
        /// Port the notification ingress listens on.
        #[arg(long, default_value = "8787")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,settled=debug,rollsettle=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { port } => run(port).await,
    }
}

async fn run(port: u16) -> anyhow::Result<()> {
    info!("RollSettle daemon starting");

    let config = Config::from_env();
    info!(
        settle_window_secs = config.settle_window_secs,
        stale_window_secs = config.stale_window_secs,
        reconcile_interval_secs = config.reconcile_interval_secs,
        captured_attributes = ?config.captured_attribute_names,
        store = ?config.record_store_location,
        "configuration loaded"
    );

    // ── Record store ───────────────────────────────────────────

    if let Some(parent) = config.record_store_location.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = RecordStore::open(&config.record_store_location)?;
    info!(path = ?config.record_store_location, "record store opened");

    // ── Event reducer ──────────────────────────────────────────

    let capture = AttributeCapture::new(config.captured_attribute_names.clone());
    let reducer = EventReducer::new(store.clone(), capture);
    info!("event reducer initialized");

    // ── Reconciler + follow-up action ──────────────────────────

    let mut reconciler = Reconciler::new(store.clone(), config.windows())
        .with_action_timeout(config.action_timeout());

    match &config.action_endpoint {
        Some(endpoint) => {
            reconciler = reconciler.with_action(job_submitter(
                endpoint.clone(),
                JobConfig::from_env(),
                config.action_timeout(),
            ));
            info!(%endpoint, "follow-up job submission enabled");
        }
        None => {
            warn!("ACTION_ENDPOINT not set — settled rollouts are logged only");
        }
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Reconciler loop ────────────────────────────────────────

    let interval = config.reconcile_interval();
    let reconciler_handle = tokio::spawn(async move {
        reconciler.run(interval, shutdown_rx).await;
    });

    // ── Notification ingress ───────────────────────────────────

    let router = ingress::build_router(IngressState {
        store,
        reducer,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "notification ingress starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C; the reconciler finishes its in-flight
    // tick before the process exits.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = reconciler_handle.await;

    info!("RollSettle daemon stopped");
    Ok(())
}

/// Wire the job renderer and HTTP submitter into an action callback.
fn job_submitter(
    endpoint: String,
    job_config: JobConfig,
    timeout: std::time::Duration,
) -> ActionCallback {
    Arc::new(move |request| {
        let endpoint = endpoint.clone();
        let payload = job_config.render(&request);
        Box::pin(async move { submit_job(&endpoint, &payload, timeout).await })
    })
}
