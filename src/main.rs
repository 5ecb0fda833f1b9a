//! sync-core - Operator tool for sync state and batch requests
//!
//! Inspects and resets the persisted sync state, shows the plan the next run
//! would use, and fetches URLs through the batch executor.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use sync_core::batch::{sort_by_submission, BatchExecutor, BatchRequest, BatchSummary};
use sync_core::config::Config;
use sync_core::planner::{IncrementalMode, SyncOverrides, SyncPlanner};
use sync_core::state::{now_ms, SyncStateStore};
use sync_core::telemetry::init_tracing;
use sync_core::transport::TransportClient;

/// sync-core - Concurrent request execution and incremental sync planning
#[derive(Parser, Debug)]
#[command(name = "sync-core")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "SYNC_CORE_CONFIG")]
    config: Option<String>,

    /// Plan a full sync regardless of the recorded state
    #[arg(long, global = true)]
    force_full_sync: bool,

    /// Override the configured incremental mode (enabled, disabled, auto)
    #[arg(long, global = true)]
    incremental_mode: Option<IncrementalMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the plan the next sync run would use
    Plan,
    /// Print the persisted sync state
    State,
    /// Forget the sync watermarks so the next run is a full sync
    Reset,
    /// Fetch URLs through the batch executor
    Fetch {
        /// URLs to GET
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_tracing(&config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting sync-core");

    let store = SyncStateStore::from_config(&config.state);

    match &args.command {
        Command::Plan => {
            let state = store.load().await?;
            let overrides = SyncOverrides {
                force_full_sync: args.force_full_sync,
                incremental_mode: args.incremental_mode,
            };
            let plan = SyncPlanner::new(config.incremental.clone()).plan(
                &state,
                &overrides,
                now_ms(),
            );

            println!("mode:     {}", plan.mode);
            println!("reason:   {}", plan.reason);
            match plan.since_ms {
                Some(since) => println!("since_ms: {}", since),
                None => println!("since_ms: -"),
            }
        }
        Command::State => {
            let state = store.load().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Reset => {
            let mut state = store.load().await?;
            state.reset();
            store.save(&state).await?;
            info!(path = %store.path().display(), "Sync state reset");
        }
        Command::Fetch { urls } => fetch(&config, urls).await?,
    }

    Ok(())
}

async fn fetch(config: &Config, urls: &[String]) -> anyhow::Result<()> {
    let client = TransportClient::new(config.http.clone(), config.retry.clone())?;
    let executor = BatchExecutor::new(Arc::new(client), config.batch.clone());

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    let requests = urls.iter().map(|url| BatchRequest::get(url.as_str())).collect();
    let mut results = executor.execute(&cancel, requests).await;
    sort_by_submission(&mut results);

    for result in &results {
        match &result.outcome {
            Ok(response) => println!(
                "{}\t{}\t{} bytes",
                result.request.url,
                response.status.as_u16(),
                response.body.len()
            ),
            Err(e) => println!("{}\terror\t{}", result.request.url, e),
        }
    }

    let summary = BatchSummary::from_responses(&results);
    if summary.all_succeeded() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{} of {} requests failed ({} cancelled)",
            summary.failed + summary.cancelled,
            summary.total,
            summary.cancelled
        ))
    }
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e)),
    }
}

/// Resolve when Ctrl+C or SIGTERM is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling outstanding requests");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling outstanding requests");
        }
    }
}
