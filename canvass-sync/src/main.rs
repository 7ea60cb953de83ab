//! canvass-sync - submission synchronization service
//!
//! `run` keeps the reconcilers going on their timers until Ctrl-C/SIGTERM.
//! `ingest` pushes one payload through the ingestion pipeline, `reconcile`
//! forces a single pass, and `status` prints the outstanding sync backlog.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use canvass_common::config::TomlConfig;
use canvass_common::{NewSubmission, SubmissionStore};
use canvass_sync::config::SyncSettings;
use canvass_sync::reconcile::{Reconciler, Scheduler};
use canvass_sync::SyncContext;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "canvass-sync")]
#[command(about = "Submission sync and reconciliation service")]
#[command(version)]
struct Args {
    /// Configuration file (overrides CANVASS_CONFIG and the standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the reconcilers on their timers until shutdown
    Run,
    /// Ingest one submission payload (JSON file) and wait for its fan-out
    Ingest { payload: PathBuf },
    /// Run a single reconciler pass
    Reconcile {
        #[arg(value_enum)]
        pass: Pass,
    },
    /// Print outstanding sync work as JSON
    Status,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Pass {
    Unregistered,
    CoverageStatus,
    Mirrors,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load_resolved(args.config.as_deref())
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let level = config.logging.level.trim().to_string();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("canvass_sync={level},canvass_common={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting canvass-sync v{} ({} {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE")
    );
    info!("Database: {}", config.database_path.display());

    match args.command {
        Command::Status => status(&config).await,
        command => {
            let settings = SyncSettings::from_toml(&config).context("Invalid configuration")?;
            let context = SyncContext::connect(&settings)
                .await
                .context("Failed to initialize sync components")?;

            let result = match command {
                Command::Run => run(&context).await,
                Command::Ingest { payload } => ingest(&context, payload).await,
                Command::Reconcile { pass } => reconcile(&context, pass).await,
                Command::Status => Ok(()),
            };

            context.store.close().await;
            result
        }
    }
}

async fn run(context: &SyncContext) -> Result<()> {
    let shutdown = CancellationToken::new();
    let mut scheduler = Scheduler::new(shutdown.clone());
    context.start_reconcilers(&mut scheduler);

    if scheduler.is_empty() {
        warn!("All reconcilers are disabled; nothing to run");
        return Ok(());
    }
    info!("{} reconcilers running", scheduler.len());

    shutdown_signal().await;
    shutdown.cancel();
    scheduler.join().await;

    info!("Shutdown complete");
    Ok(())
}

async fn ingest(context: &SyncContext, path: PathBuf) -> Result<()> {
    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let payload: NewSubmission = serde_json::from_str(&content)
        .with_context(|| format!("Invalid submission payload in {}", path.display()))?;

    let ingested = context
        .pipeline()
        .ingest(payload)
        .await
        .context("Submission was not stored")?;
    println!("{}", ingested.submission.id);

    let report = ingested.fan_out.await.context("Fan-out task failed")?;
    info!(
        submission_id = %report.submission_id,
        all_mirror = ?report.all_mirror,
        fs_mirror = ?report.fs_mirror,
        registration = ?report.registration,
        "Fan-out finished"
    );
    Ok(())
}

async fn reconcile(context: &SyncContext, pass: Pass) -> Result<()> {
    let reconciler: Arc<dyn Reconciler> = match pass {
        Pass::Unregistered => Arc::new(context.unregistered_reconciler()),
        Pass::CoverageStatus => Arc::new(context.coverage_status_reconciler()),
        Pass::Mirrors => Arc::new(context.mirror_reconciler()),
    };

    let shutdown = CancellationToken::new();
    let watcher = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
    };

    let report = reconciler
        .run_once(&shutdown)
        .await
        .with_context(|| format!("{} pass aborted", reconciler.name()))?;
    watcher.abort();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn status(config: &TomlConfig) -> Result<()> {
    let store = SubmissionStore::open(&config.database_path)
        .await
        .context("Failed to open submission store")?;
    let backlog = store.backlog().await.context("Failed to count backlog")?;
    store.close().await;

    println!("{}", serde_json::to_string_pretty(&backlog)?);
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
