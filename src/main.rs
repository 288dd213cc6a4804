use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ledgerlens::config::{self, Settings};
use ledgerlens::db::Database;
use ledgerlens::models::PassSummary;
use ledgerlens::services::paperless::PaperlessClient;
use ledgerlens::services::reconcile::Reconciler;

#[derive(Parser)]
#[command(name = config::APP_NAME, version = config::APP_VERSION)]
#[command(about = "Anomaly detection and tag reconciliation for Paperless-ngx documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the long-lived daemon: new-document polling, periodic tag sync,
    /// and modification rechecks.
    Run,
    /// One full detect-and-sync pass over documents modified since the last
    /// poll.
    Scan,
    /// One full detect-and-sync pass over every remote document.
    Backfill,
    /// Re-project stored results onto remote tags without re-running
    /// detection.
    SyncTags,
    /// Re-detect documents modified remotely since their last processing.
    RecheckModified,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    info!(
        version = config::APP_VERSION,
        remote = %settings.paperless_base_url,
        "starting {}",
        config::APP_NAME
    );

    if let Some(parent) = settings.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = Arc::new(Mutex::new(Database::new(&settings.database_path)?));
    let client = PaperlessClient::new(&settings);
    let reconciler = Reconciler::new(db, client, settings.clone());

    match cli.command {
        Command::Run => run_daemon(&reconciler, &settings).await,
        Command::Scan => report("scan", reconciler.scan_new().await),
        Command::Backfill => report("backfill", reconciler.backfill_all().await),
        Command::SyncTags => report("sync-tags", reconciler.sync_tags().await),
        Command::RecheckModified => {
            report("recheck-modified", reconciler.recheck_modified().await)
        }
    }
}

fn report(name: &str, result: Result<PassSummary>) -> Result<()> {
    let summary = result?;
    println!("{name}: {summary}");
    Ok(())
}

/// Drive the three cadences from one task so passes never overlap: a slow
/// pass delays the next tick instead of running concurrently against the
/// same documents.
async fn run_daemon(reconciler: &Reconciler, settings: &Settings) -> Result<()> {
    info!(
        poll_secs = settings.polling_interval.as_secs(),
        sync_secs = settings.tag_sync_interval.as_secs(),
        recheck_secs = settings.recheck_interval.as_secs(),
        "scheduler started"
    );

    let mut poll = tokio::time::interval(settings.polling_interval);
    let mut tag_sync = tokio::time::interval(settings.tag_sync_interval);
    let mut recheck = tokio::time::interval(settings.recheck_interval);
    for interval in [&mut poll, &mut tag_sync, &mut recheck] {
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Consume the immediate first tick; startup work is the scan below.
        interval.tick().await;
    }

    log_pass("scan", reconciler.scan_new().await);

    loop {
        tokio::select! {
            _ = poll.tick() => log_pass("scan", reconciler.scan_new().await),
            _ = tag_sync.tick() => log_pass("tag sync", reconciler.sync_tags().await),
            _ = recheck.tick() => log_pass("modification recheck", reconciler.recheck_modified().await),
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

fn log_pass(name: &str, result: Result<PassSummary>) {
    match result {
        Ok(summary) => info!(%summary, "{name} pass finished"),
        Err(e) => error!(error = %e, "{name} pass aborted"),
    }
}
