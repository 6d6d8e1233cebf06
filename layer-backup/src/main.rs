//! layer-backup - Main entry point
//!
//! Backs up the editable layers of a session file on a timer until interrupted.

use anyhow::{bail, Context, Result};
use clap::Parser;
use layer_backup::daemon::shutdown::ShutdownCoordinator;
use layer_backup::host::clock::LocalClock;
use layer_backup::host::gpkg::GeoPackageWriter;
use layer_backup::host::notifier::LogNotifier;
use layer_backup::host::session::SessionLayerSource;
use layer_backup::host::settings::SqliteSettingsStore;
use layer_backup::host::Host;
use layer_backup::{utils, BackupExecutor, BackupScheduler, Config, CycleOutcome};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Session file listing the open layers (overrides config)
    #[arg(short, long, value_name = "FILE")]
    session: Option<PathBuf>,

    /// Backup directory (defaults to the last one used)
    #[arg(short, long, value_name = "DIR")]
    directory: Option<String>,

    /// Minutes between backups (defaults to the last one used)
    #[arg(short, long, value_name = "MINUTES")]
    interval: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run a single backup and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(session) = args.session {
        config.session.file = Some(session);
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!("Starting layer-backup v{}", env!("CARGO_PKG_VERSION"));

    let session_file = config
        .session
        .file
        .clone()
        .context("no session file: pass --session or set [session] file")?;

    let host = Host {
        layers: Arc::new(SessionLayerSource::new(session_file)),
        writer: Arc::new(GeoPackageWriter::new()),
        notifier: Arc::new(LogNotifier::new()),
        clock: Arc::new(LocalClock::new()),
    };
    let executor = BackupExecutor::new(host, config.cycle_options()?);

    let settings = SqliteSettingsStore::open(&config.settings.path).with_context(|| {
        format!(
            "failed to open settings database {}",
            config.settings.path.display()
        )
    })?;
    let scheduler = BackupScheduler::new(executor.clone(), Arc::new(settings));

    let saved = scheduler.preferences();
    let directory = args.directory.unwrap_or(saved.backup_directory);
    let interval = args.interval.unwrap_or(saved.interval_minutes);

    if args.once {
        let directory = directory.trim();
        if directory.is_empty() {
            bail!("no backup directory: pass --directory");
        }
        let root = PathBuf::from(directory);
        let outcome = tokio::task::spawn_blocking(move || executor.run_cycle(&root)).await?;
        return match outcome {
            CycleOutcome::Aborted { snapshot, error } => {
                bail!("backup {} aborted: {}", snapshot.display(), error)
            }
            CycleOutcome::NothingToBackUp | CycleOutcome::Completed(_) => Ok(()),
        };
    }

    scheduler.start(&directory, interval).await?;
    tracing::info!(directory = %directory.trim(), interval_minutes = interval, "Backing up until interrupted");

    // Wait for shutdown signal
    let shutdown_coordinator = ShutdownCoordinator::new();
    shutdown_coordinator.wait_for_signal().await;

    // Let an in-flight backup finish
    scheduler.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}
