//! Backup scheduler: the Idle/Running state machine around the backup cycle.
//!
//! While running, a timer task fires a cycle every interval. Cycles run on the
//! blocking pool and are serialised by a single async mutex, so a timer tick, the
//! immediate cycle at start and an explicit [`BackupScheduler::tick`] never overlap.
//! Stopping disarms the timer; a cycle already in flight runs to completion.

use crate::executor::{BackupExecutor, CycleOutcome};
use crate::host::{Preferences, SettingsStore, Severity, UserPrompt};
use crate::utils::errors::{BackupError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const MIN_INTERVAL_MINUTES: u32 = 1;
pub const MAX_INTERVAL_MINUTES: u32 = 24 * 60;

/// A validated backup interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    minutes: u32,
    period: Duration,
}

impl Interval {
    pub fn from_minutes(minutes: u32) -> Result<Self> {
        if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&minutes) {
            return Err(BackupError::Config(format!(
                "backup interval must be between {} and {} minutes, got {}",
                MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES, minutes
            )));
        }
        Ok(Self {
            minutes,
            period: Duration::from_secs(u64::from(minutes) * 60),
        })
    }

    /// Interval with an arbitrary timer period, for exercising the timer quickly
    #[cfg(test)]
    pub(crate) fn with_period(period: Duration) -> Self {
        Self { minutes: 1, period }
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
}

/// Which of the two user controls are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub start_enabled: bool,
    pub stop_enabled: bool,
}

impl From<Phase> for ControlState {
    fn from(phase: Phase) -> Self {
        let running = phase == Phase::Running;
        Self {
            start_enabled: !running,
            stop_enabled: running,
        }
    }
}

struct Running {
    directory: PathBuf,
    interval: Interval,
    cancel: CancellationToken,
    ticker: JoinHandle<()>,
}

pub struct BackupScheduler {
    executor: BackupExecutor,
    settings: Arc<dyn SettingsStore>,
    preferences: std::sync::Mutex<Preferences>,
    state: Mutex<Option<Running>>,
    cycle_lock: Arc<Mutex<()>>,
}

impl BackupScheduler {
    /// Create an idle scheduler, loading the saved preferences.
    pub fn new(executor: BackupExecutor, settings: Arc<dyn SettingsStore>) -> Self {
        let preferences = settings.load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load saved backup preferences, using defaults");
            Preferences::default()
        });

        Self {
            executor,
            settings,
            preferences: std::sync::Mutex::new(preferences),
            state: Mutex::new(None),
            cycle_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Last saved (or loaded) preferences, to prefill a start form
    pub fn preferences(&self) -> Preferences {
        self.preferences
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub async fn phase(&self) -> Phase {
        if self.state.lock().await.is_some() {
            Phase::Running
        } else {
            Phase::Idle
        }
    }

    pub async fn is_running(&self) -> bool {
        self.phase().await == Phase::Running
    }

    pub async fn controls(&self) -> ControlState {
        self.phase().await.into()
    }

    /// Backup directory in use while running
    pub async fn current_directory(&self) -> Option<PathBuf> {
        self.state.lock().await.as_ref().map(|r| r.directory.clone())
    }

    pub async fn current_interval(&self) -> Option<Interval> {
        self.state.lock().await.as_ref().map(|r| r.interval)
    }

    /// Validate the user's input and start backing up.
    ///
    /// Configuration errors are pushed to the notifier and returned; the scheduler
    /// then stays idle.
    pub async fn start(&self, directory: &str, interval_minutes: u32) -> Result<()> {
        let interval = match Interval::from_minutes(interval_minutes) {
            Ok(interval) => interval,
            Err(e) => {
                self.executor.notify(e.to_string(), Severity::Error);
                return Err(e);
            }
        };
        self.start_with_interval(directory, interval).await
    }

    pub async fn start_with_interval(&self, directory: &str, interval: Interval) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(BackupError::AlreadyRunning);
        }

        let directory = directory.trim();
        if directory.is_empty() {
            self.executor
                .notify("Select a directory to save the backups.", Severity::Warning);
            return Err(BackupError::Config("backup directory is empty".to_string()));
        }

        let root = PathBuf::from(directory);
        if let Err(e) = ensure_directory(&root) {
            self.executor.notify(
                format!("Could not create the backup directory: {}", e),
                Severity::Error,
            );
            return Err(e);
        }

        let preferences = Preferences {
            backup_directory: directory.to_string(),
            interval_minutes: interval.minutes(),
        };
        if let Err(e) = self.settings.save(&preferences) {
            warn!(error = %e, "Failed to save backup preferences");
        }
        *self.preferences.lock().unwrap_or_else(|e| e.into_inner()) = preferences;

        let cancel = CancellationToken::new();
        let ticker = tokio::spawn(run_ticker(
            self.executor.clone(),
            Arc::clone(&self.cycle_lock),
            root.clone(),
            interval.period(),
            cancel.clone(),
        ));
        *state = Some(Running {
            directory: root.clone(),
            interval,
            cancel,
            ticker,
        });
        drop(state);

        info!(directory = %root.display(), interval_minutes = interval.minutes(), "Automatic backup started");

        // The first snapshot does not wait a full interval
        {
            let _guard = self.cycle_lock.lock().await;
            run_blocking(&self.executor, root).await;
        }

        self.executor
            .notify("Automatic backup started.", Severity::Info);
        Ok(())
    }

    /// Disarm the timer. Returns whether the scheduler was running.
    pub async fn stop(&self) -> bool {
        match self.disarm().await {
            Some(_) => {
                info!("Automatic backup stopped");
                self.executor
                    .notify("Automatic backup stopped.", Severity::Info);
                true
            }
            None => false,
        }
    }

    /// Run one cycle now if running; what the timer does on every tick.
    pub async fn tick(&self) -> Option<CycleOutcome> {
        let directory = self.current_directory().await?;
        let _guard = self.cycle_lock.lock().await;
        // Stopped (or restarted elsewhere) while waiting for another cycle to finish
        if self.current_directory().await.as_ref() != Some(&directory) {
            return None;
        }
        run_blocking(&self.executor, directory).await
    }

    /// The host session is ending: ask whether backups should continue in the
    /// background. Only an explicit "no" stops them.
    pub async fn end_session(&self, prompt: &dyn UserPrompt) {
        if !self.is_running().await {
            return;
        }

        let title = self.executor.options().notify_title.clone();
        match prompt.ask_yes_no(&title, "Keep running backups in the background?") {
            Some(false) => {
                self.disarm().await;
                info!("Automatic backup stopped at session end");
            }
            Some(true) | None => info!("Automatic backup keeps running in the background"),
        }
    }

    /// Stop for good (the host is unloading): disarm the timer and wait for any
    /// in-flight cycle.
    pub async fn shutdown(&self) {
        if let Some(running) = self.disarm().await {
            if let Err(e) = running.ticker.await {
                error!(error = %e, "Backup timer task failed");
            }
        }
        let _guard = self.cycle_lock.lock().await;
        debug!("Backup scheduler shut down");
    }

    async fn disarm(&self) -> Option<Running> {
        let running = self.state.lock().await.take()?;
        running.cancel.cancel();
        Some(running)
    }
}

impl Drop for BackupScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.state.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

/// Make sure the backup root exists as a directory, creating it if needed.
fn ensure_directory(root: &Path) -> Result<()> {
    if root.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(root).map_err(|source| BackupError::DirectoryCreate {
        path: root.to_path_buf(),
        source,
    })
}

async fn run_ticker(
    executor: BackupExecutor,
    cycle_lock: Arc<Mutex<()>>,
    directory: PathBuf,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let _guard = cycle_lock.lock().await;
                // Stopped while waiting for another cycle to finish
                if cancel.is_cancelled() {
                    break;
                }
                debug!("Backup timer fired");
                run_blocking(&executor, directory.clone()).await;
            }
        }
    }

    debug!("Backup timer stopped");
}

/// Run one cycle on the blocking pool. The caller holds the cycle lock.
async fn run_blocking(executor: &BackupExecutor, directory: PathBuf) -> Option<CycleOutcome> {
    let executor = executor.clone();
    match tokio::task::spawn_blocking(move || executor.run_cycle(&directory)).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(error = %e, "Backup cycle panicked");
            None
        }
    }
}
