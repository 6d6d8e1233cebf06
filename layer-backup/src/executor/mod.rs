//! Backup cycle executor.
//!
//! One cycle takes the layers currently open for editing and turns them into a fresh
//! snapshot directory:
//! - fetch the edit set from the layer source (nothing to do when it is empty)
//! - purge earlier snapshots of exactly the same edit set
//! - create the new timestamped snapshot directory
//! - write every layer into it, each failure isolated to its layer
//! - notify the user
//!
//! A cycle never returns an error. Every failure is logged and summarised in the
//! [`CycleOutcome`] so the scheduler keeps ticking.

pub mod retention;

use crate::fs::snapshot::{edit_set, snapshot_dir_name};
use crate::host::{Host, Layer, Notification, Severity, WriteOptions};
use crate::utils::errors::{BackupError, Result};
use retention::purge_matching;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Settings that shape every cycle.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub write: WriteOptions,

    /// Title of the notifications pushed to the user
    pub notify_title: String,

    /// How long notifications stay visible, in seconds
    pub notify_duration_secs: u32,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            write: WriteOptions::default(),
            notify_title: "Auto Backup".to_string(),
            notify_duration_secs: 5,
        }
    }
}

/// A layer that could not be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerFailure {
    pub layer: String,
    pub error: String,
}

/// Summary of a cycle that produced a snapshot.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub snapshot: PathBuf,
    pub written: Vec<String>,
    pub failed: Vec<LayerFailure>,
    pub purged: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// No layer was open for editing; the file system was not touched
    NothingToBackUp,

    /// The snapshot directory could not be created; no layer was written
    Aborted { snapshot: PathBuf, error: String },

    Completed(CycleReport),
}

impl CycleOutcome {
    pub fn snapshot(&self) -> Option<&Path> {
        match self {
            CycleOutcome::Completed(report) => Some(&report.snapshot),
            _ => None,
        }
    }
}

/// Runs backup cycles against a host.
#[derive(Clone)]
pub struct BackupExecutor {
    host: Host,
    options: CycleOptions,
}

impl BackupExecutor {
    pub fn new(host: Host, options: CycleOptions) -> Self {
        Self { host, options }
    }

    pub fn options(&self) -> &CycleOptions {
        &self.options
    }

    /// Push a notification titled after this executor's options
    pub fn notify(&self, message: impl Into<String>, severity: Severity) {
        self.host.notifier.notify(Notification {
            title: self.options.notify_title.clone(),
            message: message.into(),
            severity,
            duration_secs: self.options.notify_duration_secs,
        });
    }

    /// Run one full cycle into `root`. Blocks until every layer is written.
    pub fn run_cycle(&self, root: &Path) -> CycleOutcome {
        let layers = match self.host.layers.list_editable_layers() {
            Ok(layers) => layers,
            Err(e) => {
                error!(error = %e, "Failed to list layers in editing mode, no backup created");
                return CycleOutcome::NothingToBackUp;
            }
        };

        if layers.is_empty() {
            info!("No layers in editing mode, no backup created");
            return CycleOutcome::NothingToBackUp;
        }

        let current = edit_set(&layers);
        let extension = self.options.write.format.extension();

        let purge = purge_matching(root, &current, extension);

        let dir_name = snapshot_dir_name(self.host.clock.now());
        let snapshot = root.join(&dir_name);
        if let Err(e) = create_snapshot_dir(root, &snapshot) {
            error!(snapshot = %snapshot.display(), error = %e, "Failed to create backup directory");
            return CycleOutcome::Aborted {
                snapshot,
                error: e.to_string(),
            };
        }

        info!(snapshot = %dir_name, layers = layers.len(), "Writing backup");

        let mut report = CycleReport {
            snapshot,
            purged: purge.removed,
            ..Default::default()
        };

        for layer in &layers {
            match self.write_layer(layer, &report.snapshot) {
                Ok(()) => report.written.push(layer.name.clone()),
                Err(e) => {
                    error!(layer = %layer.name, error = %e, "Failed to save layer");
                    report.failed.push(LayerFailure {
                        layer: layer.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            snapshot = %dir_name,
            written = report.written.len(),
            failed = report.failed.len(),
            purged = report.purged.len(),
            "Backup cycle finished"
        );
        self.notify(format!("Backup created in {}", dir_name), Severity::Success);

        CycleOutcome::Completed(report)
    }

    fn write_layer(&self, layer: &Layer, snapshot: &Path) -> Result<()> {
        let file_name = layer_file_name(&layer.name, self.options.write.format.extension())?;
        self.host
            .writer
            .write(layer, &snapshot.join(file_name), &self.options.write)
    }
}

/// Create the snapshot directory, which must not exist yet. Missing parents are created.
fn create_snapshot_dir(root: &Path, snapshot: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(root)?;
    std::fs::create_dir(snapshot)
}

/// `<layer-name>.<extension>`, refusing names that are not a single path component.
fn layer_file_name(name: &str, extension: &str) -> Result<String> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if invalid {
        return Err(BackupError::LayerWrite {
            layer: name.to_string(),
            detail: "layer name cannot be used as a file name".to_string(),
        });
    }
    Ok(format!("{}.{}", name, extension))
}
