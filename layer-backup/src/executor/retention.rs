//! Retention: keep only the latest snapshot of each distinct edit set.
//!
//! Snapshots are matched on layer names alone. Two snapshots of the same layers are
//! duplicates even if the features inside differ.

use crate::fs::snapshot::{list_snapshots, EditSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What a purge removed and what it could not.
#[derive(Debug, Default)]
pub struct PurgeReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Delete every snapshot under `root` that represents exactly `current`.
///
/// Failures are logged and reported but never returned: a stale snapshot that cannot
/// be deleted now is picked up again by a later purge.
pub fn purge_matching(root: &Path, current: &EditSet, extension: &str) -> PurgeReport {
    let mut report = PurgeReport::default();

    let snapshots = match list_snapshots(root) {
        Ok(s) => s,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Cannot scan backup directory for previous backups");
            return report;
        }
    };

    for snapshot in snapshots {
        let represented = match snapshot.represented_edit_set(extension) {
            Ok(set) => set,
            Err(e) => {
                warn!(snapshot = %snapshot.name, error = %e, "Cannot read previous backup, leaving it");
                continue;
            }
        };

        if &represented != current {
            continue;
        }

        match std::fs::remove_dir_all(&snapshot.path) {
            Ok(()) => {
                info!(snapshot = %snapshot.name, "Previous backup removed");
                report.removed.push(snapshot.path);
            }
            Err(e) => {
                warn!(snapshot = %snapshot.name, error = %e, "Failed to remove previous backup");
                report.failed.push((snapshot.path, e.to_string()));
            }
        }
    }

    report
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn set(names: &[&str]) -> EditSet {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn make_snapshot(root: &Path, name: &str, layers: &[&str]) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for layer in layers {
            fs::write(dir.join(format!("{}.gpkg", layer)), b"").unwrap();
        }
        dir
    }

    #[test]
    fn test_removes_exact_match_only() -> std::io::Result<()> {
        let root = TempDir::new()?;
        let same = make_snapshot(root.path(), "backup_QGIS-10-04-2025__10-00-00", &["Roads", "Parcels"]);
        let subset = make_snapshot(root.path(), "backup_QGIS-10-04-2025__09-00-00", &["Roads"]);
        let superset = make_snapshot(root.path(), "backup_QGIS-10-04-2025__08-00-00", &["Roads", "Parcels", "Rivers"]);

        let report = purge_matching(root.path(), &set(&["Parcels", "Roads"]), "gpkg");

        assert_eq!(report.removed, vec![same.clone()]);
        assert!(report.failed.is_empty());
        assert!(!same.exists());
        assert!(subset.exists());
        assert!(superset.exists());
        Ok(())
    }

    #[test]
    fn test_removes_every_duplicate() -> std::io::Result<()> {
        let root = TempDir::new()?;
        let a = make_snapshot(root.path(), "backup_QGIS-10-04-2025__10-00-00", &["Roads"]);
        let b = make_snapshot(root.path(), "backup_QGIS-10-04-2025__10-10-00", &["Roads"]);

        let report = purge_matching(root.path(), &set(&["Roads"]), "gpkg");

        assert_eq!(report.removed.len(), 2);
        assert!(!a.exists());
        assert!(!b.exists());
        Ok(())
    }

    #[test]
    fn test_ignores_directories_without_prefix() -> std::io::Result<()> {
        let root = TempDir::new()?;
        let other = make_snapshot(root.path(), "my-roads", &["Roads"]);

        let report = purge_matching(root.path(), &set(&["Roads"]), "gpkg");

        assert!(report.removed.is_empty());
        assert!(other.exists());
        Ok(())
    }

    #[test]
    fn test_only_counts_files_with_extension() -> std::io::Result<()> {
        let root = TempDir::new()?;
        let dir = make_snapshot(root.path(), "backup_QGIS-10-04-2025__10-00-00", &["Roads"]);
        fs::write(dir.join("Parcels.shp"), b"")?;

        let report = purge_matching(root.path(), &set(&["Roads"]), "gpkg");
        assert_eq!(report.removed, vec![dir]);
        Ok(())
    }

    /// Make `dir` read-only. Returns false when the current user can write it anyway.
    #[cfg(unix)]
    pub(crate) fn make_read_only(dir: &Path) -> std::io::Result<bool> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o555))?;
        let check = dir.join(".write-check");
        if fs::write(&check, b"").is_ok() {
            fs::remove_file(&check)?;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o755))?;
            return Ok(false);
        }
        Ok(true)
    }

    #[cfg(unix)]
    pub(crate) fn make_writable(dir: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o755))
    }

    #[cfg(unix)]
    #[test]
    fn test_undeletable_snapshot_is_reported() -> std::io::Result<()> {
        let root = TempDir::new()?;
        let stuck = make_snapshot(root.path(), "backup_QGIS-10-04-2025__09-00-00", &["Roads"]);
        if !make_read_only(&stuck)? {
            // Permissions are not enforced for this user
            return Ok(());
        }

        let report = purge_matching(root.path(), &set(&["Roads"]), "gpkg");
        make_writable(&stuck)?;

        assert!(report.removed.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, stuck);
        assert!(stuck.join("Roads.gpkg").exists());
        Ok(())
    }

    #[test]
    fn test_missing_root_is_a_no_op() {
        let report = purge_matching(Path::new("/nonexistent/backups"), &set(&["Roads"]), "gpkg");
        assert!(report.removed.is_empty());
        assert!(report.failed.is_empty());
    }
}
