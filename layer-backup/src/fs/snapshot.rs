//! Snapshot directories: naming, discovery and the edit set each one represents.
//!
//! A snapshot directory is named `backup_QGIS-<DD-MM-YYYY__HH-MM-SS>` after the moment
//! it was created and holds one `<layer-name>.<ext>` file per layer. There is no
//! manifest: the file stems inside a snapshot are the record of which layers it covers.

use super::walker::{list_children, EntryKind};
use crate::host::Layer;
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

pub const SNAPSHOT_PREFIX: &str = "backup_QGIS-";

/// `chrono` format of the timestamp part of a snapshot name
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y__%H-%M-%S";

/// The set of layer names open for editing at one moment.
pub type EditSet = BTreeSet<String>;

/// Build the edit set of a list of layers.
pub fn edit_set<'a, I>(layers: I) -> EditSet
where
    I: IntoIterator<Item = &'a Layer>,
{
    layers.into_iter().map(|l| l.name.clone()).collect()
}

/// Directory name for a snapshot created at `timestamp`.
pub fn snapshot_dir_name(timestamp: NaiveDateTime) -> String {
    format!("{}{}", SNAPSHOT_PREFIX, timestamp.format(TIMESTAMP_FORMAT))
}

/// Creation timestamp encoded in a snapshot directory name.
pub fn parse_snapshot_name(name: &str) -> Option<NaiveDateTime> {
    let stamp = name.strip_prefix(SNAPSHOT_PREFIX)?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}

/// An existing snapshot directory under a backup root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub path: PathBuf,
    pub name: String,
}

impl Snapshot {
    /// Creation time from the directory name, if it follows the naming scheme
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        parse_snapshot_name(&self.name)
    }

    /// Names of the layers this snapshot holds: the stems of its `.<extension>` files.
    pub fn represented_edit_set(&self, extension: &str) -> io::Result<EditSet> {
        let files = list_children(&self.path, EntryKind::File)?;

        Ok(files
            .iter()
            .filter(|f| f.path.extension().is_some_and(|e| e == extension))
            .filter_map(|f| f.path.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .collect())
    }
}

/// Snapshot directories directly under `root`, sorted by name.
///
/// Any subdirectory whose name starts with [`SNAPSHOT_PREFIX`] counts, even when the
/// rest of the name does not parse. A missing root simply has no snapshots.
pub fn list_snapshots(root: &Path) -> io::Result<Vec<Snapshot>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    Ok(list_children(root, EntryKind::Directory)?
        .into_iter()
        .filter(|d| d.name.starts_with(SNAPSHOT_PREFIX))
        .map(|d| Snapshot {
            path: d.path,
            name: d.name,
        })
        .collect())
}
