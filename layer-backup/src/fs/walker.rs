//! Shallow directory listings.
//!
//! Snapshots are flat: a backup root holds snapshot directories and each snapshot
//! holds layer files. Everything here therefore looks exactly one level deep.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// What kind of entries a listing should return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// An immediate child of a listed directory
#[derive(Debug, Clone)]
pub struct EntryInfo {
    /// Full path to the entry
    pub path: PathBuf,

    /// File name, lossily converted to UTF-8
    pub name: String,
}

impl EntryInfo {
    fn from_entry(entry: &DirEntry) -> Self {
        Self {
            path: entry.path().to_path_buf(),
            name: entry.file_name().to_string_lossy().into_owned(),
        }
    }
}

/// List the immediate children of `root` of the given kind, sorted by name.
///
/// Symbolic links are never followed and never returned, so a caller deleting what it
/// lists cannot reach outside `root`.
pub fn list_children(root: &Path, kind: EntryKind) -> std::io::Result<Vec<EntryInfo>> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry?;
        let file_type = entry.file_type();

        let wanted = match kind {
            EntryKind::Directory => file_type.is_dir(),
            EntryKind::File => file_type.is_file(),
        };
        if wanted {
            entries.push(EntryInfo::from_entry(&entry));
        }
    }

    Ok(entries)
}
