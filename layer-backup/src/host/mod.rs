//! Interfaces to the application hosting the backups.
//!
//! The scheduler never talks to a GIS application directly. It enumerates layers,
//! writes them, persists preferences and reports status through the traits below,
//! so any host (or a test fake) can drive it.

pub mod clock;
pub mod geometry;
pub mod gpkg;
pub mod notifier;
pub mod session;
pub mod settings;

use crate::utils::errors::Result;
use chrono::NaiveDateTime;
use geometry::Geometry;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A single feature of a vector layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feature {
    /// Feature id, when the source carries an integer one
    pub id: Option<i64>,

    pub geometry: Option<Geometry>,

    pub properties: Map<String, Value>,
}

/// Read access to the features of a layer.
pub trait FeatureSource: Send + Sync {
    fn read_features(&self) -> Result<Vec<Feature>>;
}

/// A vector layer that is currently open for editing.
#[derive(Clone)]
pub struct Layer {
    pub name: String,

    /// Coordinate reference, as an authority string such as `EPSG:4326`
    pub crs: String,

    pub features: Arc<dyn FeatureSource>,
}

impl Layer {
    pub fn new(name: impl Into<String>, crs: impl Into<String>, features: Arc<dyn FeatureSource>) -> Self {
        Self {
            name: name.into(),
            crs: crs.into(),
            features,
        }
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("crs", &self.crs)
            .finish_non_exhaustive()
    }
}

/// Enumerates the layers currently open for editing.
///
/// Implementations filter to editable vector layers themselves and must reflect the
/// editing state at call time.
pub trait LayerSource: Send + Sync {
    fn list_editable_layers(&self) -> Result<Vec<Layer>>;
}

/// Output formats understood by a [`VectorWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VectorFormat {
    #[default]
    GeoPackage,
}

impl VectorFormat {
    /// Driver name, as written in configuration
    pub fn driver(&self) -> &'static str {
        match self {
            VectorFormat::GeoPackage => "GPKG",
        }
    }

    /// File extension of the produced files, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            VectorFormat::GeoPackage => "gpkg",
        }
    }
}

impl std::str::FromStr for VectorFormat {
    type Err = crate::utils::errors::BackupError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GPKG" | "GEOPACKAGE" => Ok(VectorFormat::GeoPackage),
            other => Err(crate::utils::errors::BackupError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Options passed to every layer write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    pub format: VectorFormat,

    /// Name of the primary key column in the output table
    pub primary_key_field: String,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            format: VectorFormat::GeoPackage,
            primary_key_field: "id".to_string(),
        }
    }
}

/// Serializes one layer into one output file.
pub trait VectorWriter: Send + Sync {
    fn write(&self, layer: &Layer, destination: &Path, options: &WriteOptions) -> Result<()>;
}

/// The two preferences persisted across sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub backup_directory: String,
    pub interval_minutes: u32,
}

pub const DEFAULT_INTERVAL_MINUTES: u32 = 10;

impl Default for Preferences {
    fn default() -> Self {
        Self {
            backup_directory: String::new(),
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }
}

pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Preferences>;

    fn save(&self, preferences: &Preferences) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Success,
}

/// A short status message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub duration_secs: u32,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Source of the timestamps used to name snapshots.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Asks the user a yes/no question. `None` means the question went unanswered.
pub trait UserPrompt: Send + Sync {
    fn ask_yes_no(&self, title: &str, question: &str) -> Option<bool>;
}

/// The collaborators a backup cycle needs, bundled for sharing across tasks.
#[derive(Clone)]
pub struct Host {
    pub layers: Arc<dyn LayerSource>,
    pub writer: Arc<dyn VectorWriter>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}
