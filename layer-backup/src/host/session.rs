//! Layer source backed by a session file.
//!
//! A session file is a JSON document describing the layers a host application has
//! open and which of them are in editing mode. It is re-read on every call so edits
//! to it are visible on the next backup cycle.

use super::geometry::Geometry;
use super::{Feature, FeatureSource, Layer, LayerSource};
use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    #[default]
    Vector,
    Raster,
    Mesh,
}

/// One layer as listed in the session file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLayer {
    pub name: String,

    #[serde(default)]
    pub crs: String,

    #[serde(default)]
    pub kind: LayerKind,

    /// Whether the layer is currently open for editing
    #[serde(default)]
    pub editable: bool,

    /// GeoJSON file holding the layer's features
    pub source: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub layers: Vec<SessionLayer>,
}

/// Lists the editable vector layers of a session file.
#[derive(Debug, Clone)]
pub struct SessionLayerSource {
    path: PathBuf,
}

impl SessionLayerSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_session(&self) -> Result<Session> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            BackupError::LayerSource(format!("cannot read session {}: {}", self.path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    fn resolve(&self, source: &Path) -> PathBuf {
        if source.is_absolute() {
            return source.to_path_buf();
        }
        match self.path.parent() {
            Some(base) => base.join(source),
            None => source.to_path_buf(),
        }
    }
}

impl LayerSource for SessionLayerSource {
    fn list_editable_layers(&self) -> Result<Vec<Layer>> {
        let session = self.read_session()?;

        Ok(session
            .layers
            .into_iter()
            .filter(|l| l.kind == LayerKind::Vector && l.editable)
            .map(|l| {
                let features: Arc<dyn FeatureSource> = Arc::new(GeoJsonFile::new(self.resolve(&l.source)));
                Layer::new(l.name, l.crs, features)
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<GeoJsonFeature>,
}

#[derive(Debug, Deserialize)]
struct GeoJsonFeature {
    #[serde(default)]
    id: Option<Value>,

    #[serde(default)]
    geometry: Option<Geometry>,

    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

/// Features read lazily from a GeoJSON FeatureCollection.
#[derive(Debug, Clone)]
pub struct GeoJsonFile {
    path: PathBuf,
}

impl GeoJsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FeatureSource for GeoJsonFile {
    fn read_features(&self) -> Result<Vec<Feature>> {
        let content = std::fs::read_to_string(&self.path)?;
        let collection: FeatureCollection = serde_json::from_str(&content)?;

        Ok(collection
            .features
            .into_iter()
            .map(|f| Feature {
                // Only integer ids can become primary keys; string ids are dropped
                id: f.id.as_ref().and_then(Value::as_i64),
                geometry: f.geometry,
                properties: f.properties.unwrap_or_default(),
            })
            .collect())
    }
}
