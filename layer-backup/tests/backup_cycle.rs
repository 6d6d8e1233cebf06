//! End-to-end backup cycles through the public API.

use chrono::{NaiveDate, NaiveDateTime};
use layer_backup::fs::snapshot::{list_snapshots, parse_snapshot_name, EditSet};
use layer_backup::host::clock::LocalClock;
use layer_backup::host::gpkg::GeoPackageWriter;
use layer_backup::host::session::SessionLayerSource;
use layer_backup::host::{
    Clock, Feature, FeatureSource, Host, Layer, LayerSource, Notification, Notifier, Severity,
    VectorWriter, WriteOptions,
};
use layer_backup::{BackupError, BackupExecutor, CycleOptions, CycleOutcome, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct NoFeatures;

impl FeatureSource for NoFeatures {
    fn read_features(&self) -> Result<Vec<Feature>> {
        Ok(Vec::new())
    }
}

/// Layer names the test can swap between cycles
#[derive(Default)]
struct EditableLayers(Mutex<Vec<String>>);

impl EditableLayers {
    fn set(&self, names: &[&str]) {
        *self.0.lock().unwrap() = names.iter().map(|s| s.to_string()).collect();
    }
}

impl LayerSource for EditableLayers {
    fn list_editable_layers(&self) -> Result<Vec<Layer>> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|n| Layer::new(n.clone(), "EPSG:4326", Arc::new(NoFeatures)))
            .collect())
    }
}

/// Creates an empty file per layer, failing for the listed names
#[derive(Default)]
struct TouchWriter {
    failing: Vec<String>,
}

impl VectorWriter for TouchWriter {
    fn write(&self, layer: &Layer, destination: &Path, _options: &WriteOptions) -> Result<()> {
        if self.failing.contains(&layer.name) {
            return Err(BackupError::LayerWrite {
                layer: layer.name.clone(),
                detail: "disk full".to_string(),
            });
        }
        fs::write(destination, b"")?;
        Ok(())
    }
}

#[derive(Default)]
struct Inbox(Mutex<Vec<Notification>>);

impl Notifier for Inbox {
    fn notify(&self, n: Notification) {
        self.0.lock().unwrap().push(n);
    }
}

/// Returns the queued timestamps in order, repeating the last one
struct ScriptedClock(Mutex<Vec<NaiveDateTime>>);

impl ScriptedClock {
    fn new(times: Vec<NaiveDateTime>) -> Self {
        Self(Mutex::new(times.into_iter().rev().collect()))
    }
}

impl Clock for ScriptedClock {
    fn now(&self) -> NaiveDateTime {
        let mut times = self.0.lock().unwrap();
        if times.len() > 1 {
            times.pop().unwrap()
        } else {
            times[0]
        }
    }
}

fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 4, 10)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

struct Harness {
    executor: BackupExecutor,
    layers: Arc<EditableLayers>,
    inbox: Arc<Inbox>,
    root: TempDir,
}

fn harness(writer: TouchWriter, times: Vec<NaiveDateTime>) -> Harness {
    let layers = Arc::new(EditableLayers::default());
    let inbox = Arc::new(Inbox::default());
    let host = Host {
        layers: layers.clone(),
        writer: Arc::new(writer),
        notifier: inbox.clone(),
        clock: Arc::new(ScriptedClock::new(times)),
    };
    Harness {
        executor: BackupExecutor::new(host, CycleOptions::default()),
        layers,
        inbox,
        root: TempDir::new().unwrap(),
    }
}

fn snapshot_names(root: &Path) -> Vec<String> {
    list_snapshots(root)
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect()
}

fn set(names: &[&str]) -> EditSet {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn unchanged_layers_keep_one_snapshot() {
    let h = harness(TouchWriter::default(), vec![at(10, 0, 0), at(10, 10, 0)]);
    h.layers.set(&["Roads", "Parcels"]);

    let first = h.executor.run_cycle(h.root.path());
    let first_dir = first.snapshot().unwrap().to_path_buf();
    assert_eq!(
        first_dir.file_name().unwrap(),
        "backup_QGIS-10-04-2025__10-00-00"
    );
    assert!(first_dir.join("Roads.gpkg").exists());
    assert!(first_dir.join("Parcels.gpkg").exists());

    let second = h.executor.run_cycle(h.root.path());
    let CycleOutcome::Completed(report) = second else {
        panic!("second cycle did not complete");
    };

    assert_eq!(report.purged, vec![first_dir.clone()]);
    assert!(!first_dir.exists());
    assert_eq!(
        snapshot_names(h.root.path()),
        vec!["backup_QGIS-10-04-2025__10-10-00"]
    );
    let remaining = &list_snapshots(h.root.path()).unwrap()[0];
    assert_eq!(
        remaining.represented_edit_set("gpkg").unwrap(),
        set(&["Parcels", "Roads"])
    );
}

#[test]
fn different_layer_sets_are_both_kept() {
    let h = harness(TouchWriter::default(), vec![at(10, 0, 0), at(10, 10, 0)]);

    h.layers.set(&["Roads"]);
    h.executor.run_cycle(h.root.path());
    h.layers.set(&["Roads", "Parcels"]);
    h.executor.run_cycle(h.root.path());

    assert_eq!(
        snapshot_names(h.root.path()),
        vec![
            "backup_QGIS-10-04-2025__10-00-00",
            "backup_QGIS-10-04-2025__10-10-00"
        ]
    );
}

#[test]
fn no_editable_layers_touches_nothing() {
    let h = harness(TouchWriter::default(), vec![at(10, 0, 0)]);
    let root = h.root.path().join("backups");

    let outcome = h.executor.run_cycle(&root);

    assert!(matches!(outcome, CycleOutcome::NothingToBackUp));
    assert!(!root.exists());
    assert!(h.inbox.0.lock().unwrap().is_empty());
}

#[test]
fn one_failing_layer_does_not_stop_the_others() {
    let writer = TouchWriter {
        failing: vec!["Roads".to_string()],
    };
    let h = harness(writer, vec![at(10, 0, 0)]);
    h.layers.set(&["Roads", "Parcels"]);

    let CycleOutcome::Completed(report) = h.executor.run_cycle(h.root.path()) else {
        panic!("cycle did not complete");
    };

    assert_eq!(report.written, vec!["Parcels".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].layer, "Roads");
    assert!(report.snapshot.join("Parcels.gpkg").exists());
    assert!(!report.snapshot.join("Roads.gpkg").exists());

    let inbox = h.inbox.0.lock().unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].severity, Severity::Success);
    assert!(inbox[0].message.contains("backup_QGIS-10-04-2025__10-00-00"));
}

#[test]
fn snapshot_name_parses_back_within_the_cycle() {
    let layers = Arc::new(EditableLayers::default());
    layers.set(&["Roads"]);
    let host = Host {
        layers,
        writer: Arc::new(TouchWriter::default()),
        notifier: Arc::new(Inbox::default()),
        clock: Arc::new(LocalClock::new()),
    };
    let executor = BackupExecutor::new(host, CycleOptions::default());
    let root = TempDir::new().unwrap();

    let before = chrono::Local::now().naive_local();
    let outcome = executor.run_cycle(root.path());
    let after = chrono::Local::now().naive_local();

    let name = outcome
        .snapshot()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .unwrap()
        .to_string();
    let stamp = parse_snapshot_name(&name).unwrap();

    // Names have second resolution
    assert!(stamp >= before - chrono::Duration::seconds(1));
    assert!(stamp <= after);
}

fn write_session(dir: &Path) -> PathBuf {
    fs::write(
        dir.join("roads.geojson"),
        r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "id": 1,
                 "geometry": {"type": "LineString", "coordinates": [[0, 0], [2, 1]]},
                 "properties": {"name": "Main", "lanes": 2}},
                {"type": "Feature", "id": 2,
                 "geometry": {"type": "LineString", "coordinates": [[1, 1], [3, 4]]},
                 "properties": {"name": "High", "lanes": 4}}
            ]
        }"#,
    )
    .unwrap();

    let session = dir.join("session.json");
    fs::write(
        &session,
        r#"{"layers": [
            {"name": "Roads", "crs": "EPSG:4326", "editable": true, "source": "roads.geojson"},
            {"name": "Rivers", "crs": "EPSG:4326", "editable": false, "source": "rivers.geojson"}
        ]}"#,
    )
    .unwrap();
    session
}

#[test]
fn session_layers_are_written_as_geopackages() {
    let work = TempDir::new().unwrap();
    let session = write_session(work.path());
    let inbox = Arc::new(Inbox::default());
    let host = Host {
        layers: Arc::new(SessionLayerSource::new(session)),
        writer: Arc::new(GeoPackageWriter::new()),
        notifier: inbox.clone(),
        clock: Arc::new(ScriptedClock::new(vec![at(10, 0, 0)])),
    };
    let executor = BackupExecutor::new(host, CycleOptions::default());
    let root = work.path().join("backups");

    let CycleOutcome::Completed(report) = executor.run_cycle(&root) else {
        panic!("cycle did not complete");
    };

    assert_eq!(report.written, vec!["Roads".to_string()]);
    assert!(report.failed.is_empty());
    let file = root.join("backup_QGIS-10-04-2025__10-00-00").join("Roads.gpkg");
    assert!(file.exists());
    assert!(!report.snapshot.join("Rivers.gpkg").exists());

    let conn = rusqlite::Connection::open(&file).unwrap();
    let application_id: i64 = conn
        .query_row("PRAGMA application_id", [], |r| r.get(0))
        .unwrap();
    assert_eq!(application_id, 0x4750_4B47);

    let rows: Vec<(i64, String, i64)> = conn
        .prepare("SELECT id, name, lanes FROM \"Roads\" ORDER BY id")
        .unwrap()
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .collect::<std::result::Result<_, _>>()
        .unwrap();
    assert_eq!(
        rows,
        vec![(1, "Main".to_string(), 2), (2, "High".to_string(), 4)]
    );

    let (min_x, max_y): (f64, f64) = conn
        .query_row(
            "SELECT min_x, max_y FROM gpkg_contents WHERE table_name = 'Roads'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!((min_x, max_y), (0.0, 4.0));
}
