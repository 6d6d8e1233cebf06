//! GeoPackage vector writer.
//!
//! Produces a minimal but valid OGC GeoPackage: the three core metadata tables plus
//! one feature table per file, with geometries in GeoPackage binary encoding.

use super::geometry::{Envelope, Geometry};
use super::{Feature, Layer, VectorFormat, VectorWriter, WriteOptions};
use crate::utils::errors::{BackupError, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// `GPKG` in ASCII, the GeoPackage application id
const APPLICATION_ID: i32 = 0x4750_4B47;
/// GeoPackage 1.3.0
const USER_VERSION: i32 = 10300;

const GEOMETRY_COLUMN: &str = "geom";

const CORE_SCHEMA: &str = r#"
CREATE TABLE gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
);
CREATE TABLE gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
INSERT INTO gpkg_spatial_ref_sys VALUES
    ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', 'undefined cartesian coordinate reference system'),
    ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', 'undefined geographic coordinate reference system'),
    ('WGS 84 geodetic', 4326, 'EPSG', 4326,
     'GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]',
     'longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid');
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Integer),
            Value::Number(n) if n.is_i64() => Some(ColumnType::Integer),
            Value::Number(_) => Some(ColumnType::Real),
            Value::String(_) | Value::Array(_) | Value::Object(_) => Some(ColumnType::Text),
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// Writes layers as GeoPackage files through SQLite.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoPackageWriter;

impl GeoPackageWriter {
    pub fn new() -> Self {
        Self
    }
}

impl VectorWriter for GeoPackageWriter {
    fn write(&self, layer: &Layer, destination: &Path, options: &WriteOptions) -> Result<()> {
        if options.format != VectorFormat::GeoPackage {
            return Err(BackupError::UnsupportedFormat(options.format.driver().to_string()));
        }
        if destination.exists() {
            return Err(BackupError::LayerWrite {
                layer: layer.name.clone(),
                detail: format!("{} already exists", destination.display()),
            });
        }

        let features = layer.features.read_features()?;

        let result = write_geopackage(layer, &features, destination, &options.primary_key_field);
        if result.is_err() {
            // Never leave a half-written layer behind
            let _ = std::fs::remove_file(destination);
        }
        result
    }
}

fn write_geopackage(layer: &Layer, features: &[Feature], destination: &Path, pk_field: &str) -> Result<()> {
    let mut conn = Connection::open(destination)?;
    conn.execute_batch(&format!(
        "PRAGMA application_id = {APPLICATION_ID};
         PRAGMA user_version = {USER_VERSION};
         PRAGMA journal_mode = DELETE;
         PRAGMA synchronous = FULL;"
    ))?;
    conn.execute_batch(CORE_SCHEMA)?;

    let srs_id = register_srs(&conn, &layer.crs)?;
    let plan = plan_columns(features, pk_field);
    let geometry_type = geometry_type_name(features);
    let has_z = features
        .iter()
        .any(|f| f.geometry.as_ref().is_some_and(Geometry::has_z));

    let mut definitions = vec![
        format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_ident(pk_field)),
        format!("{} {}", quote_ident(GEOMETRY_COLUMN), geometry_type),
    ];
    definitions.extend(
        plan.columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.ty.sql())),
    );
    let table = quote_ident(&layer.name);
    conn.execute_batch(&format!("CREATE TABLE {} ({});", table, definitions.join(", ")))?;

    let mut column_names = vec![quote_ident(pk_field), quote_ident(GEOMETRY_COLUMN)];
    column_names.extend(plan.columns.iter().map(|c| quote_ident(&c.name)));
    let placeholders = (1..=column_names.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        column_names.join(", "),
        placeholders
    );

    let mut bounds: Option<Envelope> = None;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&insert)?;
        for feature in features {
            let mut values = Vec::with_capacity(column_names.len());
            values.push(plan.key_of(feature).map(SqlValue::Integer).unwrap_or(SqlValue::Null));

            match &feature.geometry {
                Some(geometry) => {
                    if let Some(env) = geometry.envelope() {
                        bounds = Some(match bounds {
                            Some(mut b) => {
                                b.expand(&env);
                                b
                            }
                            None => env,
                        });
                    }
                    values.push(SqlValue::Blob(geometry.to_gpkg_blob(srs_id)?));
                }
                None => values.push(SqlValue::Null),
            }

            for column in &plan.columns {
                values.push(to_sql_value(feature.properties.get(&column.property)));
            }

            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;

    let last_change = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    conn.execute(
        "INSERT INTO gpkg_contents
            (table_name, data_type, identifier, description, last_change, min_x, min_y, max_x, max_y, srs_id)
         VALUES (?1, 'features', ?1, '', ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            layer.name,
            last_change,
            bounds.map(|b| b.min_x),
            bounds.map(|b| b.min_y),
            bounds.map(|b| b.max_x),
            bounds.map(|b| b.max_y),
            srs_id,
        ],
    )?;
    conn.execute(
        "INSERT INTO gpkg_geometry_columns (table_name, column_name, geometry_type_name, srs_id, z, m)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        params![layer.name, GEOMETRY_COLUMN, geometry_type, srs_id, i32::from(has_z)],
    )?;

    debug!(layer = %layer.name, features = features.len(), path = %destination.display(), "GeoPackage written");
    Ok(())
}

/// Make sure the layer's reference system has a row and return its id.
///
/// `EPSG:<code>` maps to that code; anything else is recorded as undefined cartesian.
fn register_srs(conn: &Connection, crs: &str) -> Result<i32> {
    let Some(code) = parse_epsg(crs) else {
        return Ok(-1);
    };

    conn.execute(
        "INSERT OR IGNORE INTO gpkg_spatial_ref_sys
            (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
         VALUES (?1, ?2, 'EPSG', ?2, 'undefined', NULL)",
        params![crs, code],
    )?;
    Ok(code)
}

fn parse_epsg(crs: &str) -> Option<i32> {
    let (authority, code) = crs.trim().split_once(':')?;
    if !authority.eq_ignore_ascii_case("EPSG") {
        return None;
    }
    code.trim().parse().ok()
}

/// One property stored as a table column.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Column {
    /// Key in the feature properties
    property: String,
    /// Column name, unique ignoring ASCII case
    name: String,
    ty: ColumnType,
}

/// How feature properties map onto the feature table.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnPlan {
    /// Property supplying the primary key of features that have no id
    key_property: Option<String>,
    columns: Vec<Column>,
}

impl ColumnPlan {
    fn key_of(&self, feature: &Feature) -> Option<i64> {
        feature.id.or_else(|| {
            self.key_property
                .as_ref()
                .and_then(|key| feature.properties.get(key))
                .and_then(Value::as_i64)
        })
    }
}

/// Property columns in first-seen order, typed from their first non-null value.
///
/// A property named like the primary key becomes the key when it only holds integers
/// that agree with the feature ids. Every other property is kept; names that clash
/// with the key, the geometry column or each other (SQLite ignores ASCII case) get a
/// `_<n>` suffix.
fn plan_columns(features: &[Feature], pk_field: &str) -> ColumnPlan {
    let mut seen: Vec<(String, Option<ColumnType>)> = Vec::new();
    for feature in features {
        for (key, value) in &feature.properties {
            match seen.iter_mut().find(|(name, _)| name == key) {
                Some((_, ty)) => {
                    if ty.is_none() {
                        *ty = ColumnType::of(value);
                    }
                }
                None => seen.push((key.clone(), ColumnType::of(value))),
            }
        }
    }

    let key_property = seen
        .iter()
        .map(|(key, _)| key)
        .find(|key| key.eq_ignore_ascii_case(pk_field) && holds_key(features, key))
        .cloned();

    let mut used: HashSet<String> = [pk_field, GEOMETRY_COLUMN]
        .iter()
        .map(|n| n.to_ascii_lowercase())
        .collect();
    let columns = seen
        .into_iter()
        .filter(|(key, _)| key_property.as_ref() != Some(key))
        .map(|(key, ty)| Column {
            name: unique_name(&key, &mut used),
            property: key,
            ty: ty.unwrap_or(ColumnType::Text),
        })
        .collect();

    ColumnPlan { key_property, columns }
}

/// Whether `key` can stand in for the feature id without losing values
fn holds_key(features: &[Feature], key: &str) -> bool {
    features.iter().all(|f| match f.properties.get(key) {
        None | Some(Value::Null) => true,
        Some(value) => match value.as_i64() {
            Some(v) => f.id.map_or(true, |id| id == v),
            None => false,
        },
    })
}

fn unique_name(key: &str, used: &mut HashSet<String>) -> String {
    let mut name = key.to_string();
    let mut n = 1;
    while !used.insert(name.to_ascii_lowercase()) {
        name = format!("{}_{}", key, n);
        n += 1;
    }
    name
}

fn to_sql_value(value: Option<&Value>) -> SqlValue {
    match value {
        None | Some(Value::Null) => SqlValue::Null,
        Some(Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        Some(other) => SqlValue::Text(other.to_string()),
    }
}

fn geometry_type_name(features: &[Feature]) -> &'static str {
    let mut names = features
        .iter()
        .filter_map(|f| f.geometry.as_ref().map(Geometry::type_name));
    match names.next() {
        Some(first) if names.all(|n| n == first) => first,
        _ => "GEOMETRY",
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
