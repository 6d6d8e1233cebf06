//! GeoJSON-shaped geometries and their GeoPackage binary encoding.

use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};

/// A coordinate tuple: x, y and an optional z. Ordinates past z are not encoded.
pub type Position = Vec<f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    fn of_point(x: f64, y: f64) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    pub fn expand(&mut self, other: &Envelope) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }
}

// WKB geometry type codes (ISO 2D; add 1000 for Z)
const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTILINESTRING: u32 = 5;
const WKB_MULTIPOLYGON: u32 = 6;
const WKB_Z_OFFSET: u32 = 1000;

const GPKG_MAGIC: &[u8; 2] = b"GP";
const GPKG_VERSION: u8 = 0;
const FLAG_LITTLE_ENDIAN: u8 = 0b0000_0001;
const FLAG_EMPTY: u8 = 0b0001_0000;

impl Geometry {
    /// Geometry type name as used in `gpkg_geometry_columns`
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "POINT",
            Geometry::MultiPoint(_) => "MULTIPOINT",
            Geometry::LineString(_) => "LINESTRING",
            Geometry::MultiLineString(_) => "MULTILINESTRING",
            Geometry::Polygon(_) => "POLYGON",
            Geometry::MultiPolygon(_) => "MULTIPOLYGON",
        }
    }

    fn for_each_position<F: FnMut(&Position)>(&self, f: &mut F) {
        match self {
            Geometry::Point(p) => {
                if !p.is_empty() {
                    f(p)
                }
            }
            Geometry::MultiPoint(points) | Geometry::LineString(points) => points.iter().for_each(f),
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                lines.iter().flatten().for_each(f)
            }
            Geometry::MultiPolygon(polygons) => polygons.iter().flatten().flatten().for_each(f),
        }
    }

    /// Bounding box, or `None` for an empty geometry
    pub fn envelope(&self) -> Option<Envelope> {
        let mut envelope: Option<Envelope> = None;
        self.for_each_position(&mut |p| {
            if p.len() < 2 {
                return;
            }
            let point = Envelope::of_point(p[0], p[1]);
            envelope = Some(match envelope {
                Some(mut env) => {
                    env.expand(&point);
                    env
                }
                None => point,
            });
        });
        envelope
    }

    fn is_empty(&self) -> bool {
        let mut empty = true;
        self.for_each_position(&mut |_| empty = false);
        empty
    }

    /// Whether any position carries a z ordinate
    pub fn has_z(&self) -> bool {
        let mut z = false;
        self.for_each_position(&mut |p| z |= p.len() > 2);
        z
    }

    fn dimension(&self) -> Dimension {
        if self.has_z() {
            Dimension::Xyz
        } else {
            Dimension::Xy
        }
    }

    /// Little-endian well-known binary, ISO Z codes when any position has a z
    pub fn to_wkb(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(64);
        write_geometry(&mut buf, self, self.dimension())?;
        Ok(buf)
    }

    /// GeoPackage binary: the standard header without envelope followed by WKB.
    pub fn to_gpkg_blob(&self, srs_id: i32) -> Result<Vec<u8>> {
        let mut flags = FLAG_LITTLE_ENDIAN;
        if self.is_empty() {
            flags |= FLAG_EMPTY;
        }

        let mut buf = Vec::with_capacity(72);
        buf.extend_from_slice(GPKG_MAGIC);
        buf.push(GPKG_VERSION);
        buf.push(flags);
        buf.extend_from_slice(&srs_id.to_le_bytes());
        write_geometry(&mut buf, self, self.dimension())?;
        Ok(buf)
    }
}

/// Coordinate dimension shared by every position of one encoded geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Xy,
    Xyz,
}

impl Dimension {
    fn type_code(self, base: u32) -> u32 {
        match self {
            Dimension::Xy => base,
            Dimension::Xyz => base + WKB_Z_OFFSET,
        }
    }

    fn ordinates(self) -> usize {
        match self {
            Dimension::Xy => 2,
            Dimension::Xyz => 3,
        }
    }
}

fn write_header(buf: &mut Vec<u8>, base: u32, dim: Dimension) {
    buf.push(1); // little endian
    buf.extend_from_slice(&dim.type_code(base).to_le_bytes());
}

fn write_count(buf: &mut Vec<u8>, count: usize) -> Result<()> {
    let count = u32::try_from(count)
        .map_err(|_| BackupError::InvalidGeometry(format!("too many parts: {}", count)))?;
    buf.extend_from_slice(&count.to_le_bytes());
    Ok(())
}

/// A position without z in a 3-D geometry gets z = 0.
fn write_position(buf: &mut Vec<u8>, position: &Position, dim: Dimension) -> Result<()> {
    if position.len() < 2 {
        return Err(BackupError::InvalidGeometry(format!(
            "position needs at least two ordinates, got {}",
            position.len()
        )));
    }
    buf.extend_from_slice(&position[0].to_le_bytes());
    buf.extend_from_slice(&position[1].to_le_bytes());
    if dim == Dimension::Xyz {
        let z = position.get(2).copied().unwrap_or(0.0);
        buf.extend_from_slice(&z.to_le_bytes());
    }
    Ok(())
}

/// Point body; an empty point is all NaN ordinates.
fn write_point(buf: &mut Vec<u8>, position: &Position, dim: Dimension) -> Result<()> {
    write_header(buf, WKB_POINT, dim);
    if position.is_empty() {
        for _ in 0..dim.ordinates() {
            buf.extend_from_slice(&f64::NAN.to_le_bytes());
        }
        return Ok(());
    }
    write_position(buf, position, dim)
}

fn write_points(buf: &mut Vec<u8>, points: &[Position], dim: Dimension) -> Result<()> {
    write_count(buf, points.len())?;
    for p in points {
        write_position(buf, p, dim)?;
    }
    Ok(())
}

fn write_rings(buf: &mut Vec<u8>, rings: &[Vec<Position>], dim: Dimension) -> Result<()> {
    write_count(buf, rings.len())?;
    for ring in rings {
        write_points(buf, ring, dim)?;
    }
    Ok(())
}

fn write_geometry(buf: &mut Vec<u8>, geometry: &Geometry, dim: Dimension) -> Result<()> {
    match geometry {
        Geometry::Point(p) => write_point(buf, p, dim),
        Geometry::LineString(points) => {
            write_header(buf, WKB_LINESTRING, dim);
            write_points(buf, points, dim)
        }
        Geometry::Polygon(rings) => {
            write_header(buf, WKB_POLYGON, dim);
            write_rings(buf, rings, dim)
        }
        Geometry::MultiPoint(points) => {
            write_header(buf, WKB_MULTIPOINT, dim);
            write_count(buf, points.len())?;
            for p in points {
                write_point(buf, p, dim)?;
            }
            Ok(())
        }
        Geometry::MultiLineString(lines) => {
            write_header(buf, WKB_MULTILINESTRING, dim);
            write_count(buf, lines.len())?;
            for line in lines {
                write_header(buf, WKB_LINESTRING, dim);
                write_points(buf, line, dim)?;
            }
            Ok(())
        }
        Geometry::MultiPolygon(polygons) => {
            write_header(buf, WKB_MULTIPOLYGON, dim);
            write_count(buf, polygons.len())?;
            for polygon in polygons {
                write_header(buf, WKB_POLYGON, dim);
                write_rings(buf, polygon, dim)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_wkb_layout() {
        let wkb = Geometry::Point(vec![1.0, 2.0]).to_wkb().unwrap();
        assert_eq!(wkb.len(), 21);
        assert_eq!(wkb[0], 1);
        assert_eq!(&wkb[1..5], &1u32.to_le_bytes());
        assert_eq!(&wkb[5..13], &1.0f64.to_le_bytes());
        assert_eq!(&wkb[13..21], &2.0f64.to_le_bytes());
    }

    #[test]
    fn test_gpkg_blob_header() {
        let blob = Geometry::LineString(vec![vec![0.0, 0.0], vec![3.0, 4.0]])
            .to_gpkg_blob(4326)
            .unwrap();
        assert_eq!(&blob[0..2], b"GP");
        assert_eq!(blob[2], 0);
        assert_eq!(blob[3], FLAG_LITTLE_ENDIAN);
        assert_eq!(&blob[4..8], &4326i32.to_le_bytes());
        // header (8) + byte order (1) + type (4) + count (4) + 2 points (32)
        assert_eq!(blob.len(), 49);
    }

    #[test]
    fn test_empty_geometry_sets_flag() {
        let blob = Geometry::MultiPoint(vec![]).to_gpkg_blob(0).unwrap();
        assert_eq!(blob[3], FLAG_LITTLE_ENDIAN | FLAG_EMPTY);
        assert!(Geometry::MultiPoint(vec![]).envelope().is_none());
    }

    #[test]
    fn test_envelope_covers_all_rings() {
        let polygon = Geometry::MultiPolygon(vec![
            vec![vec![vec![0.0, 0.0], vec![2.0, 0.0], vec![2.0, 1.0], vec![0.0, 0.0]]],
            vec![vec![vec![-5.0, 3.0], vec![-4.0, 7.0], vec![-5.0, 3.0]]],
        ]);
        let env = polygon.envelope().unwrap();
        assert_eq!(env, Envelope { min_x: -5.0, min_y: 0.0, max_x: 2.0, max_y: 7.0 });
    }

    #[test]
    fn test_short_position_is_rejected() {
        let err = Geometry::Point(vec![1.0]).to_wkb().unwrap_err();
        assert!(matches!(err, BackupError::InvalidGeometry(_)));
    }

    #[test]
    fn test_point_z_wkb_layout() {
        let point = Geometry::Point(vec![1.0, 2.0, 99.0]);
        assert!(point.has_z());

        let wkb = point.to_wkb().unwrap();
        assert_eq!(wkb.len(), 29);
        assert_eq!(&wkb[1..5], &1001u32.to_le_bytes());
        assert_eq!(&wkb[21..29], &99.0f64.to_le_bytes());
    }

    #[test]
    fn test_mixed_dimension_line_is_encoded_as_z() {
        let line = Geometry::LineString(vec![vec![0.0, 0.0, 5.0], vec![3.0, 4.0]]);
        let wkb = line.to_wkb().unwrap();
        // byte order (1) + type (4) + count (4) + 2 points of 3 ordinates (48)
        assert_eq!(wkb.len(), 57);
        assert_eq!(&wkb[1..5], &1002u32.to_le_bytes());
        assert_eq!(&wkb[25..33], &5.0f64.to_le_bytes());
        assert_eq!(&wkb[49..57], &0.0f64.to_le_bytes());
    }

    #[test]
    fn test_empty_point_is_nan() {
        let point: Geometry = serde_json::from_str(r#"{"type": "Point", "coordinates": []}"#).unwrap();
        assert!(point.envelope().is_none());

        let blob = point.to_gpkg_blob(4326).unwrap();
        assert_eq!(blob[3], FLAG_LITTLE_ENDIAN | FLAG_EMPTY);
        assert_eq!(blob.len(), 8 + 21);
        let x = f64::from_le_bytes(blob[13..21].try_into().unwrap());
        let y = f64::from_le_bytes(blob[21..29].try_into().unwrap());
        assert!(x.is_nan() && y.is_nan());
    }

    #[test]
    fn test_deserialize_geojson_geometry() {
        let json = r#"{"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}"#;
        let geometry: Geometry = serde_json::from_str(json).unwrap();
        assert_eq!(geometry.type_name(), "POLYGON");
    }
}
