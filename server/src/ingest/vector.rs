//! GeoJSON vector ingestion
//!
//! Every feature is converted to the set of cells it touches and emitted
//! as one row per (feature, cell), carrying the feature's properties.
//! Points index directly, lines are densified every `line_step_meters`,
//! and polygons go through the polyfill chain.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use arrow_array::{ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use geo_types::{Coord, Geometry, Polygon};
use geojson::{Feature, GeoJson, JsonObject, JsonValue};
use h3o::{CellIndex, Resolution};
use tracing::{debug, info, warn};

use crate::grid::{
    GeoPolygon, GridIndexer, NativeTier, PolyfillChain, Position, SampledTier, SamplerSettings,
};
use crate::table::{CELL_COLUMN, TableError};

use super::types::IngestError;

/// Rough length of one degree at the equator, used to densify lines
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Upper bound on interpolated points for a single line
pub const MAX_LINE_POINTS: usize = 1_000_000;

#[derive(Debug, Clone)]
pub struct VectorIngestOptions {
    pub resolution: Resolution,
    /// Spacing of interpolated points along lines
    pub line_step_meters: f64,
    /// Only ingest the first N features
    pub max_features: Option<usize>,
    /// Sampler used when the native polyfill fails
    pub sampler: SamplerSettings,
}

impl Default for VectorIngestOptions {
    fn default() -> Self {
        Self {
            resolution: Resolution::Nine,
            line_step_meters: 50.0,
            max_features: None,
            sampler: SamplerSettings {
                max_samples: 1_000_000,
                base_step_deg: 0.0007,
            },
        }
    }
}

impl VectorIngestOptions {
    /// Reject settings that cannot drive line densification.
    pub fn validate(&self) -> Result<(), IngestError> {
        check_line_step(self.line_step_meters)
    }
}

fn check_line_step(step_meters: f64) -> Result<(), IngestError> {
    if step_meters.is_finite() && step_meters > 0.0 {
        Ok(())
    } else {
        Err(IngestError::InvalidInput(format!(
            "line step must be a positive number of meters, got {}",
            step_meters
        )))
    }
}

/// Read the features of a GeoJSON document (collection, feature or bare
/// geometry).
pub fn read_features(path: &Path) -> Result<Vec<Feature>, IngestError> {
    let text = std::fs::read_to_string(path)?;
    let features = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![Feature::from(geometry)],
    };
    info!("Loaded {} features from {:?}", features.len(), path);
    Ok(features)
}

/// Converts geometries to cells
pub struct GeometryIndexer<'a> {
    indexer: &'a dyn GridIndexer,
    chain: PolyfillChain,
    resolution: Resolution,
    line_step_meters: f64,
}

impl<'a> GeometryIndexer<'a> {
    pub fn new(indexer: &'a dyn GridIndexer, options: &VectorIngestOptions) -> Self {
        Self {
            indexer,
            chain: PolyfillChain::new(vec![
                Box::new(NativeTier),
                Box::new(SampledTier {
                    settings: options.sampler.clone(),
                }),
            ]),
            resolution: options.resolution,
            line_step_meters: options.line_step_meters,
        }
    }

    /// Cells covered by a geometry, sorted
    pub fn cells(&self, geometry: &Geometry<f64>) -> Result<Vec<CellIndex>, IngestError> {
        let mut out = BTreeSet::new();
        self.collect(geometry, &mut out)?;
        Ok(out.into_iter().collect())
    }

    fn collect(&self, geometry: &Geometry<f64>, out: &mut BTreeSet<CellIndex>) -> Result<(), IngestError> {
        match geometry {
            Geometry::Point(p) => self.point(p.0, out)?,
            Geometry::MultiPoint(mp) => {
                for p in mp {
                    self.point(p.0, out)?;
                }
            }
            Geometry::Line(line) => self.line(&[line.start, line.end], out)?,
            Geometry::LineString(ls) => self.line(&ls.0, out)?,
            Geometry::MultiLineString(mls) => {
                for ls in mls {
                    self.line(&ls.0, out)?;
                }
            }
            Geometry::Polygon(polygon) => self.polygon(polygon, out)?,
            Geometry::MultiPolygon(mp) => {
                for polygon in mp {
                    self.polygon(polygon, out)?;
                }
            }
            Geometry::Rect(rect) => self.polygon(&rect.to_polygon(), out)?,
            Geometry::Triangle(tri) => self.polygon(&tri.to_polygon(), out)?,
            Geometry::GeometryCollection(gc) => {
                for g in gc {
                    self.collect(g, out)?;
                }
            }
        }
        Ok(())
    }

    fn point(&self, c: Coord<f64>, out: &mut BTreeSet<CellIndex>) -> Result<(), IngestError> {
        out.insert(self.indexer.latlng_to_cell(c.y, c.x, self.resolution)?);
        Ok(())
    }

    fn line(&self, coords: &[Coord<f64>], out: &mut BTreeSet<CellIndex>) -> Result<(), IngestError> {
        for c in densify_line(coords, self.line_step_meters)? {
            self.point(c, out)?;
        }
        Ok(())
    }

    fn polygon(&self, polygon: &Polygon<f64>, out: &mut BTreeSet<CellIndex>) -> Result<(), IngestError> {
        fn ring(ls: &geo_types::LineString<f64>) -> Vec<Position> {
            ls.0.iter().map(|c| [c.x, c.y]).collect()
        }
        let polygon = GeoPolygon::new(
            ring(polygon.exterior()),
            polygon.interiors().iter().map(ring).collect(),
        )?;
        let outcome = self.chain.run(self.indexer, &polygon, self.resolution)?;
        out.extend(outcome.cells);
        Ok(())
    }
}

/// Evenly spaced points along a line, endpoints included.
///
/// The point count is `max(1, floor(length_deg * 111320 / step)) + 1`;
/// a zero-length line yields its first vertex. Non-positive steps and
/// lines needing more than `MAX_LINE_POINTS` points are rejected.
pub fn densify_line(coords: &[Coord<f64>], step_meters: f64) -> Result<Vec<Coord<f64>>, IngestError> {
    check_line_step(step_meters)?;
    let Some(&first) = coords.first() else {
        return Ok(Vec::new());
    };
    let segments: Vec<f64> = coords
        .windows(2)
        .map(|w| (w[1].x - w[0].x).hypot(w[1].y - w[0].y))
        .collect();
    let length: f64 = segments.iter().sum();
    if length <= 0.0 || !length.is_finite() {
        return Ok(vec![first]);
    }

    let intervals = (length * METERS_PER_DEGREE / step_meters).floor();
    if intervals >= MAX_LINE_POINTS as f64 {
        return Err(IngestError::InvalidInput(format!(
            "line of {:.0} m needs more than {} points at a {} m step",
            length * METERS_PER_DEGREE,
            MAX_LINE_POINTS,
            step_meters
        )));
    }
    let n = (intervals as usize).max(1);
    Ok((0..=n)
        .map(|i| interpolate(coords, &segments, length * i as f64 / n as f64))
        .collect())
}

fn interpolate(coords: &[Coord<f64>], segments: &[f64], distance: f64) -> Coord<f64> {
    let mut remaining = distance;
    for (i, &seg) in segments.iter().enumerate() {
        if remaining <= seg && seg > 0.0 {
            let t = remaining / seg;
            let (a, b) = (coords[i], coords[i + 1]);
            return Coord {
                x: a.x + (b.x - a.x) * t,
                y: a.y + (b.y - a.y) * t,
            };
        }
        remaining -= seg;
    }
    coords[coords.len() - 1]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Boolean,
    Int64,
    Float64,
    Utf8,
}

fn infer_kind<'v>(values: impl Iterator<Item = Option<&'v JsonValue>>) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for value in values.flatten() {
        let this = match value {
            JsonValue::Null => continue,
            JsonValue::Bool(_) => ColumnKind::Boolean,
            JsonValue::Number(n) if n.is_i64() => ColumnKind::Int64,
            JsonValue::Number(_) => ColumnKind::Float64,
            _ => return ColumnKind::Utf8,
        };
        kind = Some(match (kind, this) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ColumnKind::Int64 | ColumnKind::Float64), ColumnKind::Int64 | ColumnKind::Float64) => {
                ColumnKind::Float64
            }
            _ => return ColumnKind::Utf8,
        });
    }
    kind.unwrap_or(ColumnKind::Utf8)
}

fn as_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Accumulates (cell, properties) rows and builds the vector table
#[derive(Debug, Default)]
pub struct VectorTableBuilder {
    cells: Vec<String>,
    /// Index into `properties` for each row
    owners: Vec<usize>,
    properties: Vec<JsonObject>,
    columns: Vec<String>,
    seen: HashMap<String, usize>,
}

impl VectorTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one feature's cells; each cell becomes a row
    pub fn push_feature(&mut self, cells: &[CellIndex], properties: JsonObject) {
        for key in properties.keys() {
            if key == CELL_COLUMN {
                continue;
            }
            if !self.seen.contains_key(key) {
                self.seen.insert(key.clone(), self.columns.len());
                self.columns.push(key.clone());
            }
        }
        let owner = self.properties.len();
        self.properties.push(properties);
        for cell in cells {
            self.cells.push(cell.to_string());
            self.owners.push(owner);
        }
    }

    pub fn num_rows(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn values<'s>(&'s self, column: &'s str) -> impl Iterator<Item = Option<&'s JsonValue>> + 's {
        self.owners
            .iter()
            .map(move |&owner| self.properties[owner].get(column))
    }

    pub fn finish(&self) -> Result<RecordBatch, TableError> {
        let mut fields = vec![Field::new(CELL_COLUMN, DataType::Utf8, false)];
        let mut arrays: Vec<ArrayRef> = vec![Arc::new(
            self.cells.iter().map(|c| Some(c.as_str())).collect::<StringArray>(),
        )];

        for name in &self.columns {
            let kind = infer_kind(self.values(name));
            let array: ArrayRef = match kind {
                ColumnKind::Boolean => Arc::new(
                    self.values(name)
                        .map(|v| v.and_then(JsonValue::as_bool))
                        .collect::<BooleanArray>(),
                ),
                ColumnKind::Int64 => Arc::new(
                    self.values(name)
                        .map(|v| v.and_then(JsonValue::as_i64))
                        .collect::<Int64Array>(),
                ),
                ColumnKind::Float64 => Arc::new(
                    self.values(name)
                        .map(|v| v.and_then(JsonValue::as_f64))
                        .collect::<Float64Array>(),
                ),
                ColumnKind::Utf8 => Arc::new(
                    self.values(name)
                        .map(|v| v.and_then(as_text))
                        .collect::<StringArray>(),
                ),
            };
            fields.push(Field::new(name, array.data_type().clone(), true));
            arrays.push(array);
        }

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }
}

/// Convert features to the vector cell table.
///
/// Features without a geometry, or whose geometry cannot be indexed, are
/// skipped with a warning.
pub fn features_to_table(
    indexer: &dyn GridIndexer,
    features: Vec<Feature>,
    options: &VectorIngestOptions,
) -> Result<RecordBatch, IngestError> {
    options.validate()?;
    let geometry_indexer = GeometryIndexer::new(indexer, options);
    let limit = options.max_features.unwrap_or(usize::MAX);
    let mut builder = VectorTableBuilder::new();
    let mut skipped = 0usize;

    for (i, feature) in features.into_iter().take(limit).enumerate() {
        let Some(geometry) = feature.geometry else {
            skipped += 1;
            continue;
        };
        let geometry: Geometry<f64> = match geometry.try_into() {
            Ok(g) => g,
            Err(e) => {
                warn!("Feature {}: unsupported geometry: {}", i, e);
                skipped += 1;
                continue;
            }
        };
        match geometry_indexer.cells(&geometry) {
            Ok(cells) => {
                debug!("Feature {}: {} cells", i, cells.len());
                builder.push_feature(&cells, feature.properties.unwrap_or_default());
            }
            Err(e) => {
                warn!("Feature {}: cannot index geometry: {}", i, e);
                skipped += 1;
            }
        }
    }

    if builder.is_empty() {
        return Err(IngestError::Empty("no cells generated".to_string()));
    }
    info!("Generated {} rows ({} features skipped)", builder.num_rows(), skipped);
    Ok(builder.finish()?)
}

/// Read a GeoJSON file and convert it to the vector cell table.
pub fn ingest_vector(
    indexer: &dyn GridIndexer,
    path: &Path,
    options: &VectorIngestOptions,
) -> Result<RecordBatch, IngestError> {
    let features = read_features(path)?;
    features_to_table(indexer, features, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::H3oIndexer;
    use crate::table::string_values;
    use serde_json::json;
    use geo_types::polygon;

    fn feature(geometry: JsonValue, properties: JsonValue) -> Feature {
        serde_json::from_value(json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": properties,
        }))
        .unwrap()
    }

    #[test]
    fn test_densify_counts() {
        let line = [Coord { x: 0.0, y: 0.0 }, Coord { x: 0.01, y: 0.0 }];
        // 0.01 deg * 111320 m / 50 m = 22.26 -> 22 intervals
        let pts = densify_line(&line, 50.0).unwrap();
        assert_eq!(pts.len(), 23);
        assert_eq!(pts[0], line[0]);
        assert!((pts[22].x - 0.01).abs() < 1e-12);

        let short = densify_line(&line, 1e9).unwrap();
        assert_eq!(short.len(), 2);

        let degenerate = densify_line(&[line[0], line[0]], 50.0).unwrap();
        assert_eq!(degenerate, vec![line[0]]);
        assert!(densify_line(&[], 50.0).unwrap().is_empty());
    }

    #[test]
    fn test_densify_rejects_bad_step() {
        let line = [Coord { x: 0.0, y: 0.0 }, Coord { x: 0.01, y: 0.0 }];
        for step in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(
                matches!(densify_line(&line, step), Err(IngestError::InvalidInput(_))),
                "step {} accepted",
                step
            );
        }
    }

    #[test]
    fn test_densify_rejects_runaway_point_count() {
        let line = [Coord { x: 0.0, y: 0.0 }, Coord { x: 10.0, y: 0.0 }];
        assert!(matches!(
            densify_line(&line, 1e-3),
            Err(IngestError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_features_to_table_rejects_zero_line_step() {
        let features = vec![feature(
            json!({"type": "LineString", "coordinates": [[-46.64, -23.55], [-46.63, -23.55]]}),
            json!({"name": "road"}),
        )];
        let options = VectorIngestOptions {
            line_step_meters: 0.0,
            ..Default::default()
        };
        let err = features_to_table(&H3oIndexer::new(), features, &options).unwrap_err();
        assert!(matches!(err, IngestError::InvalidInput(_)));
    }

    #[test]
    fn test_interpolate_across_vertices() {
        let line = [
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
        ];
        let pts = densify_line(&line, METERS_PER_DEGREE).unwrap();
        assert_eq!(pts.len(), 3);
        assert!((pts[1].x - 1.0).abs() < 1e-12 && pts[1].y.abs() < 1e-12);
        assert!((pts[2].y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_infer_kind() {
        let vals = [json!(1), json!(2)];
        assert_eq!(infer_kind(vals.iter().map(Some)), ColumnKind::Int64);
        let vals = [json!(1), json!(2.5), JsonValue::Null];
        assert_eq!(infer_kind(vals.iter().map(Some)), ColumnKind::Float64);
        let vals = [json!(true), json!(false)];
        assert_eq!(infer_kind(vals.iter().map(Some)), ColumnKind::Boolean);
        let vals = [json!(true), json!(1)];
        assert_eq!(infer_kind(vals.iter().map(Some)), ColumnKind::Utf8);
        assert_eq!(infer_kind(std::iter::once(None)), ColumnKind::Utf8);
    }

    #[test]
    fn test_features_to_table() {
        let features = vec![
            feature(
                json!({"type": "Point", "coordinates": [-43.94, -19.92]}),
                json!({"name": "plaza", "pop": 10, "flag": true}),
            ),
            feature(
                json!({"type": "LineString", "coordinates": [[-43.95, -19.92], [-43.93, -19.92]]}),
                json!({"name": "road", "pop": 2.5, "meta": {"lanes": 2}}),
            ),
            feature(
                json!({"type": "Polygon", "coordinates": [[
                    [-43.96, -19.94], [-43.95, -19.94], [-43.95, -19.93],
                    [-43.96, -19.93], [-43.96, -19.94]
                ]]}),
                json!({"name": "park", "cell_h3": "ignored"}),
            ),
        ];
        let batch = features_to_table(&H3oIndexer, features, &VectorIngestOptions::default()).unwrap();

        let schema = batch.schema();
        assert_eq!(schema.field(0).name(), CELL_COLUMN);
        assert_eq!(schema.fields().len(), 5);
        let kind = |name: &str| schema.field_with_name(name).unwrap().data_type().clone();
        assert_eq!(kind("name"), DataType::Utf8);
        assert_eq!(kind("pop"), DataType::Float64);
        assert_eq!(kind("flag"), DataType::Boolean);
        assert_eq!(kind("meta"), DataType::Utf8);

        let names = string_values(&batch, "name").unwrap();
        assert_eq!(names.iter().filter(|n| n.as_deref() == Some("plaza")).count(), 1);
        assert!(names.iter().filter(|n| n.as_deref() == Some("road")).count() > 2);
        assert!(names.iter().filter(|n| n.as_deref() == Some("park")).count() > 5);

        let meta = string_values(&batch, "meta").unwrap();
        assert!(meta.contains(&Some(r#"{"lanes":2}"#.to_string())));
    }

    #[test]
    fn test_max_features_and_empty() {
        let point = |lng: f64| {
            feature(
                json!({"type": "Point", "coordinates": [lng, 0.0]}),
                json!({}),
            )
        };
        let options = VectorIngestOptions {
            max_features: Some(1),
            ..Default::default()
        };
        let batch = features_to_table(&H3oIndexer, vec![point(10.0), point(20.0)], &options).unwrap();
        assert_eq!(batch.num_rows(), 1);

        let bad = feature(
            json!({"type": "Point", "coordinates": [0.0, 95.0]}),
            json!({}),
        );
        assert!(matches!(
            features_to_table(&H3oIndexer, vec![bad], &VectorIngestOptions::default()),
            Err(IngestError::Empty(_))
        ));
    }

    #[test]
    fn test_multipolygon_covers_both_parts() {
        let indexer = GeometryIndexer::new(&H3oIndexer, &VectorIngestOptions::default());
        let square = |x: f64| {
            geo_types::polygon![
                (x: x, y: 0.0),
                (x: x + 0.01, y: 0.0),
                (x: x + 0.01, y: 0.01),
                (x: x, y: 0.01),
            ]
        };
        let a = indexer.cells(&Geometry::Polygon(square(0.0))).unwrap();
        let b = indexer.cells(&Geometry::Polygon(square(1.0))).unwrap();
        let both = indexer
            .cells(&Geometry::MultiPolygon(geo_types::MultiPolygon(vec![
                square(0.0),
                square(1.0),
            ])))
            .unwrap();
        assert_eq!(both.len(), a.len() + b.len());
    }

    #[test]
    fn test_read_features_variants() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.geojson");
        std::fs::write(&path, r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#).unwrap();
        let features = read_features(&path).unwrap();
        assert_eq!(features.len(), 1);
        assert!(features[0].geometry.is_some());

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(read_features(&path), Err(IngestError::GeoJson(_))));
    }
}
