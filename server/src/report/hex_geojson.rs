//! Cell table to hexagon GeoJSON

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use tracing::info;

use crate::grid::{GridIndexer, parse_cell};
use crate::table::{CELL_COLUMN, float_values, read_table, string_values};

use super::types::ReportError;

/// Closed `[lng, lat]` ring of a cell boundary
pub fn cell_polygon(indexer: &dyn GridIndexer, cell: &str) -> Result<Geometry, ReportError> {
    let index = parse_cell(cell)?;
    let mut ring: Vec<Vec<f64>> = indexer
        .cell_to_boundary(index)
        .iter()
        .map(|ll| vec![ll.lng(), ll.lat()])
        .collect();
    if let Some(first) = ring.first().cloned() {
        ring.push(first);
    }
    Ok(Geometry::new(Value::Polygon(vec![ring])))
}

/// One hexagon feature per row, with `cell_h3` and `ndvi_mean` properties.
/// NaN or missing values become `null`.
pub fn hex_features(
    indexer: &dyn GridIndexer,
    cells: &[Option<String>],
    values: &[Option<f64>],
) -> Result<FeatureCollection, ReportError> {
    let mut features = Vec::with_capacity(cells.len());
    for (cell, value) in cells.iter().zip(values) {
        let Some(cell) = cell else { continue };
        let mut properties = JsonObject::new();
        properties.insert(CELL_COLUMN.to_string(), JsonValue::from(cell.as_str()));
        let value = value
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null);
        properties.insert("ndvi_mean".to_string(), value);
        features.push(Feature {
            bbox: None,
            geometry: Some(cell_polygon(indexer, cell)?),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }
    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Convert a Parquet table with `cell_h3` and `value_column` to a GeoJSON
/// file; returns the number of hexagons written.
pub fn write_hex_geojson(
    indexer: &dyn GridIndexer,
    input: &Path,
    output: &Path,
    value_column: &str,
) -> Result<usize, ReportError> {
    let batch = read_table(input, &[CELL_COLUMN, value_column])?;
    let cells = string_values(&batch, CELL_COLUMN)?;
    let values = float_values(&batch, value_column)?;
    let collection = hex_features(indexer, &cells, &values)?;

    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(output)?);
    serde_json::to_writer(writer, &collection)?;
    info!("GeoJSON saved: {:?} ({} hex)", output, collection.features.len());
    Ok(collection.features.len())
}
