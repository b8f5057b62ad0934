//! Typed column access and the raster cell table layout

use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Float64Type, Int32Type, Int64Type, UInt64Type};
use arrow_array::{ArrayRef, Float64Array, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema};

use super::types::TableError;

/// H3 cell id column shared by every table
pub const CELL_COLUMN: &str = "cell_h3";
/// Mean NDVI per cell
pub const NDVI_COLUMN: &str = "ndvi_mean";
/// Number of pixels averaged into a raster cell
pub const SAMPLE_COUNT_COLUMN: &str = "sample_count";

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, TableError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| TableError::MissingColumns {
            path: "<batch>".to_string(),
            columns: vec![name.to_string()],
        })
}

fn type_error(name: &str, expected: &'static str, found: &DataType) -> TableError {
    TableError::ColumnType {
        column: name.to_string(),
        expected,
        found: found.to_string(),
    }
}

/// Read a Utf8 or LargeUtf8 column as owned optional strings
pub fn string_values(batch: &RecordBatch, name: &str) -> Result<Vec<Option<String>>, TableError> {
    let array = column(batch, name)?;
    if let Some(values) = array.as_string_opt::<i32>() {
        return Ok(values.iter().map(|v| v.map(str::to_string)).collect());
    }
    if let Some(values) = array.as_string_opt::<i64>() {
        return Ok(values.iter().map(|v| v.map(str::to_string)).collect());
    }
    Err(type_error(name, "string", array.data_type()))
}

/// Read any float or integer column as optional f64 values
pub fn float_values(batch: &RecordBatch, name: &str) -> Result<Vec<Option<f64>>, TableError> {
    let array = column(batch, name)?;
    let values = match array.data_type() {
        DataType::Float64 => array.as_primitive::<Float64Type>().iter().collect(),
        DataType::Float32 => array
            .as_primitive::<Float32Type>()
            .iter()
            .map(|v| v.map(f64::from))
            .collect(),
        DataType::Int64 => array
            .as_primitive::<Int64Type>()
            .iter()
            .map(|v| v.map(|x| x as f64))
            .collect(),
        DataType::Int32 => array
            .as_primitive::<Int32Type>()
            .iter()
            .map(|v| v.map(f64::from))
            .collect(),
        DataType::UInt64 => array
            .as_primitive::<UInt64Type>()
            .iter()
            .map(|v| v.map(|x| x as f64))
            .collect(),
        other => return Err(type_error(name, "numeric", other)),
    };
    Ok(values)
}

/// One aggregated raster cell
#[derive(Debug, Clone, PartialEq)]
pub struct RasterCellRow {
    pub cell: String,
    pub ndvi_mean: f64,
    pub sample_count: u64,
}

pub fn raster_schema() -> Schema {
    Schema::new(vec![
        Field::new(CELL_COLUMN, DataType::Utf8, false),
        Field::new(NDVI_COLUMN, DataType::Float64, true),
        Field::new(SAMPLE_COUNT_COLUMN, DataType::UInt64, false),
    ])
}

/// Build the `cell_h3, ndvi_mean, sample_count` table
pub fn raster_batch(rows: &[RasterCellRow]) -> Result<RecordBatch, TableError> {
    let cells: StringArray = rows.iter().map(|r| Some(r.cell.as_str())).collect();
    let means: Float64Array = rows.iter().map(|r| Some(r.ndvi_mean)).collect();
    let counts: UInt64Array = rows.iter().map(|r| Some(r.sample_count)).collect();
    let batch = RecordBatch::try_new(
        Arc::new(raster_schema()),
        vec![Arc::new(cells), Arc::new(means), Arc::new(counts)],
    )?;
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Float32Array, LargeStringArray};

    fn sample_rows() -> Vec<RasterCellRow> {
        vec![
            RasterCellRow {
                cell: "8928308280fffff".to_string(),
                ndvi_mean: 0.5,
                sample_count: 3,
            },
            RasterCellRow {
                cell: "8928308280bffff".to_string(),
                ndvi_mean: -0.25,
                sample_count: 1,
            },
        ]
    }

    #[test]
    fn test_raster_batch_layout() {
        let batch = raster_batch(&sample_rows()).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(0).name(), CELL_COLUMN);
        assert_eq!(batch.schema().field(1).data_type(), &DataType::Float64);
        assert_eq!(batch.schema().field(2).data_type(), &DataType::UInt64);
    }

    #[test]
    fn test_string_and_float_values() {
        let batch = raster_batch(&sample_rows()).unwrap();
        let cells = string_values(&batch, CELL_COLUMN).unwrap();
        assert_eq!(cells[1].as_deref(), Some("8928308280bffff"));
        let means = float_values(&batch, NDVI_COLUMN).unwrap();
        assert_eq!(means, vec![Some(0.5), Some(-0.25)]);
        let counts = float_values(&batch, SAMPLE_COUNT_COLUMN).unwrap();
        assert_eq!(counts, vec![Some(3.0), Some(1.0)]);
    }

    #[test]
    fn test_large_utf8_and_float32_accepted() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::LargeUtf8, true),
            Field::new("b", DataType::Float32, true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(LargeStringArray::from(vec![Some("x"), None])),
                Arc::new(Float32Array::from(vec![Some(1.5), None])),
            ],
        )
        .unwrap();
        assert_eq!(string_values(&batch, "a").unwrap(), vec![Some("x".to_string()), None]);
        assert_eq!(float_values(&batch, "b").unwrap(), vec![Some(1.5), None]);
    }

    #[test]
    fn test_wrong_type_and_missing_column() {
        let batch = raster_batch(&sample_rows()).unwrap();
        assert!(matches!(
            float_values(&batch, CELL_COLUMN),
            Err(TableError::ColumnType { .. })
        ));
        assert!(matches!(
            string_values(&batch, "nope"),
            Err(TableError::MissingColumns { .. })
        ));
    }
}
