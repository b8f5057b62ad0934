//! Vector/raster join on `cell_h3` with summary statistics

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::{ArrayRef, Float64Array, RecordBatch, StringArray, UInt32Array, UInt64Array};
use arrow_schema::{DataType, Field, Schema};
use arrow_select::take::take;
use tracing::{debug, info, warn};

use crate::table::{
    CELL_COLUMN, NDVI_COLUMN, TableError, float_values, read_table, string_values, write_csv,
    write_parquet,
};

use super::types::ReportError;

/// Load a JSON array of cell ids used to restrict both tables
pub fn load_filter_cells(path: &Path) -> Result<HashSet<String>, ReportError> {
    let text = std::fs::read_to_string(path)?;
    let cells: Vec<String> = serde_json::from_str(&text).map_err(|e| {
        ReportError::InvalidFilter(format!("{:?} must be a JSON list of cell ids: {}", path, e))
    })?;
    if cells.is_empty() {
        return Err(ReportError::InvalidFilter(format!(
            "{:?} contains an empty list",
            path
        )));
    }
    Ok(cells.into_iter().collect())
}

/// Inner join of the vector table with the raster table on `cell_h3`.
///
/// Output rows follow the vector table's order. Vector columns come first,
/// then every raster column except the key. A vector column whose name
/// clashes with a raster column is renamed with a `_vector` suffix.
pub fn join_tables(
    vector: &RecordBatch,
    raster: &RecordBatch,
    filter: Option<&HashSet<String>>,
) -> Result<RecordBatch, ReportError> {
    let keep = |cell: &Option<String>| match (cell, filter) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(c), Some(f)) => f.contains(c),
    };

    let raster_cells = string_values(raster, CELL_COLUMN)?;
    let mut by_cell: HashMap<&str, Vec<u32>> = HashMap::new();
    for (j, cell) in raster_cells.iter().enumerate() {
        if keep(cell)
            && let Some(c) = cell
        {
            by_cell.entry(c.as_str()).or_default().push(j as u32);
        }
    }

    let vector_cells = string_values(vector, CELL_COLUMN)?;
    let mut left = Vec::new();
    let mut right = Vec::new();
    for (i, cell) in vector_cells.iter().enumerate() {
        if !keep(cell) {
            continue;
        }
        if let Some(matches) = cell.as_deref().and_then(|c| by_cell.get(c)) {
            for &j in matches {
                left.push(i as u32);
                right.push(j);
            }
        }
    }
    debug!(
        "Join matched {} pairs from {} vector and {} raster rows",
        left.len(),
        vector.num_rows(),
        raster.num_rows()
    );

    let left = UInt32Array::from(left);
    let right = UInt32Array::from(right);
    let raster_schema = raster.schema();
    let raster_names: HashSet<&str> = raster_schema
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .filter(|n| *n != CELL_COLUMN)
        .collect();

    let mut fields = Vec::new();
    let mut columns: Vec<ArrayRef> = Vec::new();
    for (field, column) in vector.schema().fields().iter().zip(vector.columns()) {
        let name = if raster_names.contains(field.name().as_str()) {
            format!("{}_vector", field.name())
        } else {
            field.name().clone()
        };
        fields.push(Field::new(name, field.data_type().clone(), field.is_nullable()));
        columns.push(take(column.as_ref(), &left, None).map_err(TableError::from)?);
    }
    for (field, column) in raster_schema.fields().iter().zip(raster.columns()) {
        if field.name() == CELL_COLUMN {
            continue;
        }
        if field.name() == NDVI_COLUMN {
            // normalize to Float64 whatever the writer used
            let values = float_values(raster, NDVI_COLUMN)?;
            let picked: Float64Array = right.values().iter().map(|&j| values[j as usize]).collect();
            fields.push(Field::new(NDVI_COLUMN, DataType::Float64, true));
            columns.push(Arc::new(picked));
            continue;
        }
        fields.push(field.as_ref().clone().with_nullable(true));
        columns.push(take(column.as_ref(), &right, None).map_err(TableError::from)?);
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).map_err(TableError::from)?;
    Ok(batch)
}

/// Count, mean, min and max of the non-null NDVI values
#[derive(Debug, Clone, PartialEq)]
pub struct NdviStats {
    pub count: u64,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NdviStats {
    pub fn of<I: IntoIterator<Item = Option<f64>>>(values: I) -> Self {
        let mut count = 0u64;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values.into_iter().flatten().filter(|v| !v.is_nan()) {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        if count == 0 {
            return Self {
                count,
                mean: None,
                min: None,
                max: None,
            };
        }
        Self {
            count,
            mean: Some(sum / count as f64),
            min: Some(min),
            max: Some(max),
        }
    }
}

/// Statistics of one group in an aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub key: String,
    pub stats: NdviStats,
}

/// Column values rendered as group keys; null keys are dropped later.
fn key_values(batch: &RecordBatch, column: &str) -> Result<Vec<Option<String>>, ReportError> {
    if let Ok(values) = string_values(batch, column) {
        return Ok(values);
    }
    if let Some(array) = batch.column_by_name(column)
        && let Some(bools) = array.as_boolean_opt()
    {
        return Ok(bools.iter().map(|b| b.map(|b| b.to_string())).collect());
    }
    Ok(float_values(batch, column)?
        .into_iter()
        .map(|v| v.filter(|v| !v.is_nan()).map(|v| v.to_string()))
        .collect())
}

/// Group joined rows by `column` and summarize NDVI per group, sorted by
/// key.
pub fn aggregate_by(joined: &RecordBatch, column: &str) -> Result<Vec<GroupStats>, ReportError> {
    let keys = key_values(joined, column)?;
    let ndvi = float_values(joined, NDVI_COLUMN)?;
    let mut groups: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
    for (key, value) in keys.into_iter().zip(ndvi) {
        if let Some(key) = key {
            groups.entry(key).or_default().push(value);
        }
    }
    Ok(groups
        .into_iter()
        .map(|(key, values)| GroupStats {
            key,
            stats: NdviStats::of(values),
        })
        .collect())
}

/// `<column>, count, mean, min, max` table
pub fn aggregate_batch(column: &str, groups: &[GroupStats]) -> Result<RecordBatch, ReportError> {
    let schema = Schema::new(vec![
        Field::new(column, DataType::Utf8, false),
        Field::new("count", DataType::UInt64, false),
        Field::new("mean", DataType::Float64, true),
        Field::new("min", DataType::Float64, true),
        Field::new("max", DataType::Float64, true),
    ]);
    let keys: StringArray = groups.iter().map(|g| Some(g.key.as_str())).collect();
    let counts: UInt64Array = groups.iter().map(|g| Some(g.stats.count)).collect();
    let means: Float64Array = groups.iter().map(|g| g.stats.mean).collect();
    let mins: Float64Array = groups.iter().map(|g| g.stats.min).collect();
    let maxs: Float64Array = groups.iter().map(|g| g.stats.max).collect();
    let batch = RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(keys),
            Arc::new(counts),
            Arc::new(means),
            Arc::new(mins),
            Arc::new(maxs),
        ],
    )
    .map_err(TableError::from)?;
    Ok(batch)
}

/// `reports/joined.parquet` + `tipo` -> `reports/joined.agg_by_tipo.parquet`
pub fn agg_output_path(path: &Path, column: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.agg_by_{}.{}", stem, column, ext.to_string_lossy()),
        None => format!("{}.agg_by_{}", stem, column),
    };
    path.with_file_name(name)
}

/// Inputs and outputs of a query run
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub vector: PathBuf,
    pub raster: PathBuf,
    pub out: PathBuf,
    pub out_csv: Option<PathBuf>,
    pub filter_cells: Option<PathBuf>,
    pub agg_by: Option<String>,
}

/// Aggregation written alongside the joined table
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub column: String,
    pub groups: Vec<GroupStats>,
    pub out: PathBuf,
    pub out_csv: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct QueryReport {
    pub rows: usize,
    pub ndvi: NdviStats,
    pub aggregation: Option<Aggregation>,
}

/// Load both tables, join them and write the results.
///
/// Returns `None` when the join is empty; nothing is written then.
pub fn run_query(options: &QueryOptions) -> Result<Option<QueryReport>, ReportError> {
    let vector = read_table(&options.vector, &[CELL_COLUMN])?;
    let raster = read_table(&options.raster, &[CELL_COLUMN, NDVI_COLUMN])?;
    let filter = options
        .filter_cells
        .as_deref()
        .map(load_filter_cells)
        .transpose()?;

    let joined = join_tables(&vector, &raster, filter.as_ref())?;
    if joined.num_rows() == 0 {
        info!("Join produced no rows");
        return Ok(None);
    }
    let ndvi = NdviStats::of(float_values(&joined, NDVI_COLUMN)?);

    let aggregation = match options.agg_by.as_deref() {
        Some(column) if joined.schema().column_with_name(column).is_some() => {
            let groups = aggregate_by(&joined, column)?;
            let batch = aggregate_batch(column, &groups)?;
            let out = agg_output_path(&options.out, column);
            write_parquet(&out, &batch)?;
            let out_csv = options
                .out_csv
                .as_deref()
                .map(|p| agg_output_path(&p.with_extension("csv"), column));
            if let Some(path) = &out_csv {
                write_csv(path, &batch)?;
            }
            Some(Aggregation {
                column: column.to_string(),
                groups,
                out,
                out_csv,
            })
        }
        Some(column) => {
            warn!("Aggregation column {} not in joined table, skipping", column);
            None
        }
        None => None,
    };

    write_parquet(&options.out, &joined)?;
    if let Some(path) = &options.out_csv {
        write_csv(path, &joined)?;
    }
    info!("Joined {} rows into {:?}", joined.num_rows(), options.out);

    Ok(Some(QueryReport {
        rows: joined.num_rows(),
        ndvi,
        aggregation,
    }))
}
