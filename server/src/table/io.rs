//! Parquet and CSV I/O for cell tables

use std::fs::File;
use std::path::Path;

use arrow_array::RecordBatch;
use arrow_select::concat::concat_batches;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use super::types::TableError;

fn ensure_parent(path: &Path) -> Result<(), TableError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Read a whole Parquet file into a single batch
pub fn read_parquet(path: &Path) -> Result<RecordBatch, TableError> {
    if !path.exists() {
        return Err(TableError::NotFound(path.display().to_string()));
    }
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let batches = builder.build()?.collect::<Result<Vec<_>, _>>()?;
    let batch = concat_batches(&schema, &batches)?;
    debug!("Read {:?}: {} rows", path, batch.num_rows());
    Ok(batch)
}

/// Read a Parquet file and check that it carries the required columns
pub fn read_table(path: &Path, required: &[&str]) -> Result<RecordBatch, TableError> {
    let batch = read_parquet(path)?;
    require_columns(&batch, &path.display().to_string(), required)?;
    Ok(batch)
}

pub fn require_columns(batch: &RecordBatch, path: &str, required: &[&str]) -> Result<(), TableError> {
    let schema = batch.schema();
    let missing: Vec<String> = required
        .iter()
        .filter(|c| schema.column_with_name(c).is_none())
        .map(|c| c.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TableError::MissingColumns {
            path: path.to_string(),
            columns: missing,
        })
    }
}

/// Write a batch as Snappy-compressed Parquet, creating parent directories
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<(), TableError> {
    ensure_parent(path)?;
    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    debug!("Wrote {:?}: {} rows", path, batch.num_rows());
    Ok(())
}

/// Write a batch as CSV with a header row
pub fn write_csv(path: &Path, batch: &RecordBatch) -> Result<(), TableError> {
    ensure_parent(path)?;
    let file = File::create(path)?;
    let mut writer = arrow_csv::Writer::new(file);
    writer.write(batch)?;
    Ok(())
}
