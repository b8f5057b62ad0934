//! Table-related error definitions

use thiserror::Error;

/// Errors that can occur when reading or writing cell tables
#[derive(Debug, Error)]
pub enum TableError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Missing columns in {path}: {columns:?}")]
    MissingColumns { path: String, columns: Vec<String> },

    #[error("Column {column} has type {found}, expected {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
        found: String,
    },

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
