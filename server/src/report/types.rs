//! Report error definitions

use thiserror::Error;

use crate::grid::GridError;
use crate::table::TableError;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid cell filter: {0}")]
    InvalidFilter(String),

    #[error("Input has no rows: {0}")]
    EmptyInput(String),
}
