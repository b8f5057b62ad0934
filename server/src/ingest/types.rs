//! Ingestion error definitions

use thiserror::Error;

use crate::grid::GridError;
use crate::raster::RasterError;
use crate::table::TableError;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Ingestion finished without producing a single row
    #[error("{0}")]
    Empty(String),
}

impl From<geojson::Error> for IngestError {
    fn from(e: geojson::Error) -> Self {
        IngestError::GeoJson(Box::new(e))
    }
}
