//! Offline ingestion of rasters and vectors into cell tables

pub mod raster;
pub mod vector;
mod types;

pub use raster::{
    CellAccumulator, RasterIngestOptions, RasterSource, aggregate_ndvi, effective_stride,
    ingest_raster,
};
pub use types::IngestError;
pub use vector::{
    GeometryIndexer, VectorIngestOptions, VectorTableBuilder, densify_line, features_to_table,
    ingest_vector, read_features,
};
