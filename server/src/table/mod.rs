//! Cell tables
//!
//! Every artifact the offline tools exchange is a flat Arrow table keyed by
//! a `cell_h3` string column, persisted as Parquet.

pub mod columns;
pub mod io;
mod types;

pub use columns::{
    CELL_COLUMN, NDVI_COLUMN, RasterCellRow, SAMPLE_COUNT_COLUMN, float_values, raster_batch,
    raster_schema, string_values,
};
pub use io::{read_parquet, read_table, require_columns, write_csv, write_parquet};
pub use types::TableError;
