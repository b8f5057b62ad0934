//! Hexcell Server Library
//!
//! H3 grid HTTP routes, the polygon sampler, and the offline NDVI
//! ingestion, imagery and reporting pipeline used by `hexcell-tools`.

pub mod config;
pub mod grid;
pub mod imagery;
pub mod ingest;
pub mod raster;
pub mod report;
pub mod table;

// Re-export commonly used types
pub use config::Config;
pub use grid::{GridAppState, GridIndexer, H3oIndexer, PolyfillChain, grid_routes};
