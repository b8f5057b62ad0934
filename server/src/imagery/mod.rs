//! Satellite imagery acquisition
//!
//! This module provides:
//! - `SceneCatalog` trait for abstracting STAC catalogs
//! - `StacCatalog`, an HTTP client with Planetary Computer signing
//! - Scene search over a relaxation ladder of cloud and date filters
//! - Cropping of red/NIR bands and NDVI product generation

pub mod download;
pub mod process;
pub mod search;
pub mod stac;
mod types;

pub use download::download_ndvi;
pub use process::{project_bounds, window_for_bounds, write_products};
pub use search::{SceneSelection, find_scene, relaxation_ladder, select_scene};
pub use stac::{PLANETARY_COMPUTER_STAC, SceneCatalog, SearchRequest, StacCatalog, StacItem};
pub use types::{
    DownloadRequest, DownloadSummary, ImageryError, ProductPaths, SearchAttempt, parse_bbox,
};
