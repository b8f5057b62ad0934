//! Imagery types and error definitions

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::grid::BoundingBox;
use crate::raster::RasterError;

/// Errors that can occur while finding or downloading a scene
#[derive(Debug, Error)]
pub enum ImageryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Catalog returned {status}: {body}")]
    Catalog { status: u16, body: String },

    #[error("Invalid bbox: {0}")]
    InvalidBbox(String),

    #[error("No usable scene intersects the area of interest")]
    NoScene,

    #[error("Crop window is empty for scene {0}")]
    EmptyWindow(String),

    #[error("Scene {item} has no asset {asset}")]
    MissingAsset { item: String, asset: String },

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ImageryError {
    /// Process exit code used by the downloader command
    pub fn exit_code(&self) -> i32 {
        match self {
            ImageryError::NoScene => 2,
            ImageryError::EmptyWindow(_) => 3,
            _ => 1,
        }
    }
}

/// Parse `"min_lng min_lat max_lng max_lat"`, whitespace separated.
pub fn parse_bbox(text: &str) -> Result<BoundingBox, ImageryError> {
    let values = text
        .split_whitespace()
        .map(|v| v.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ImageryError::InvalidBbox(format!("{}: {}", text, e)))?;
    match values.as_slice() {
        &[min_lng, min_lat, max_lng, max_lat] if min_lng < max_lng && min_lat < max_lat => {
            Ok(BoundingBox {
                min_lng,
                min_lat,
                max_lng,
                max_lat,
            })
        }
        _ => Err(ImageryError::InvalidBbox(format!(
            "expected 4 increasing values, got {:?}",
            text
        ))),
    }
}

/// One rung of the search relaxation ladder
#[derive(Debug, Clone, PartialEq)]
pub struct SearchAttempt {
    /// Exclusive upper bound on `eo:cloud_cover`
    pub max_cloud: f64,
    /// STAC datetime interval, `start/end`
    pub datetime: String,
}

/// Settings for one downloader run
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub bbox: BoundingBox,
    pub datetime: String,
    pub max_cloud: f64,
    pub out_dir: PathBuf,
}

/// JSON summary printed once the products are written
#[derive(Debug, Clone, Serialize)]
pub struct DownloadSummary {
    pub bbox_wgs84: [f64; 4],
    pub date: String,
    pub cloud_lt: f64,
    pub chosen_item: String,
    pub cloud_cover: Option<f64>,
    pub intersection: [f64; 4],
    pub window: [usize; 4],
    pub outputs: ProductPaths,
    pub seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductPaths {
    pub red: PathBuf,
    pub nir: PathBuf,
    pub ndvi: PathBuf,
}

impl ProductPaths {
    pub fn in_dir(dir: &std::path::Path) -> Self {
        Self {
            red: dir.join("mg_s2_red.tif"),
            nir: dir.join("mg_s2_nir.tif"),
            ndvi: dir.join("mg_s2_ndvi.tif"),
        }
    }
}
