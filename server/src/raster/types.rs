//! Raster types and error definitions

use thiserror::Error;

use super::projection::Crs;

/// Errors that can occur when reading or writing rasters
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Missing georeferencing: {0}")]
    MissingGeoreference(String),

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    #[error("Unsupported raster layout: {0}")]
    UnsupportedLayout(String),

    #[error("Band {band} out of range (raster has {count} bands)")]
    BandOutOfRange { band: usize, count: usize },

    #[error("Raster shape mismatch: {0}")]
    ShapeMismatch(String),
}

/// North-up affine transform: pixel (col, row) to CRS coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// X of the top-left corner of the top-left pixel
    pub origin_x: f64,
    /// Y of the top-left corner of the top-left pixel
    pub origin_y: f64,
    /// Pixel width in CRS units
    pub pixel_width: f64,
    /// Pixel height in CRS units (positive, y decreases with row)
    pub pixel_height: f64,
}

impl GeoTransform {
    /// CRS coordinates of the center of pixel `(row, col)`
    pub fn xy(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional `(col, row)` of a CRS coordinate
    pub fn pixel_of(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (self.origin_y - y) / self.pixel_height,
        )
    }

    /// Transform of a window starting at `(row, col)`
    pub fn window(&self, row: usize, col: usize) -> Self {
        Self {
            origin_x: self.origin_x + col as f64 * self.pixel_width,
            origin_y: self.origin_y - row as f64 * self.pixel_height,
            ..*self
        }
    }
}

/// Pixel window inside a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col: usize,
    pub row: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Georeferenced raster with one or more `f32` bands
#[derive(Debug, Clone)]
pub struct GeoRaster {
    pub width: usize,
    pub height: usize,
    /// Band-major pixel values, row-major within a band
    pub bands: Vec<Vec<f32>>,
    pub transform: GeoTransform,
    pub crs: Crs,
    pub nodata: Option<f32>,
}

impl GeoRaster {
    /// Band by 1-based index, matching GDAL numbering
    pub fn band(&self, band: usize) -> Result<&[f32], RasterError> {
        if band == 0 || band > self.bands.len() {
            return Err(RasterError::BandOutOfRange {
                band,
                count: self.bands.len(),
            });
        }
        Ok(&self.bands[band - 1])
    }

    /// Whether a value is usable (finite and not the nodata marker)
    pub fn is_valid(&self, value: f32) -> bool {
        value.is_finite() && self.nodata.is_none_or(|nd| value != nd)
    }

    /// `(lng, lat)` of the center of pixel `(row, col)`
    pub fn lnglat(&self, row: usize, col: usize) -> (f64, f64) {
        let (x, y) = self.transform.xy(row, col);
        self.crs.to_lnglat(x, y)
    }

    /// Copy out a window; the window is clamped to the raster extent.
    pub fn crop(&self, window: PixelWindow) -> Self {
        let col0 = window.col.min(self.width);
        let row0 = window.row.min(self.height);
        let width = window.width.min(self.width - col0);
        let height = window.height.min(self.height - row0);

        let bands = self
            .bands
            .iter()
            .map(|band| {
                let mut out = Vec::with_capacity(width * height);
                for row in row0..row0 + height {
                    let start = row * self.width + col0;
                    out.extend_from_slice(&band[start..start + width]);
                }
                out
            })
            .collect();

        Self {
            width,
            height,
            bands,
            transform: self.transform.window(row0, col0),
            crs: self.crs,
            nodata: self.nodata,
        }
    }
}
