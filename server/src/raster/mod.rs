//! Raster module
//!
//! GeoTIFF I/O, the CRSs the reader understands, and NDVI arithmetic.

pub mod geotiff;
pub mod ndvi;
pub mod projection;
mod types;

pub use geotiff::{read_geotiff, write_geotiff_f32};
pub use projection::{Crs, utm_zone_for};
pub use types::{GeoRaster, GeoTransform, PixelWindow, RasterError};
