//! Crop downloaded bands to the area of interest and derive NDVI

use tracing::{debug, info};

use crate::grid::BoundingBox;
use crate::raster::ndvi::ndvi_raster;
use crate::raster::{Crs, GeoRaster, PixelWindow, write_geotiff_f32};

use super::types::{ImageryError, ProductPaths};

/// Points per bbox edge used when projecting bounds
const DENSIFY_POINTS: usize = 21;

/// Project WGS84 bounds into `crs` and return `(min_x, min_y, max_x, max_y)`.
///
/// Each edge is densified so the result encloses the curved image of the
/// box.
pub fn project_bounds(crs: Crs, bbox: &BoundingBox) -> (f64, f64, f64, f64) {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    let steps = DENSIFY_POINTS + 1;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let lng = bbox.min_lng + t * bbox.width();
        let lat = bbox.min_lat + t * bbox.height();
        for (x, y) in [
            crs.from_lnglat(lng, bbox.min_lat),
            crs.from_lnglat(lng, bbox.max_lat),
            crs.from_lnglat(bbox.min_lng, lat),
            crs.from_lnglat(bbox.max_lng, lat),
        ] {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }
    (min_x, min_y, max_x, max_y)
}

/// Pixel window of `raster` covering WGS84 `bbox`, clamped to the raster.
pub fn window_for_bounds(raster: &GeoRaster, bbox: &BoundingBox) -> PixelWindow {
    let (min_x, min_y, max_x, max_y) = project_bounds(raster.crs, bbox);
    let (col0, row0) = raster.transform.pixel_of(min_x, max_y);
    let (col1, row1) = raster.transform.pixel_of(max_x, min_y);

    let clamp = |v: f64, hi: usize| v.max(0.0).min(hi as f64);
    let c0 = clamp(col0.floor(), raster.width) as usize;
    let r0 = clamp(row0.floor(), raster.height) as usize;
    let c1 = clamp(col1.ceil(), raster.width) as usize;
    let r1 = clamp(row1.ceil(), raster.height) as usize;

    PixelWindow {
        col: c0,
        row: r0,
        width: c1.saturating_sub(c0),
        height: r1.saturating_sub(r0),
    }
}

/// Crop both bands to `bbox` and write red, NIR and NDVI GeoTIFFs.
///
/// Returns the window used. `scene_id` only labels the empty-window error.
pub fn write_products(
    scene_id: &str,
    red: &GeoRaster,
    nir: &GeoRaster,
    bbox: &BoundingBox,
    paths: &ProductPaths,
) -> Result<PixelWindow, ImageryError> {
    let window = window_for_bounds(red, bbox);
    debug!("Crop window for {}: {:?}", scene_id, window);
    if window.is_empty() {
        return Err(ImageryError::EmptyWindow(scene_id.to_string()));
    }

    let red = red.crop(window);
    let nir = nir.crop(window);
    let red_band = red.band(1)?;
    let nir_band = nir.band(1)?;
    if red_band.len() != nir_band.len() {
        return Err(crate::raster::RasterError::ShapeMismatch(format!(
            "red window has {} px, nir window has {}",
            red_band.len(),
            nir_band.len()
        ))
        .into());
    }
    let ndvi = ndvi_raster(red_band, nir_band);

    let (w, h) = (red.width, red.height);
    write_geotiff_f32(&paths.red, w, h, red_band, &red.transform, red.crs)?;
    write_geotiff_f32(&paths.nir, w, h, nir_band, &red.transform, red.crs)?;
    write_geotiff_f32(&paths.ndvi, w, h, &ndvi, &red.transform, red.crs)?;
    info!("Wrote {}x{} products to {:?}", w, h, paths.ndvi.parent());
    Ok(window)
}
