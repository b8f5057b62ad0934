//! NDVI raster ingestion
//!
//! Pixels are visited on a strided lattice, NDVI is computed per pixel and
//! averaged per H3 cell. The output is the `cell_h3, ndvi_mean,
//! sample_count` table.

use std::collections::HashMap;
use std::path::PathBuf;

use h3o::{CellIndex, Resolution};
use tracing::{debug, info};

use crate::grid::GridIndexer;
use crate::raster::ndvi::ndvi;
use crate::raster::{GeoRaster, RasterError, read_geotiff};
use crate::table::RasterCellRow;

use super::types::IngestError;

/// Where the red and NIR bands come from
#[derive(Debug, Clone)]
pub enum RasterSource {
    /// One multi-band GeoTIFF; bands picked by the options
    Stacked(PathBuf),
    /// Two single-band GeoTIFFs on the same grid
    Separate { red: PathBuf, nir: PathBuf },
}

#[derive(Debug, Clone)]
pub struct RasterIngestOptions {
    /// 1-based red band for stacked input
    pub red_band: usize,
    /// 1-based NIR band for stacked input
    pub nir_band: usize,
    pub resolution: Resolution,
    /// Minimum pixel stride along both axes
    pub step: usize,
    /// Soft cap on the number of pixels visited
    pub max_pixels: usize,
}

impl Default for RasterIngestOptions {
    fn default() -> Self {
        Self {
            red_band: 1,
            nir_band: 2,
            resolution: Resolution::Nine,
            step: 4,
            max_pixels: 400_000,
        }
    }
}

/// Stride that keeps the visited pixel count near `max_pixels`.
///
/// `max(step, ceil(sqrt(height * width / max_pixels)))`, never below 1. A
/// zero `max_pixels` disables the cap.
pub fn effective_stride(step: usize, height: usize, width: usize, max_pixels: usize) -> usize {
    let step = step.max(1);
    if max_pixels == 0 {
        return step;
    }
    let ratio = (height as f64 * width as f64) / max_pixels as f64;
    let capped = ratio.sqrt().ceil() as usize;
    step.max(capped)
}

/// Running NDVI sum and count per cell
#[derive(Debug, Default)]
pub struct CellAccumulator {
    cells: HashMap<CellIndex, (f64, u64)>,
}

impl CellAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, cell: CellIndex, value: f64) {
        let entry = self.cells.entry(cell).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Mean per cell, sorted by cell id
    pub fn into_rows(self) -> Vec<RasterCellRow> {
        let mut cells: Vec<_> = self.cells.into_iter().collect();
        cells.sort_unstable_by_key(|(cell, _)| *cell);
        cells
            .into_iter()
            .map(|(cell, (sum, count))| RasterCellRow {
                cell: cell.to_string(),
                ndvi_mean: sum / count as f64,
                sample_count: count,
            })
            .collect()
    }
}

/// Accumulate NDVI from two bands that share one pixel grid.
///
/// `red` supplies the georeferencing. A pixel is skipped when either band
/// value is nodata or not finite, or when its NDVI is not finite.
pub fn aggregate_ndvi(
    indexer: &dyn GridIndexer,
    red: (&GeoRaster, usize),
    nir: (&GeoRaster, usize),
    options: &RasterIngestOptions,
) -> Result<CellAccumulator, IngestError> {
    let (red_raster, red_band) = red;
    let (nir_raster, nir_band) = nir;
    if red_raster.width != nir_raster.width || red_raster.height != nir_raster.height {
        return Err(RasterError::ShapeMismatch(format!(
            "red is {}x{}, nir is {}x{}",
            red_raster.width, red_raster.height, nir_raster.width, nir_raster.height
        ))
        .into());
    }
    let red_values = red_raster.band(red_band)?;
    let nir_values = nir_raster.band(nir_band)?;

    let (width, height) = (red_raster.width, red_raster.height);
    let pixels = width * height;
    if red_values.len() != pixels || nir_values.len() != pixels {
        return Err(RasterError::ShapeMismatch(format!(
            "expected {} values per band for {}x{}, red has {}, nir has {}",
            pixels,
            width,
            height,
            red_values.len(),
            nir_values.len()
        ))
        .into());
    }
    let stride = effective_stride(options.step, height, width, options.max_pixels);
    debug!(
        "Sampling {}x{} raster with stride {} (step {}, cap {})",
        width, height, stride, options.step, options.max_pixels
    );

    let mut acc = CellAccumulator::new();
    let mut visited = 0usize;
    for row in (0..height).step_by(stride) {
        for col in (0..width).step_by(stride) {
            visited += 1;
            let idx = row * width + col;
            let (r, n) = (red_values[idx], nir_values[idx]);
            if !red_raster.is_valid(r) || !nir_raster.is_valid(n) {
                continue;
            }
            let value = ndvi(r, n);
            if !value.is_finite() {
                continue;
            }
            let (lng, lat) = red_raster.lnglat(row, col);
            match indexer.latlng_to_cell(lat, lng, options.resolution) {
                Ok(cell) => acc.add(cell, f64::from(value)),
                Err(e) => debug!("Skipping pixel ({}, {}): {}", row, col, e),
            }
        }
    }
    debug!("Visited {} pixels into {} cells", visited, acc.len());
    Ok(acc)
}

/// Read the source rasters and aggregate NDVI per cell.
pub fn ingest_raster(
    indexer: &dyn GridIndexer,
    source: &RasterSource,
    options: &RasterIngestOptions,
) -> Result<Vec<RasterCellRow>, IngestError> {
    let acc = match source {
        RasterSource::Stacked(path) => {
            let raster = read_geotiff(path)?;
            info!(
                "Loaded {:?}: {}x{} px, {} bands, {}",
                path,
                raster.width,
                raster.height,
                raster.bands.len(),
                raster.crs
            );
            aggregate_ndvi(
                indexer,
                (&raster, options.red_band),
                (&raster, options.nir_band),
                options,
            )?
        }
        RasterSource::Separate { red, nir } => {
            let red_raster = read_geotiff(red)?;
            let nir_raster = read_geotiff(nir)?;
            info!(
                "Loaded red {:?} and nir {:?}: {}x{} px, {}",
                red, nir, red_raster.width, red_raster.height, red_raster.crs
            );
            aggregate_ndvi(indexer, (&red_raster, 1), (&nir_raster, 1), options)?
        }
    };

    if acc.is_empty() {
        return Err(IngestError::Empty(
            "no cells accumulated (all NDVI NaN?)".to_string(),
        ));
    }
    Ok(acc.into_rows())
}
