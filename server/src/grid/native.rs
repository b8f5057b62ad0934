//! Grid backend built on the `h3o` crate

use h3o::geom::{ContainmentMode, TilerBuilder};
use h3o::{CellIndex, LatLng, Resolution};
use tracing::debug;

use super::service::GridIndexer;
use super::types::{GeoPolygon, GridError};

/// Grid indexer backed by `h3o`
#[derive(Debug, Clone, Default)]
pub struct H3oIndexer;

impl H3oIndexer {
    pub fn new() -> Self {
        Self
    }
}

impl GridIndexer for H3oIndexer {
    fn name(&self) -> &'static str {
        "h3o"
    }

    fn latlng_to_cell(&self, lat: f64, lng: f64, res: Resolution) -> Result<CellIndex, GridError> {
        let ll = LatLng::new(lat, lng).map_err(|_| GridError::CoordinateOutOfBounds { lat, lng })?;
        Ok(ll.to_cell(res))
    }

    fn cell_to_boundary(&self, cell: CellIndex) -> Vec<LatLng> {
        cell.boundary().iter().copied().collect()
    }

    fn cell_to_latlng(&self, cell: CellIndex) -> LatLng {
        LatLng::from(cell)
    }

    fn grid_disk(&self, cell: CellIndex, k: u32) -> Vec<CellIndex> {
        cell.grid_disk::<Vec<_>>(k)
    }

    fn polygon_to_cells(
        &self,
        polygon: &GeoPolygon,
        res: Resolution,
    ) -> Result<Vec<CellIndex>, GridError> {
        let mut tiler = TilerBuilder::new(res)
            .containment_mode(ContainmentMode::ContainsCentroid)
            .build();
        tiler
            .add(polygon.to_geo())
            .map_err(|e| GridError::Polyfill(e.to_string()))?;

        let mut cells: Vec<CellIndex> = tiler.into_coverage().collect();
        cells.sort_unstable();
        cells.dedup();
        debug!("Native polyfill produced {} cells at res {}", cells.len(), u8::from(res));
        Ok(cells)
    }
}
