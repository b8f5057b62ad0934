//! GridIndexer trait definition

use h3o::{CellIndex, LatLng, Resolution};

use super::types::{GeoPolygon, GridError};

/// Trait for hexagonal grid backends
pub trait GridIndexer: Send + Sync {
    /// Short backend name reported by the health endpoint
    fn name(&self) -> &'static str;

    /// Index a point at the given resolution
    fn latlng_to_cell(&self, lat: f64, lng: f64, res: Resolution) -> Result<CellIndex, GridError>;

    /// Boundary vertices of a cell
    fn cell_to_boundary(&self, cell: CellIndex) -> Vec<LatLng>;

    /// Center of a cell
    fn cell_to_latlng(&self, cell: CellIndex) -> LatLng;

    /// All cells within `k` grid steps of `cell`, including `cell`
    fn grid_disk(&self, cell: CellIndex, k: u32) -> Vec<CellIndex>;

    /// Native polygon-to-cells conversion
    fn polygon_to_cells(
        &self,
        polygon: &GeoPolygon,
        res: Resolution,
    ) -> Result<Vec<CellIndex>, GridError>;
}

/// Parse a resolution, rejecting anything outside 0..=15.
pub fn parse_resolution(res: i64) -> Result<Resolution, GridError> {
    u8::try_from(res)
        .ok()
        .and_then(|r| Resolution::try_from(r).ok())
        .ok_or(GridError::InvalidResolution(res))
}

/// Parse a cell identifier from its hex string form.
pub fn parse_cell(cell: &str) -> Result<CellIndex, GridError> {
    cell.trim()
        .parse::<CellIndex>()
        .map_err(|e| GridError::InvalidCell(format!("{}: {}", cell, e)))
}
