//! Lattice-sampling fallback for polygon-to-cells conversion
//!
//! Rasterizes a polygon's exterior ring over a regular lattice spanning its
//! bounding box, keeps the lattice points that fall inside the ring, and
//! indexes them. The lattice is sized so that the number of sample points
//! never exceeds the configured budget, whatever the polygon size.

use std::collections::BTreeSet;

use h3o::{CellIndex, Resolution};
use tracing::debug;

use super::service::GridIndexer;
use super::types::{BoundingBox, GridError, Position};

/// Smallest cosine used to widen the longitude step near the poles
const MIN_LAT_COS: f64 = 0.1;

/// Sampler settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerSettings {
    /// Maximum number of lattice points
    pub max_samples: usize,
    /// Baseline lattice step in degrees (latitude axis)
    pub base_step_deg: f64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            max_samples: 2500,
            base_step_deg: 0.002,
        }
    }
}

/// Regular lattice of sample points over a bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingLattice {
    pub origin_lng: f64,
    pub origin_lat: f64,
    pub step_lng: f64,
    pub step_lat: f64,
    pub nx: usize,
    pub ny: usize,
}

impl SamplingLattice {
    /// Size a lattice for `bbox` so that `nx * ny <= settings.max_samples`.
    ///
    /// The longitude step is widened by `1 / cos(mid_lat)` to keep roughly
    /// equal ground spacing on both axes.
    pub fn plan(bbox: &BoundingBox, settings: &SamplerSettings) -> Self {
        let budget = settings.max_samples.max(1);
        let (w, h) = (bbox.width(), bbox.height());
        let lat_mid = (bbox.min_lat + bbox.max_lat) / 2.0;

        let step_lat = settings.base_step_deg;
        let step_lng = settings.base_step_deg / lat_mid.to_radians().cos().max(MIN_LAT_COS);

        let mut nx = ((w / step_lng).ceil() as usize).max(1);
        let mut ny = ((h / step_lat).ceil() as usize).max(1);

        if nx.saturating_mul(ny) > budget {
            let scale = (nx as f64 * ny as f64 / budget as f64).sqrt();
            nx = ((nx as f64 / scale) as usize).max(1);
            ny = ((ny as f64 / scale) as usize).max(1);

            // an axis clamped to 1 can leave the product over budget
            if nx.saturating_mul(ny) > budget {
                ny = (budget / nx).max(1);
                if nx.saturating_mul(ny) > budget {
                    nx = budget;
                }
            }
        }

        Self {
            origin_lng: bbox.min_lng,
            origin_lat: bbox.min_lat,
            step_lng: w / nx as f64,
            step_lat: h / ny as f64,
            nx,
            ny,
        }
    }

    /// Number of sample points
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample points as `(lng, lat)`, at the center of each lattice cell
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        (0..self.nx).flat_map(move |ix| {
            let lng = self.origin_lng + (ix as f64 + 0.5) * self.step_lng;
            (0..self.ny).map(move |iy| (lng, self.origin_lat + (iy as f64 + 0.5) * self.step_lat))
        })
    }
}

/// Even-odd ray casting test against an open ring of `(lng, lat)` vertices.
///
/// An edge is crossed when exactly one endpoint lies strictly above `lat`;
/// horizontal edges never cross and a vertex on the ray counts once.
pub fn point_in_ring(lng: f64, lat: f64, ring: &[Position]) -> bool {
    let mut inside = false;
    let next = ring.iter().cycle().skip(1);
    for (&[x1, y1], &[x2, y2]) in ring.iter().zip(next) {
        if (y1 > lat) != (y2 > lat) {
            let x_cross = (x2 - x1) * (lat - y1) / (y2 - y1) + x1;
            if lng < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

/// Average of the ring vertices as `(lng, lat)`
fn vertex_centroid(ring: &[Position]) -> (f64, f64) {
    let n = ring.len() as f64;
    let (sx, sy) = ring
        .iter()
        .fold((0.0, 0.0), |(sx, sy), &[x, y]| (sx + x, sy + y));
    (sx / n, sy / n)
}

/// Convert a ring to cells by lattice sampling.
///
/// The ring may be open or closed. Cells come back deduplicated and sorted.
pub fn sample_polyfill(
    indexer: &dyn GridIndexer,
    ring: &[Position],
    res: Resolution,
    settings: &SamplerSettings,
) -> Result<Vec<CellIndex>, GridError> {
    let ring = match ring {
        [first, .., last] if first == last => &ring[..ring.len() - 1],
        _ => ring,
    };
    let bbox = BoundingBox::of_ring(ring)
        .ok_or_else(|| GridError::InvalidPolygon("empty ring".to_string()))?;

    if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
        let [lng, lat] = ring[0];
        debug!("Degenerate polygon, indexing first vertex ({}, {})", lat, lng);
        return Ok(vec![indexer.latlng_to_cell(lat, lng, res)?]);
    }

    let lattice = SamplingLattice::plan(&bbox, settings);
    let mut cells = BTreeSet::new();
    for (lng, lat) in lattice.points() {
        if !point_in_ring(lng, lat, ring) {
            continue;
        }
        match indexer.latlng_to_cell(lat, lng, res) {
            Ok(cell) => {
                cells.insert(cell);
            }
            Err(e) => debug!("Skipping sample point ({}, {}): {}", lat, lng, e),
        }
    }

    if cells.is_empty() {
        let (lng, lat) = vertex_centroid(ring);
        debug!("No sample point inside polygon, indexing vertex centroid");
        cells.insert(indexer.latlng_to_cell(lat, lng, res)?);
    }

    debug!(
        "Sampled {}x{} lattice into {} cells",
        lattice.nx,
        lattice.ny,
        cells.len()
    );
    Ok(cells.into_iter().collect())
}
