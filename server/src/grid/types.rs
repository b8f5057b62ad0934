//! Grid-related types and error definitions

use geo_types::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when working with the hexagonal grid
#[derive(Debug, Error)]
pub enum GridError {
    #[error("lat/lng out of bounds: lat={lat}, lng={lng}")]
    CoordinateOutOfBounds { lat: f64, lng: f64 },

    #[error("res must be between 0 and 15, got {0}")]
    InvalidResolution(i64),

    #[error("k must be between 0 and {max}, got {k}")]
    InvalidK { k: i64, max: u32 },

    #[error("Invalid cell index: {0}")]
    InvalidCell(String),

    #[error("Invalid polygon: {0}")]
    InvalidPolygon(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Polyfill failed: {0}")]
    Polyfill(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A (longitude, latitude) pair, GeoJSON order.
pub type Position = [f64; 2];

/// Returns true when `lat`/`lng` are finite and inside WGS84 bounds.
pub fn in_bounds(lat: f64, lng: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

/// Polygon with an exterior ring and optional holes.
///
/// Rings are stored open: a closing vertex equal to the first one is
/// dropped on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPolygon {
    pub exterior: Vec<Position>,
    pub holes: Vec<Vec<Position>>,
}

impl GeoPolygon {
    /// Build from an exterior ring only.
    pub fn from_exterior(ring: Vec<Position>) -> Result<Self, GridError> {
        Self::new(ring, Vec::new())
    }

    pub fn new(exterior: Vec<Position>, holes: Vec<Vec<Position>>) -> Result<Self, GridError> {
        if exterior.len() < 3 {
            return Err(GridError::InvalidPolygon(
                "exterior ring needs at least 3 positions".to_string(),
            ));
        }
        for ring in std::iter::once(&exterior).chain(holes.iter()) {
            for &[lng, lat] in ring {
                if !in_bounds(lat, lng) {
                    return Err(GridError::CoordinateOutOfBounds { lat, lng });
                }
            }
        }
        Ok(Self {
            exterior: open_ring(exterior),
            holes: holes
                .into_iter()
                .map(open_ring)
                .filter(|h| h.len() >= 3)
                .collect(),
        })
    }

    /// Parse GeoJSON polygon coordinates (`[[[lng, lat], ...], ...]`).
    pub fn from_coordinates(coordinates: &[Vec<Vec<f64>>]) -> Result<Self, GridError> {
        let mut rings = coordinates.iter().map(|ring| {
            ring.iter()
                .map(|pos| match pos.as_slice() {
                    [lng, lat, ..] => Ok([*lng, *lat]),
                    _ => Err(GridError::InvalidPolygon(
                        "position needs [lng, lat]".to_string(),
                    )),
                })
                .collect::<Result<Vec<Position>, GridError>>()
        });

        let exterior = match rings.next() {
            Some(ring) => ring?,
            None => {
                return Err(GridError::InvalidPolygon(
                    "polygon has no exterior ring".to_string(),
                ));
            }
        };
        let holes = rings.collect::<Result<Vec<_>, _>>()?;
        Self::new(exterior, holes)
    }

    /// Convert to a `geo_types` polygon with closed rings.
    pub fn to_geo(&self) -> Polygon<f64> {
        fn line(ring: &[Position]) -> LineString<f64> {
            LineString::from(
                ring.iter()
                    .map(|&[x, y]| Coord { x, y })
                    .collect::<Vec<_>>(),
            )
        }
        Polygon::new(
            line(&self.exterior),
            self.holes.iter().map(|h| line(h)).collect(),
        )
    }

    /// Closed exterior ring, as GeoJSON expects.
    pub fn closed_exterior(&self) -> Vec<Position> {
        let mut ring = self.exterior.clone();
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }
        ring
    }
}

/// Drop the closing vertex of a ring if present.
pub fn open_ring(mut ring: Vec<Position>) -> Vec<Position> {
    if ring.len() >= 2 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// Axis-aligned bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Bounding box of a ring; `None` when the ring is empty.
    pub fn of_ring(ring: &[Position]) -> Option<Self> {
        let (first, rest) = ring.split_first()?;
        let init = Self {
            min_lng: first[0],
            min_lat: first[1],
            max_lng: first[0],
            max_lat: first[1],
        };
        Some(rest.iter().fold(init, |b, &[lng, lat]| Self {
            min_lng: b.min_lng.min(lng),
            min_lat: b.min_lat.min(lat),
            max_lng: b.max_lng.max(lng),
            max_lat: b.max_lat.max(lat),
        }))
    }

    pub fn width(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let b = Self {
            min_lng: self.min_lng.max(other.min_lng),
            min_lat: self.min_lat.max(other.min_lat),
            max_lng: self.max_lng.min(other.max_lng),
            max_lat: self.max_lat.min(other.max_lat),
        };
        (b.width() > 0.0 && b.height() > 0.0).then_some(b)
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }
}

/// Which polyfill tier produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolyfillMethod {
    Native,
    Sampled,
}

impl PolyfillMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolyfillMethod::Native => "native",
            PolyfillMethod::Sampled => "sampled",
        }
    }
}

/// GeoJSON polygon geometry accepted by the polyfill endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoJsonPolygon {
    #[serde(rename = "type", default = "polygon_type")]
    pub kind: String,
    pub coordinates: Vec<Vec<Vec<f64>>>,
}

fn polygon_type() -> String {
    "Polygon".to_string()
}

/// Body for POST /h3/polyfill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolyfillRequest {
    pub polygon: GeoJsonPolygon,
    #[serde(default)]
    pub res: Option<i64>,
}

/// Response for POST /h3/polyfill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolyfillResponse {
    pub cells: Vec<String>,
    pub count: usize,
    pub method: PolyfillMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellResponse {
    pub cell: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryResponse {
    /// Vertices as `[lat, lng]`
    pub boundary: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CenterResponse {
    pub lat: f64,
    pub lng: f64,
    pub res: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellsResponse {
    pub cells: Vec<String>,
}
