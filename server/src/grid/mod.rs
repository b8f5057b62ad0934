//! Hexagonal grid module
//!
//! This module provides:
//! - `GridIndexer` trait for abstracting grid backends
//! - `H3oIndexer` backed by the `h3o` crate
//! - `PolyfillChain`, the native-then-sampler polygon conversion
//! - HTTP routes for index, boundary, k-ring and polyfill

pub mod native;
pub mod polyfill;
pub mod routes;
pub mod sampler;
mod service;
mod types;

pub use native::H3oIndexer;
pub use polyfill::{NativeTier, PolyfillChain, PolyfillOutcome, PolyfillTier, SampledTier};
pub use routes::{GridAppState, grid_routes};
pub use sampler::{SamplerSettings, point_in_ring, sample_polyfill};
pub use service::{GridIndexer, parse_cell, parse_resolution};
pub use types::{
    BoundingBox, GeoJsonPolygon, GeoPolygon, GridError, PolyfillMethod, PolyfillRequest,
    PolyfillResponse, Position, in_bounds, open_ring,
};
