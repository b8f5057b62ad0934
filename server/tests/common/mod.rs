//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use h3o::{CellIndex, LatLng, Resolution};
use hexcell_server::config::{GridConfig, PolyfillConfig};
use hexcell_server::grid::{GeoPolygon, GridError};
use hexcell_server::{GridAppState, GridIndexer, H3oIndexer, PolyfillChain, grid_routes};
use tower_http::cors::{Any, CorsLayer};

/// A cell near San Francisco used across tests
pub const SF_CELL: &str = "8928308280fffff";

/// Indexer whose native polygon conversion always fails, forcing the sampler
pub struct FailingIndexer {
    inner: H3oIndexer,
}

impl FailingIndexer {
    pub fn new() -> Self {
        Self {
            inner: H3oIndexer::new(),
        }
    }
}

impl GridIndexer for FailingIndexer {
    fn name(&self) -> &'static str {
        "failing-native"
    }

    fn latlng_to_cell(&self, lat: f64, lng: f64, res: Resolution) -> Result<CellIndex, GridError> {
        self.inner.latlng_to_cell(lat, lng, res)
    }

    fn cell_to_boundary(&self, cell: CellIndex) -> Vec<LatLng> {
        self.inner.cell_to_boundary(cell)
    }

    fn cell_to_latlng(&self, cell: CellIndex) -> LatLng {
        self.inner.cell_to_latlng(cell)
    }

    fn grid_disk(&self, cell: CellIndex, k: u32) -> Vec<CellIndex> {
        self.inner.grid_disk(cell, k)
    }

    fn polygon_to_cells(
        &self,
        _polygon: &GeoPolygon,
        _res: Resolution,
    ) -> Result<Vec<CellIndex>, GridError> {
        Err(GridError::Polyfill("native tiler unavailable".to_string()))
    }
}

fn build_app(indexer: Arc<dyn GridIndexer>, polyfill: PolyfillConfig) -> Router {
    let state = GridAppState {
        indexer,
        polyfill: Arc::new(PolyfillChain::from_config(&polyfill)),
        config: GridConfig::default(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    grid_routes(state).layer(cors)
}

/// Create a test application router with default configuration
pub fn create_test_app() -> Router {
    build_app(Arc::new(H3oIndexer::new()), PolyfillConfig::default())
}

/// App configured to skip the native tier entirely
pub fn create_sampler_only_app() -> Router {
    build_app(
        Arc::new(H3oIndexer::new()),
        PolyfillConfig {
            native_enabled: false,
            ..PolyfillConfig::default()
        },
    )
}

/// App whose native tier is enabled but always errors
pub fn create_failing_native_app() -> Router {
    build_app(Arc::new(FailingIndexer::new()), PolyfillConfig::default())
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Small square in central Sao Paulo, `[lng, lat]`
pub fn sao_paulo_square() -> serde_json::Value {
    serde_json::json!({
        "type": "Polygon",
        "coordinates": [[
            [-46.64, -23.56],
            [-46.62, -23.56],
            [-46.62, -23.54],
            [-46.64, -23.54],
            [-46.64, -23.56]
        ]]
    })
}
