//! HTTP route handlers for the grid API

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::config::GridConfig;

use super::polyfill::PolyfillChain;
use super::service::{GridIndexer, parse_cell, parse_resolution};
use super::types::{
    BoundaryResponse, CellResponse, CellsResponse, CenterResponse, GeoPolygon, GridError,
    PolyfillRequest, PolyfillResponse, in_bounds,
};

/// Process start time for uptime reporting
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Record the process start time. Later calls are ignored.
pub fn mark_started() {
    START_TIME.get_or_init(Instant::now);
}

/// Application state for the grid routes
#[derive(Clone)]
pub struct GridAppState {
    pub indexer: Arc<dyn GridIndexer>,
    pub polyfill: Arc<PolyfillChain>,
    pub config: GridConfig,
}

/// Error response for the grid API
#[derive(Debug, Serialize)]
pub struct GridErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<GridError> for GridErrorResponse {
    fn from(e: GridError) -> Self {
        let code = match &e {
            GridError::CoordinateOutOfBounds { .. } => "coordinate_out_of_bounds",
            GridError::InvalidResolution(_) => "invalid_resolution",
            GridError::InvalidK { .. } => "invalid_k",
            GridError::InvalidCell(_) => "invalid_cell",
            GridError::InvalidPolygon(_) => "invalid_polygon",
            GridError::InvalidRequest(_) => "invalid_request",
            GridError::Polyfill(_) => "polyfill_error",
            GridError::Internal(_) => "internal_error",
        };
        Self {
            error: e.to_string(),
            code: code.to_string(),
        }
    }
}

impl From<QueryRejection> for GridErrorResponse {
    fn from(rejection: QueryRejection) -> Self {
        GridError::InvalidRequest(rejection.body_text()).into()
    }
}

impl From<JsonRejection> for GridErrorResponse {
    fn from(rejection: JsonRejection) -> Self {
        GridError::InvalidRequest(rejection.body_text()).into()
    }
}

impl IntoResponse for GridErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.code.as_str() {
            "internal_error" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub grid_backend: &'static str,
    pub native_polyfill: bool,
    pub uptime_seconds: u64,
}

/// Query parameters for GET /h3/index
#[derive(Debug, Deserialize)]
pub struct IndexParams {
    pub lat: f64,
    pub lng: f64,
    pub res: Option<i64>,
}

/// Query parameters for GET /h3/kring
#[derive(Debug, Deserialize)]
pub struct KringParams {
    pub cell: String,
    pub k: Option<i64>,
}

/// GET /healthz - Liveness and backend information
pub async fn health(State(state): State<GridAppState>) -> Json<HealthResponse> {
    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        grid_backend: state.indexer.name(),
        native_polyfill: state.polyfill.has_native(),
        uptime_seconds: uptime,
    })
}

/// GET /h3/index?lat=&lng=&res= - Index a point
pub async fn latlng_to_cell(
    State(state): State<GridAppState>,
    query: Result<Query<IndexParams>, QueryRejection>,
) -> Result<Json<CellResponse>, GridErrorResponse> {
    counter!("hexcell_requests_total", "endpoint" => "index").increment(1);

    let Query(params) = query?;

    if !in_bounds(params.lat, params.lng) {
        return Err(GridError::CoordinateOutOfBounds {
            lat: params.lat,
            lng: params.lng,
        }
        .into());
    }
    let res = parse_resolution(
        params
            .res
            .unwrap_or(i64::from(state.config.default_resolution)),
    )?;

    let cell = state
        .indexer
        .latlng_to_cell(params.lat, params.lng, res)
        .map_err(|e| {
            tracing::warn!("Failed to index ({}, {}): {}", params.lat, params.lng, e);
            GridErrorResponse::from(e)
        })?;

    Ok(Json(CellResponse {
        cell: cell.to_string(),
    }))
}

/// GET /h3/boundary/:cell - Boundary vertices as `[lat, lng]`
pub async fn cell_boundary(
    State(state): State<GridAppState>,
    Path(cell): Path<String>,
) -> Result<Json<BoundaryResponse>, GridErrorResponse> {
    counter!("hexcell_requests_total", "endpoint" => "boundary").increment(1);

    let cell = parse_cell(&cell)?;
    let boundary = state
        .indexer
        .cell_to_boundary(cell)
        .into_iter()
        .map(|ll| [ll.lat(), ll.lng()])
        .collect();

    Ok(Json(BoundaryResponse { boundary }))
}

/// GET /h3/center/:cell - Cell center and resolution
pub async fn cell_center(
    State(state): State<GridAppState>,
    Path(cell): Path<String>,
) -> Result<Json<CenterResponse>, GridErrorResponse> {
    counter!("hexcell_requests_total", "endpoint" => "center").increment(1);

    let cell = parse_cell(&cell)?;
    let center = state.indexer.cell_to_latlng(cell);

    Ok(Json(CenterResponse {
        lat: center.lat(),
        lng: center.lng(),
        res: u8::from(cell.resolution()),
    }))
}

/// GET /h3/kring?cell=&k= - Cells within k steps
pub async fn kring(
    State(state): State<GridAppState>,
    query: Result<Query<KringParams>, QueryRejection>,
) -> Result<Json<CellsResponse>, GridErrorResponse> {
    counter!("hexcell_requests_total", "endpoint" => "kring").increment(1);

    let Query(params) = query?;

    let k = params.k.unwrap_or(1);
    let max = state.config.max_k;
    let k = u32::try_from(k)
        .ok()
        .filter(|k| *k <= max)
        .ok_or(GridError::InvalidK { k, max })?;
    let cell = parse_cell(&params.cell)?;

    let cells = state
        .indexer
        .grid_disk(cell, k)
        .into_iter()
        .map(|c| c.to_string())
        .collect();

    Ok(Json(CellsResponse { cells }))
}

/// POST /h3/polyfill - Convert a GeoJSON polygon to cells
///
/// Never fails because a tier failed: tier errors cascade down the chain.
pub async fn polyfill(
    State(state): State<GridAppState>,
    body: Result<Json<PolyfillRequest>, JsonRejection>,
) -> Result<Json<PolyfillResponse>, GridErrorResponse> {
    counter!("hexcell_requests_total", "endpoint" => "polyfill").increment(1);

    let Json(request) = body?;

    if request.polygon.kind != "Polygon" {
        return Err(GridError::InvalidPolygon(format!(
            "expected geometry type Polygon, got {}",
            request.polygon.kind
        ))
        .into());
    }
    let res = parse_resolution(
        request
            .res
            .unwrap_or(i64::from(state.config.default_resolution)),
    )?;
    let polygon = GeoPolygon::from_coordinates(&request.polygon.coordinates)?;

    let chain = state.polyfill.clone();
    let indexer = state.indexer.clone();
    let outcome = tokio::task::spawn_blocking(move || chain.run(indexer.as_ref(), &polygon, res))
        .await
        .map_err(|e| GridError::Internal(format!("polyfill task failed: {}", e)))?
        .map_err(|e| {
            tracing::error!("Polyfill failed on every tier: {}", e);
            GridErrorResponse::from(e)
        })?;

    let cells: Vec<String> = outcome.cells.iter().map(|c| c.to_string()).collect();
    tracing::debug!(
        "Polyfill at res {} via {}: {} cells",
        u8::from(res),
        outcome.method.as_str(),
        cells.len()
    );

    Ok(Json(PolyfillResponse {
        count: cells.len(),
        cells,
        method: outcome.method,
    }))
}

/// Build grid API routes
pub fn grid_routes(state: GridAppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/h3/index", get(latlng_to_cell))
        .route("/h3/boundary/:cell", get(cell_boundary))
        .route("/h3/center/:cell", get(cell_center))
        .route("/h3/kring", get(kring))
        .route("/h3/polyfill", post(polyfill))
        .with_state(state)
}
