use axum::{
    Json,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::AppState;
use crate::models::{AreaRequest, CellRecordV1, CellRecordV2, CompactCell, RiskConfig};
use crate::services::TileCacheStats;
use crate::utils::{ApiError, ApiResult};

/// XYZ tile coordinates; the H3 resolution derives from the zoom level
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TileParams {
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub z: Option<u32>,
    /// Omit elevation/precipitation extras from the compact response
    pub compact: Option<bool>,
}

impl TileParams {
    fn coords(&self) -> ApiResult<(u32, u32, u32)> {
        match (self.x, self.y, self.z) {
            (Some(x), Some(y), Some(z)) => {
                if z > 22 {
                    return Err(ApiError::validation_error("zoom level out of range"));
                }
                if x >= 1 << z || y >= 1 << z {
                    return Err(ApiError::validation_error("tile coordinates out of range for zoom"));
                }
                Ok((x, y, z))
            },
            _ => Err(ApiError::validation_error("missing tile coordinates: x, y, z are required")),
        }
    }
}

fn json_body(body: String) -> Response {
    (
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

// XYZ tile with simple scores (legacy v1 records)
#[utoipa::path(
    get,
    path = "/h3/tile",
    params(TileParams),
    responses(
        (status = 200, description = "Array of scored cells for the tile", body = Vec<CellRecordV1>),
        (status = 400, description = "Missing or invalid tile coordinates")
    ),
    tag = "Tiles"
)]
pub async fn get_tile(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TileParams>,
) -> ApiResult<Response> {
    let (x, y, z) = params.coords()?;
    let cache_key = format!("tile:v1:{}:{}:{}", z, x, y);

    if let Some(cached) = state.tile_cache.get(&cache_key) {
        return Ok(json_body(cached));
    }

    let area = AreaRequest::from_tile(x, y, z);
    let result = state
        .orchestrator
        .get_risks_for_area(&area, "latest", &RiskConfig::default(), None)
        .await?;

    let cells: Vec<CellRecordV1> = result.cells.iter().map(CellRecordV2::to_v1).collect();
    let body = serde_json::to_string(&cells)?;
    state.tile_cache.set(cache_key, body.clone());

    Ok(json_body(body))
}

// XYZ tile in the compact wire form
#[utoipa::path(
    get,
    path = "/h3/tile/optimized",
    params(TileParams),
    responses(
        (status = 200, description = "Array of compact cells for the tile", body = Vec<CompactCell>),
        (status = 400, description = "Missing or invalid tile coordinates")
    ),
    tag = "Tiles"
)]
pub async fn get_tile_optimized(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TileParams>,
) -> ApiResult<Response> {
    let (x, y, z) = params.coords()?;
    let compact = params.compact.unwrap_or(false);
    let cache_key = format!("tile:opt:{}:{}:{}:{}", z, x, y, compact);

    if let Some(cached) = state.tile_cache.get(&cache_key) {
        return Ok(json_body(cached));
    }

    let area = AreaRequest::from_tile(x, y, z);
    let result = state
        .orchestrator
        .get_risks_for_area(&area, "latest", &RiskConfig::default(), None)
        .await?;

    let cells: Vec<CompactCell> = result
        .cells
        .iter()
        .map(|record| {
            let mut cell = record.to_compact();
            if compact {
                cell.e = None;
                cell.p = None;
            }
            cell
        })
        .collect();

    let body = serde_json::to_string(&cells)?;
    state.tile_cache.set(cache_key, body.clone());

    Ok(json_body(body))
}

// Tile-cache introspection
#[utoipa::path(
    get,
    path = "/h3/tile/cache/stats",
    responses(
        (status = 200, description = "Tile cache counters", body = TileCacheStats)
    ),
    tag = "Tiles"
)]
pub async fn get_cache_stats(State(state): State<Arc<AppState>>) -> Json<TileCacheStats> {
    Json(state.tile_cache.stats())
}

// Operational cache clear
#[utoipa::path(
    delete,
    path = "/h3/tile/cache",
    responses(
        (status = 200, description = "Cache cleared")
    ),
    tag = "Tiles"
)]
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.tile_cache.clear();
    Json(serde_json::json!({"message": "Tile cache cleared"}))
}
