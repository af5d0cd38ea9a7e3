use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use crate::AppState;
use crate::models::CellRecordV1;
use crate::services::h3_index::parse_cell;
use crate::utils::ApiResult;

// Single-cell lookup (legacy v1 record)
#[utoipa::path(
    get,
    path = "/cell/{h3_index}",
    params(
        ("h3_index" = String, Path, description = "H3 cell index in canonical hex form")
    ),
    responses(
        (status = 200, description = "Scored cell", body = CellRecordV1),
        (status = 400, description = "Malformed cell index")
    ),
    tag = "Cells"
)]
pub async fn get_cell(
    State(state): State<Arc<AppState>>,
    Path(h3_index): Path<String>,
) -> ApiResult<Json<CellRecordV1>> {
    let cell = parse_cell(&h3_index)?;
    tracing::debug!("Single-cell request: {}", cell);

    // the legacy endpoint is served by the v1 store whenever it has the cell
    if let Some(record) = state.cell_cache.get_v1(&cell.to_string()) {
        return Ok(Json(record));
    }

    let record = state.orchestrator.get_risk_for_cell(cell, "latest").await?;
    Ok(Json(record.to_v1()))
}
