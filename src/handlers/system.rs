use axum::{Json, extract::State};
use std::sync::Arc;

use crate::AppState;
use crate::services::{AdapterStatus, adapter_status};

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn ready_check() -> &'static str {
    "READY"
}

// Adapter health and quality introspection
#[utoipa::path(
    get,
    path = "/h3/adapters/status",
    responses(
        (status = 200, description = "Per-adapter health and quality", body = Vec<AdapterStatus>)
    ),
    tag = "System"
)]
pub async fn get_adapter_status(State(state): State<Arc<AppState>>) -> Json<Vec<AdapterStatus>> {
    Json(adapter_status(state.orchestrator.adapters()))
}
