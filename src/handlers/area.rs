use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use utoipa::{IntoParams, ToSchema};

use crate::AppState;
use crate::models::{AreaMetrics, AreaRequest, CellRecordV1, CellRecordV2, RiskConfig};
use crate::services::ProgressEvent;
use crate::utils::{ApiError, ApiResult};

/// Bounding-box query parameters; all four edges are required
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BboxParams {
    pub min_lon: Option<f64>,
    pub min_lat: Option<f64>,
    pub max_lon: Option<f64>,
    pub max_lat: Option<f64>,
    /// Target H3 resolution (default 6)
    pub res: Option<u8>,
}

impl BboxParams {
    pub fn to_area(self, default_resolution: u8) -> ApiResult<AreaRequest> {
        let mut missing = Vec::new();
        if self.min_lon.is_none() {
            missing.push("minLon");
        }
        if self.min_lat.is_none() {
            missing.push("minLat");
        }
        if self.max_lon.is_none() {
            missing.push("maxLon");
        }
        if self.max_lat.is_none() {
            missing.push("maxLat");
        }
        if !missing.is_empty() {
            return Err(ApiError::validation_error(format!(
                "missing bbox fields: {}",
                missing.join(", ")
            )));
        }

        let area = AreaRequest::new(
            self.min_lon.unwrap_or_default(),
            self.min_lat.unwrap_or_default(),
            self.max_lon.unwrap_or_default(),
            self.max_lat.unwrap_or_default(),
            self.res.unwrap_or(default_resolution),
        );
        area.validate()?;
        Ok(area)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AreaResponse {
    pub area: AreaRequest,
    pub cells: Vec<CellRecordV1>,
}

// Simple-score bbox query (legacy v1 records)
#[utoipa::path(
    get,
    path = "/h3/area",
    params(BboxParams),
    responses(
        (status = 200, description = "Scored cells for the area", body = AreaResponse),
        (status = 400, description = "Missing or invalid bbox fields")
    ),
    tag = "Area"
)]
pub async fn get_area(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BboxParams>,
) -> ApiResult<Json<AreaResponse>> {
    let area = params.to_area(state.default_resolution)?;
    tracing::debug!("v1 area request: {:?}", area);

    let result = state
        .orchestrator
        .get_risks_for_area(&area, "latest", &RiskConfig::default(), None)
        .await?;

    let cells = result.cells.iter().map(CellRecordV2::to_v1).collect();
    Ok(Json(AreaResponse { area, cells }))
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct V2AreaParams {
    pub min_lon: Option<f64>,
    pub min_lat: Option<f64>,
    pub max_lon: Option<f64>,
    pub max_lat: Option<f64>,
    pub res: Option<u8>,
    /// Data timestamp; defaults to "latest"
    pub timestamp: Option<String>,
    /// Stream the response as newline-delimited JSON
    pub stream: Option<bool>,
    /// Attach model explanations to every result
    pub explanations: Option<bool>,
}

impl V2AreaParams {
    fn bbox(&self) -> BboxParams {
        BboxParams {
            min_lon: self.min_lon,
            min_lat: self.min_lat,
            max_lon: self.max_lon,
            max_lat: self.max_lat,
            res: self.res,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct V2AreaResponse {
    pub cells: Vec<CellRecordV2>,
    pub metrics: AreaMetrics,
}

// Full-distribution bbox query, optionally streamed as ndjson
#[utoipa::path(
    get,
    path = "/v2/h3/area",
    params(V2AreaParams),
    responses(
        (status = 200, description = "Cells with full risk distributions and metrics", body = V2AreaResponse),
        (status = 400, description = "Missing or invalid bbox fields")
    ),
    tag = "Area"
)]
pub async fn get_area_v2(
    State(state): State<Arc<AppState>>,
    Query(params): Query<V2AreaParams>,
) -> ApiResult<Response> {
    let area = params.bbox().to_area(state.default_resolution)?;
    let timestamp = params.timestamp.clone().unwrap_or_else(|| "latest".to_string());
    let risk_config = RiskConfig {
        generate_explanations: params.explanations.unwrap_or(false),
        ..Default::default()
    };

    if params.stream.unwrap_or(false) {
        return Ok(stream_area(state, area, timestamp, risk_config));
    }

    let result = state
        .orchestrator
        .get_risks_for_area(&area, &timestamp, &risk_config, None)
        .await?;

    Ok(Json(V2AreaResponse { cells: result.cells, metrics: result.metrics }).into_response())
}

/// ndjson streaming variant: `progress` and `data` lines per chunk, then one
/// terminal `complete` line with the metrics.
///
/// The line channel is bounded; a slow reader blocks the forwarder, which
/// blocks the orchestrator's progress sender, which is the backpressure path.
fn stream_area(
    state: Arc<AppState>,
    area: AreaRequest,
    timestamp: String,
    risk_config: RiskConfig,
) -> Response {
    let (line_tx, line_rx) = mpsc::channel::<String>(8);
    let orchestrator = Arc::clone(&state.orchestrator);

    tokio::spawn(async move {
        let (event_tx, mut event_rx) = mpsc::channel::<ProgressEvent>(8);
        let run = orchestrator.get_risks_for_area(&area, &timestamp, &risk_config, Some(event_tx));
        tokio::pin!(run);

        let mut outcome = None;
        loop {
            tokio::select! {
                maybe_event = event_rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            if line_tx.send(event_line(&event)).await.is_err() {
                                // client went away; drop the stream
                                return;
                            }
                        },
                        // sender dropped and buffer drained: computation is over
                        None => break,
                    }
                },
                result = &mut run, if outcome.is_none() => {
                    outcome = Some(result);
                },
            }
        }

        let result = match outcome {
            Some(result) => result,
            None => run.await,
        };

        let line = match result {
            Ok(risks) => {
                serde_json::json!({"type": "complete", "metrics": risks.metrics}).to_string() + "\n"
            },
            Err(e) => {
                tracing::error!("Streaming area request failed: {}", e);
                serde_json::json!({"type": "error", "message": e.to_string()}).to_string() + "\n"
            },
        };
        let _ = line_tx.send(line).await;
    });

    let body = Body::from_stream(futures::stream::unfold(line_rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|line| (Ok::<_, std::convert::Infallible>(axum::body::Bytes::from(line)), rx))
    }));

    Response::builder()
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .unwrap_or_else(|e| {
            tracing::error!("Failed to build streaming response: {}", e);
            ApiError::internal_error("streaming response").into_response()
        })
}

fn event_line(event: &ProgressEvent) -> String {
    let value = match event {
        ProgressEvent::Progress { processed, total } => {
            serde_json::json!({"type": "progress", "processed": processed, "total": total})
        },
        ProgressEvent::Data { cells } => {
            serde_json::json!({"type": "data", "cells": cells})
        },
    };
    value.to_string() + "\n"
}
