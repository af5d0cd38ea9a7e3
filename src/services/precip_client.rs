// Precipitation Client
// Purpose: HTTP client for the external precipitation microservice
// Contract: POST /precip/h3 with a cell list; missing values are zeros;
// the orchestrator always goes through the zero-fallback variant

use async_trait::async_trait;
use h3o::CellIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::PrecipConfig;
use crate::utils::{ApiError, ApiResult, RetryPolicy, with_retry};

/// 24h/72h accumulation for one cell, in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PrecipAccumulation {
    pub rain24h: f64,
    pub rain72h: f64,
}

/// Source of per-cell precipitation accumulations.
///
/// The HTTP client below is the production implementation; tests substitute
/// an in-process stub, which keeps the orchestrator free of network calls.
#[async_trait]
pub trait PrecipProvider: Send + Sync {
    /// Strict variant: any upstream failure surfaces as an error
    async fn fetch(
        &self,
        cells: &[CellIndex],
        t_ref: Option<&str>,
    ) -> ApiResult<HashMap<CellIndex, PrecipAccumulation>>;

    /// Fallback variant: on failure, every requested cell gets zeros
    async fn fetch_with_fallback(
        &self,
        cells: &[CellIndex],
        t_ref: Option<&str>,
    ) -> HashMap<CellIndex, PrecipAccumulation> {
        match self.fetch(cells, t_ref).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    "Precipitation service failed, zero-filling {} cells: {}",
                    cells.len(),
                    e
                );
                cells.iter().map(|&c| (c, PrecipAccumulation::default())).collect()
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct PrecipRequest {
    h3_indices: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    t_ref: Option<String>,
    hours_24: bool,
    hours_72: bool,
}

#[derive(Debug, Deserialize)]
struct PrecipResponse {
    cells: Vec<PrecipResponseCell>,
    #[serde(default)]
    #[allow(dead_code)]
    source: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    t_ref: Option<String>,
    #[serde(default)]
    cached: bool,
}

#[derive(Debug, Deserialize)]
struct PrecipResponseCell {
    h3_index: String,
    #[serde(default)]
    rain24h_mm: Option<f64>,
    #[serde(default)]
    rain72h_mm: Option<f64>,
}

/// HTTP client with retry, chunking, and a failure counter for metrics
pub struct PrecipClient {
    base_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    chunk_size: usize,
    failures: AtomicU64,
}

impl PrecipClient {
    pub fn new(config: &PrecipConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build precipitation HTTP client: {}", e);
                reqwest::Client::default()
            });

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            // max_retries on top of the first attempt; delays grow 2s, 4s
            retry: RetryPolicy::new(config.max_retries + 1, Duration::from_secs(2)),
            chunk_size: config.chunk_size.max(1),
            failures: AtomicU64::new(0),
        }
    }

    /// Upstream failures observed since start-up (served by metrics)
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    async fn post_once(
        &self,
        url: &str,
        request: &PrecipRequest,
    ) -> ApiResult<PrecipResponse> {
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::PrecipService(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::PrecipService(format!("upstream returned {}", status)));
        }

        response
            .json::<PrecipResponse>()
            .await
            .map_err(|e| ApiError::PrecipService(format!("malformed response: {}", e)))
    }

    async fn fetch_chunk(
        &self,
        cells: &[CellIndex],
        t_ref: Option<&str>,
    ) -> ApiResult<HashMap<CellIndex, PrecipAccumulation>> {
        let url = format!("{}/precip/h3", self.base_url);
        let request = PrecipRequest {
            h3_indices: cells.iter().map(|c| c.to_string()).collect(),
            t_ref: t_ref.map(|s| s.to_string()),
            hours_24: true,
            hours_72: true,
        };

        let response = with_retry("precip/h3", &self.retry, || self.post_once(&url, &request))
            .await
            .inspect_err(|_| {
                self.failures.fetch_add(1, Ordering::Relaxed);
            })?;

        tracing::debug!(
            "Precipitation service answered {} cells (cached: {})",
            response.cells.len(),
            response.cached
        );

        let mut out = HashMap::with_capacity(response.cells.len());
        for cell in response.cells {
            let Ok(index) = CellIndex::from_str(&cell.h3_index) else {
                tracing::warn!("Precipitation service returned bad cell id '{}'", cell.h3_index);
                continue;
            };
            out.insert(
                index,
                PrecipAccumulation {
                    rain24h: cell.rain24h_mm.unwrap_or(0.0),
                    rain72h: cell.rain72h_mm.unwrap_or(0.0),
                },
            );
        }
        Ok(out)
    }
}

#[async_trait]
impl PrecipProvider for PrecipClient {
    async fn fetch(
        &self,
        cells: &[CellIndex],
        t_ref: Option<&str>,
    ) -> ApiResult<HashMap<CellIndex, PrecipAccumulation>> {
        if cells.is_empty() {
            return Ok(HashMap::new());
        }

        let mut merged = HashMap::with_capacity(cells.len());
        for chunk in cells.chunks(self.chunk_size) {
            let partial = self.fetch_chunk(chunk, t_ref).await?;
            merged.extend(partial);
        }
        Ok(merged)
    }
}


#[cfg(test)]
mod tests {
    use super::stub::StubPrecipProvider;
    use super::*;
    use crate::models::AreaRequest;
    use crate::services::h3_index::cells_in_bbox;

    fn some_cells() -> Vec<CellIndex> {
        cells_in_bbox(&AreaRequest::new(8.4, 47.2, 8.6, 47.4, 6)).unwrap()
    }

    #[tokio::test]
    async fn test_fallback_zero_fills_on_outage() {
        let stub = StubPrecipProvider { rain24h: 0.0, rain72h: 0.0, fail: true };
        let cells = some_cells();

        let result = stub.fetch_with_fallback(&cells, None).await;
        assert_eq!(result.len(), cells.len());
        assert!(result.values().all(|p| p.rain24h == 0.0 && p.rain72h == 0.0));
    }

    #[tokio::test]
    async fn test_fallback_passes_through_on_success() {
        let stub = StubPrecipProvider { rain24h: 12.5, rain72h: 40.0, fail: false };
        let cells = some_cells();

        let result = stub.fetch_with_fallback(&cells, None).await;
        assert!(result.values().all(|p| p.rain24h == 12.5 && p.rain72h == 40.0));
    }

    #[test]
    fn test_request_serialization_shape() {
        let request = PrecipRequest {
            h3_indices: vec!["871f1d489ffffff".to_string()],
            t_ref: None,
            hours_24: true,
            hours_72: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["h3_indices"][0], "871f1d489ffffff");
        assert_eq!(json["hours_24"], true);
        assert!(json.get("t_ref").is_none());
    }

    #[test]
    fn test_response_missing_values_default_to_zero() {
        let json = r#"{
            "cells": [
                {"h3_index": "871f1d489ffffff", "rain24h_mm": 5.5},
                {"h3_index": "871f1d48affffff"}
            ],
            "source": "imerg",
            "cached": true
        }"#;
        let response: PrecipResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.cells.len(), 2);
        assert_eq!(response.cells[0].rain24h_mm, Some(5.5));
        assert_eq!(response.cells[1].rain24h_mm, None);
        assert!(response.cached);
    }

    #[test]
    fn test_client_configuration() {
        let config = PrecipConfig::default();
        let client = PrecipClient::new(&config);
        assert_eq!(client.chunk_size, 5000);
        assert_eq!(client.retry.max_attempts, 3);
        assert_eq!(client.failure_count(), 0);
    }
}
