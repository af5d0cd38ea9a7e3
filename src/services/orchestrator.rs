// Risk Orchestrator
// Purpose: turn an area request into scored cells - enumerate, partition
// against the cell cache, fan out the adapters, merge features, compute the
// four hazards in chunks, write back, respond
// State machine: enumerate -> cache-partition -> (short-circuit | fetch ->
// merge -> chunked-compute -> cache-write) -> respond

use chrono::Utc;
use futures::future::join_all;
use h3o::CellIndex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::config::OrchestratorConfig;
use crate::models::{
    AreaMetrics, AreaRequest, CellFeatures, CellRecordV2, CellRisks, RecordMetadata, RiskConfig,
};
use crate::services::cell_cache::CellCache;
use crate::services::dataset_adapter::DatasetAdapter;
use crate::services::h3_index::{cell_centroid, cells_in_bbox};
use crate::services::precip_client::PrecipProvider;
use crate::services::risk::{
    compute_landslide_risk, compute_mineral_risk, compute_seismic_risk, compute_water_risk,
};
use crate::utils::ApiResult;

/// Streaming progress events, one channel message per chunk
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Progress { processed: usize, total: usize },
    Data { cells: Vec<CellRecordV2> },
}

/// The scored cells and the metrics for one request
#[derive(Debug, Clone)]
pub struct AreaRisks {
    pub cells: Vec<CellRecordV2>,
    pub metrics: AreaMetrics,
}

pub struct RiskOrchestrator {
    adapters: Vec<Arc<dyn DatasetAdapter>>,
    precip: Option<Arc<dyn PrecipProvider>>,
    cell_cache: Arc<CellCache>,
    source_hash: String,
    chunk_size: usize,
    request_deadline: Duration,
}

impl RiskOrchestrator {
    pub fn new(
        adapters: Vec<Arc<dyn DatasetAdapter>>,
        precip: Option<Arc<dyn PrecipProvider>>,
        cell_cache: Arc<CellCache>,
        source_hash: impl Into<String>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            adapters,
            precip,
            cell_cache,
            source_hash: source_hash.into(),
            chunk_size: config.chunk_size.max(1),
            request_deadline: Duration::from_secs(config.request_timeout_secs),
        }
    }

    pub fn adapters(&self) -> &[Arc<dyn DatasetAdapter>] {
        &self.adapters
    }

    /// Score every cell in the area for the given data timestamp.
    ///
    /// With a `progress` channel, one `Data` and one `Progress` message go out
    /// after each computed chunk; the bounded channel lets a slow consumer
    /// exert backpressure on the computation.
    pub async fn get_risks_for_area(
        &self,
        area: &AreaRequest,
        timestamp: &str,
        risk_config: &RiskConfig,
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> ApiResult<AreaRisks> {
        let request_start = Instant::now();
        let mut metrics = AreaMetrics::default();

        // 1. enumerate
        let phase = Instant::now();
        let cells = cells_in_bbox(area)?;
        metrics.timings.generate_cells = ms_since(phase);
        metrics.total_cells = cells.len();

        // 2. partition against the cell cache
        let phase = Instant::now();
        let ids: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
        let looked_up = self.cell_cache.get_multi_v2(&ids, timestamp);

        let mut cached = Vec::new();
        let mut missing = Vec::new();
        for (cell, record) in cells.iter().zip(looked_up) {
            match record {
                Some(mut record) => {
                    record.metadata.cache_hit = true;
                    cached.push(record);
                },
                None => missing.push(*cell),
            }
        }
        metrics.timings.cache_lookup = ms_since(phase);
        metrics.cache_hits = cached.len();
        metrics.cache_misses = missing.len();

        tracing::debug!(
            "Area request: {} cells, {} cached, {} to compute",
            metrics.total_cells,
            metrics.cache_hits,
            metrics.cache_misses
        );

        // 3. short-circuit on a full cache hit
        if missing.is_empty() {
            metrics.timings.total = ms_since(request_start);
            return Ok(AreaRisks { cells: cached, metrics });
        }

        // 4-6. fetch and merge features for the missing cells
        let phase = Instant::now();
        let features =
            self.fetch_features(area, &missing, request_start, &mut metrics).await;
        metrics.timings.data_fetch = ms_since(phase);

        // 7. chunked risk computation with write-back
        let phase = Instant::now();
        let total_missing = missing.len();
        let mut computed = Vec::with_capacity(total_missing);
        let mut processed = 0;

        for chunk in missing.chunks(self.chunk_size) {
            let mut chunk_records = Vec::with_capacity(chunk.len());

            for cell in chunk {
                let cell_features = features.get(cell).cloned().unwrap_or_default();
                match self.score_cell(*cell, timestamp, risk_config, cell_features) {
                    Ok(record) => {
                        self.cell_cache.put(record.clone());
                        chunk_records.push(record);
                    },
                    Err(e) => {
                        // fatal for this cell only; the response omits it
                        tracing::warn!("Skipping cell {}: {}", cell, e);
                    },
                }
            }

            processed += chunk.len();
            if let Some(sender) = &progress {
                let _ = sender
                    .send(ProgressEvent::Data { cells: chunk_records.clone() })
                    .await;
                let _ = sender
                    .send(ProgressEvent::Progress { processed, total: total_missing })
                    .await;
            }
            computed.extend(chunk_records);
        }
        metrics.timings.risk_computation = ms_since(phase);

        // 8. cached-first, then newly computed; both in enumeration order
        let mut all = cached;
        all.extend(computed);
        metrics.timings.total = ms_since(request_start);

        Ok(AreaRisks { cells: all, metrics })
    }

    /// Score a single cell, serving from the v2 cache when fresh
    pub async fn get_risk_for_cell(
        &self,
        cell: CellIndex,
        timestamp: &str,
    ) -> ApiResult<CellRecordV2> {
        if let Some(mut record) = self.cell_cache.get_v2(&cell.to_string(), timestamp) {
            record.metadata.cache_hit = true;
            return Ok(record);
        }

        let (lat, lon) = cell_centroid(cell);
        let area = AreaRequest::new(lon, lat, lon, lat, u8::from(cell.resolution()));

        let mut metrics = AreaMetrics::default();
        let features = self
            .fetch_features(&area, &[cell], Instant::now(), &mut metrics)
            .await;

        let record = self.score_cell(
            cell,
            timestamp,
            &RiskConfig::default(),
            features.get(&cell).cloned().unwrap_or_default(),
        )?;
        self.cell_cache.put(record.clone());
        Ok(record)
    }

    /// Steps 4-6: concurrent ensure-coverage, concurrent sampling plus
    /// precipitation, then a deterministic per-cell merge.
    ///
    /// Every upstream call is bounded by what remains of the request
    /// deadline; an expired call contributes nothing and flags truncation.
    async fn fetch_features(
        &self,
        area: &AreaRequest,
        missing: &[CellIndex],
        request_start: Instant,
        metrics: &mut AreaMetrics,
    ) -> HashMap<CellIndex, CellFeatures> {
        let remaining = || {
            self.request_deadline
                .checked_sub(request_start.elapsed())
                .filter(|d| !d.is_zero())
        };

        // ensure coverage everywhere; failures never abort the request
        if let Some(budget) = remaining() {
            let coverage = join_all(self.adapters.iter().map(|adapter| {
                let adapter = Arc::clone(adapter);
                async move {
                    match tokio::time::timeout(budget, adapter.ensure_coverage(area)).await {
                        Ok(Ok(())) => {},
                        Ok(Err(e)) => {
                            tracing::warn!("Adapter '{}' coverage failed: {}", adapter.name(), e);
                        },
                        Err(_) => {
                            tracing::warn!("Adapter '{}' coverage timed out", adapter.name());
                        },
                    }
                }
            }));
            coverage.await;
        } else {
            metrics.truncated = true;
        }

        // sample all layers and the precipitation service concurrently
        let mut merged: HashMap<CellIndex, CellFeatures> = HashMap::with_capacity(missing.len());

        let Some(budget) = remaining() else {
            metrics.truncated = true;
            return merged;
        };

        let samples = join_all(self.adapters.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            async move {
                match tokio::time::timeout(budget, adapter.sample_features(area, missing)).await {
                    Ok(Ok(features)) => features,
                    Ok(Err(e)) => {
                        tracing::warn!(
                            "Adapter '{}' failed, treating as no data: {}",
                            adapter.name(),
                            e
                        );
                        HashMap::new()
                    },
                    Err(_) => {
                        tracing::warn!("Adapter '{}' timed out, no contribution", adapter.name());
                        HashMap::new()
                    },
                }
            }
        }));

        let precip = async {
            match &self.precip {
                Some(provider) => {
                    match tokio::time::timeout(
                        budget,
                        provider.fetch_with_fallback(missing, None),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            tracing::warn!("Precipitation fetch timed out, no contribution");
                            HashMap::new()
                        },
                    }
                },
                None => HashMap::new(),
            }
        };

        let (sampled, rain) = tokio::join!(samples, precip);

        if request_start.elapsed() >= self.request_deadline {
            metrics.truncated = true;
        }

        // merge in fixed adapter order; completion order cannot matter
        for layer in sampled {
            for (cell, features) in layer {
                merged.entry(cell).or_default().merge_from(&features);
            }
        }
        for (cell, accumulation) in rain {
            let entry = merged.entry(cell).or_default();
            if entry.rain24h.is_none() {
                entry.rain24h = Some(accumulation.rain24h);
            }
            if entry.rain72h.is_none() {
                entry.rain72h = Some(accumulation.rain72h);
            }
        }

        merged
    }

    /// The four hazard computations plus record assembly for one cell
    fn score_cell(
        &self,
        cell: CellIndex,
        timestamp: &str,
        risk_config: &RiskConfig,
        features: CellFeatures,
    ) -> ApiResult<CellRecordV2> {
        let started = Instant::now();

        let risks = (|| {
            Ok::<CellRisks, crate::services::risk::RiskError>(CellRisks {
                landslide: compute_landslide_risk(&features, risk_config)?,
                seismic: compute_seismic_risk(&features, risk_config)?,
                water: compute_water_risk(&features, risk_config)?,
                mineral: compute_mineral_risk(&features, risk_config)?,
            })
        })()
        .map_err(|e| crate::utils::ApiError::RiskComputation {
            cell: cell.to_string(),
            message: e.to_string(),
        })?;

        Ok(CellRecordV2 {
            h3_index: cell.to_string(),
            timestamp: timestamp.to_string(),
            features,
            risks,
            updated_at: Utc::now().timestamp_millis(),
            source_hash: self.source_hash.clone(),
            metadata: RecordMetadata {
                data_source: self.source_hash.clone(),
                cache_hit: false,
                compute_time_ms: ms_since(started),
            },
        })
    }
}

fn ms_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataConfig, OrchestratorConfig};
    use crate::services::dataset_adapter::{SOURCE_MOCK, create_adapters};
    use crate::services::precip_client::stub::StubPrecipProvider;
    use crate::utils::ApiError;
    use async_trait::async_trait;

    fn test_area() -> AreaRequest {
        AreaRequest::new(8.4, 47.2, 8.6, 47.4, 6)
    }

    fn orchestrator(
        precip: Option<Arc<dyn PrecipProvider>>,
        cache: Arc<CellCache>,
    ) -> RiskOrchestrator {
        let adapters = create_adapters(&DataConfig::default());
        RiskOrchestrator::new(
            adapters,
            precip,
            cache,
            SOURCE_MOCK,
            &OrchestratorConfig { chunk_size: 10, default_resolution: 6, request_timeout_secs: 60 },
        )
    }

    fn temp_cache() -> Arc<CellCache> {
        let dir = tempfile::tempdir().unwrap();
        // keep the tempdir alive for the test process
        let cache = Arc::new(CellCache::open(dir.path().to_str().unwrap()));
        std::mem::forget(dir);
        cache
    }

    #[tokio::test]
    async fn test_round_trip_second_call_is_all_hits() {
        let orchestrator = orchestrator(None, temp_cache());
        let area = test_area();

        let first = orchestrator
            .get_risks_for_area(&area, "latest", &RiskConfig::default(), None)
            .await
            .unwrap();
        assert!(first.metrics.total_cells > 0);
        assert_eq!(first.metrics.cache_hits, 0);
        assert_eq!(first.metrics.cache_misses, first.metrics.total_cells);
        assert_eq!(first.cells.len(), first.metrics.total_cells);

        let second = orchestrator
            .get_risks_for_area(&area, "latest", &RiskConfig::default(), None)
            .await
            .unwrap();
        assert_eq!(second.metrics.cache_hits, first.metrics.total_cells);
        assert_eq!(second.metrics.cache_misses, 0);
        assert!(second.metrics.timings.data_fetch == 0.0);

        let mut first_ids: Vec<String> =
            first.cells.iter().map(|c| c.h3_index.clone()).collect();
        let mut second_ids: Vec<String> =
            second.cells.iter().map(|c| c.h3_index.clone()).collect();
        first_ids.sort();
        second_ids.sort();
        assert_eq!(first_ids, second_ids);
        assert!(second.cells.iter().all(|c| c.metadata.cache_hit));
    }

    #[tokio::test]
    async fn test_without_precip_water_is_placeholder() {
        let orchestrator = orchestrator(None, temp_cache());
        let result = orchestrator
            .get_risks_for_area(&test_area(), "latest", &RiskConfig::default(), None)
            .await
            .unwrap();

        assert!(!result.cells.is_empty());
        for cell in &result.cells {
            assert!(cell.risks.water.is_placeholder);
            assert!(cell.risks.water.model_version.contains("PLACEHOLDER"));
        }
    }

    #[tokio::test]
    async fn test_precip_merge_selects_production_water_model() {
        let precip: Arc<dyn PrecipProvider> =
            Arc::new(StubPrecipProvider { rain24h: 25.0, rain72h: 60.0, fail: false });
        let orchestrator = orchestrator(Some(precip), temp_cache());

        let result = orchestrator
            .get_risks_for_area(&test_area(), "latest", &RiskConfig::default(), None)
            .await
            .unwrap();
        for cell in &result.cells {
            assert_eq!(cell.features.rain24h, Some(25.0));
            assert!(!cell.risks.water.is_placeholder);
        }
    }

    #[tokio::test]
    async fn test_precip_outage_zero_fills() {
        let precip: Arc<dyn PrecipProvider> =
            Arc::new(StubPrecipProvider { rain24h: 0.0, rain72h: 0.0, fail: true });
        let orchestrator = orchestrator(Some(precip), temp_cache());

        let result = orchestrator
            .get_risks_for_area(&test_area(), "latest", &RiskConfig::default(), None)
            .await
            .unwrap();
        assert_eq!(result.cells.len(), result.metrics.total_cells);
        // zeros still select the production model
        for cell in &result.cells {
            assert_eq!(cell.features.rain24h, Some(0.0));
            assert!(!cell.risks.water.is_placeholder);
        }
    }

    struct BrokenAdapter;

    #[async_trait]
    impl DatasetAdapter for BrokenAdapter {
        fn name(&self) -> &str {
            "broken"
        }

        fn quality_score(&self) -> f64 {
            0.0
        }

        async fn ensure_coverage(&self, _area: &AreaRequest) -> ApiResult<()> {
            Err(ApiError::dataset_unavailable("broken", "always down"))
        }

        async fn sample_features(
            &self,
            _area: &AreaRequest,
            _cells: &[CellIndex],
        ) -> ApiResult<HashMap<CellIndex, CellFeatures>> {
            Err(ApiError::dataset_unavailable("broken", "always down"))
        }
    }

    #[tokio::test]
    async fn test_adapter_failure_degrades_to_no_data() {
        let cache = temp_cache();
        let orchestrator = RiskOrchestrator::new(
            vec![Arc::new(BrokenAdapter) as Arc<dyn DatasetAdapter>],
            None,
            cache,
            SOURCE_MOCK,
            &OrchestratorConfig::default(),
        );

        let result = orchestrator
            .get_risks_for_area(&test_area(), "latest", &RiskConfig::default(), None)
            .await
            .unwrap();
        // every cell still scores, on conservative defaults
        assert_eq!(result.cells.len(), result.metrics.total_cells);
        for cell in &result.cells {
            assert!(cell.features.is_empty());
            assert!(cell.risks.landslide.confidence <= 0.5);
        }
    }

    #[tokio::test]
    async fn test_progress_events_cover_all_missing_cells() {
        let orchestrator = orchestrator(None, temp_cache());
        let (tx, mut rx) = mpsc::channel(64);

        let result = orchestrator
            .get_risks_for_area(&test_area(), "latest", &RiskConfig::default(), Some(tx))
            .await
            .unwrap();

        let mut streamed = 0;
        let mut last_progress = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                ProgressEvent::Data { cells } => streamed += cells.len(),
                ProgressEvent::Progress { processed, total } => {
                    assert!(processed <= total);
                    last_progress = processed;
                },
            }
        }

        assert_eq!(streamed, result.metrics.cache_misses);
        assert_eq!(last_progress, result.metrics.cache_misses);
    }

    #[tokio::test]
    async fn test_stale_timestamp_recomputes() {
        let cache = temp_cache();
        let orchestrator = orchestrator(None, Arc::clone(&cache));
        let area = test_area();

        let first = orchestrator
            .get_risks_for_area(&area, "2024-05-01", &RiskConfig::default(), None)
            .await
            .unwrap();
        let second = orchestrator
            .get_risks_for_area(&area, "2024-05-02", &RiskConfig::default(), None)
            .await
            .unwrap();

        assert_eq!(second.metrics.cache_hits, 0);
        assert_eq!(second.metrics.cache_misses, first.metrics.total_cells);
    }

    #[tokio::test]
    async fn test_single_cell_lookup_round_trips() {
        let cache = temp_cache();
        let orchestrator = orchestrator(None, Arc::clone(&cache));

        let cell = crate::services::h3_index::cell_at(47.37, 8.54, 6).unwrap();
        let first = orchestrator.get_risk_for_cell(cell, "latest").await.unwrap();
        assert!(!first.metadata.cache_hit);

        let second = orchestrator.get_risk_for_cell(cell, "latest").await.unwrap();
        assert!(second.metadata.cache_hit);
        assert_eq!(first.h3_index, second.h3_index);
    }

    #[tokio::test]
    async fn test_merged_features_are_deterministic() {
        let a = orchestrator(None, temp_cache());
        let b = orchestrator(None, temp_cache());
        let area = test_area();

        let first =
            a.get_risks_for_area(&area, "latest", &RiskConfig::default(), None).await.unwrap();
        let second =
            b.get_risks_for_area(&area, "latest", &RiskConfig::default(), None).await.unwrap();

        let features_of = |risks: &AreaRisks| {
            let mut list: Vec<(String, CellFeatures)> = risks
                .cells
                .iter()
                .map(|c| (c.h3_index.clone(), c.features.clone()))
                .collect();
            list.sort_by(|x, y| x.0.cmp(&y.0));
            list
        };
        assert_eq!(features_of(&first), features_of(&second));
    }
}
