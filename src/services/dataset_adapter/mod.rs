// Dataset Adapter Module
// Purpose: Provide unified interface for per-layer feature sources
// Design: one adapter value per dataset; a factory selects mock or real
// implementations from a single switch at start-up

mod elevation;
mod grid;
mod mock;

pub use elevation::ElevationAdapter;
pub use grid::{GridFeature, GridRasterAdapter, RasterGrid};
pub use mock::{
    MockElevationAdapter, MockLandCoverAdapter, MockSeismicAdapter, MockSusceptibilityAdapter,
};

use async_trait::async_trait;
use h3o::CellIndex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::config::DataConfig;
use crate::models::{AreaRequest, CellFeatures};
use crate::utils::ApiResult;

/// Identifier carried in cache source hashes when mock adapters feed the pipeline
pub const SOURCE_MOCK: &str = "v1-mock-data";
/// Real raster/HTTP adapters without precipitation
pub const SOURCE_REAL: &str = "v2-real-data";
/// Real adapters with the precipitation microservice merged in
pub const SOURCE_REAL_PRECIP: &str = "v3-nasa-imerg";

/// Dataset adapter trait - unified interface over every feature layer
///
/// `sample_features` returns a partial map: a cell absent from the result
/// means "no data from this source", never failure. Errors are reserved for
/// source-level breakage and are absorbed by the orchestrator.
#[async_trait]
pub trait DatasetAdapter: Send + Sync {
    /// Dataset name (for logging and the status endpoint)
    fn name(&self) -> &str;

    /// Source quality score in [0, 1]; response metadata only, never consumed
    /// by the risk engine
    fn quality_score(&self) -> f64;

    /// False once the adapter has seen an upstream auth failure and benched
    /// itself for the remainder of the process
    fn is_healthy(&self) -> bool {
        true
    }

    /// Best-effort prefetch/validation hook; must not fail the request
    async fn ensure_coverage(&self, area: &AreaRequest) -> ApiResult<()>;

    /// Extract this layer's features for the given cells
    async fn sample_features(
        &self,
        area: &AreaRequest,
        cells: &[CellIndex],
    ) -> ApiResult<HashMap<CellIndex, CellFeatures>>;
}

/// Snapshot served by the adapter status endpoint
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdapterStatus {
    pub name: String,
    pub healthy: bool,
    pub quality_score: f64,
}

pub fn adapter_status(adapters: &[Arc<dyn DatasetAdapter>]) -> Vec<AdapterStatus> {
    adapters
        .iter()
        .map(|a| AdapterStatus {
            name: a.name().to_string(),
            healthy: a.is_healthy(),
            quality_score: a.quality_score(),
        })
        .collect()
}

/// Create the adapter set based on the data configuration (factory method)
///
/// The collection is ordered; the orchestrator merges features in this order,
/// so earlier adapters win field conflicts.
pub fn create_adapters(config: &DataConfig) -> Vec<Arc<dyn DatasetAdapter>> {
    if config.use_real_data {
        tracing::info!("Using real dataset adapters (raw data dir: {})", config.raw_data_dir);
        vec![
            Arc::new(ElevationAdapter::new(
                &config.raw_data_dir,
                &config.elevation_tile_url,
            )) as Arc<dyn DatasetAdapter>,
            Arc::new(GridRasterAdapter::new(
                "elsus",
                GridFeature::ElsusClass,
                &config.raw_data_dir,
                0.85,
            )),
            Arc::new(GridRasterAdapter::new(
                "seismic-pga",
                GridFeature::HazardPga,
                &config.raw_data_dir,
                0.9,
            )),
            Arc::new(GridRasterAdapter::new(
                "corine-land-cover",
                GridFeature::ClcClass,
                &config.raw_data_dir,
                0.95,
            )),
        ]
    } else {
        tracing::info!("Using mock dataset adapters");
        vec![
            Arc::new(MockElevationAdapter::new()) as Arc<dyn DatasetAdapter>,
            Arc::new(MockSusceptibilityAdapter::new()),
            Arc::new(MockSeismicAdapter::new()),
            Arc::new(MockLandCoverAdapter::new()),
        ]
    }
}

/// Source identifier recorded on cache records produced by this adapter set
pub fn source_hash(use_real_data: bool, precip_enabled: bool) -> &'static str {
    match (use_real_data, precip_enabled) {
        (false, _) => SOURCE_MOCK,
        (true, false) => SOURCE_REAL,
        (true, true) => SOURCE_REAL_PRECIP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selects_by_flag() {
        let mut config = DataConfig::default();

        config.use_real_data = false;
        let mocks = create_adapters(&config);
        assert_eq!(mocks.len(), 4);
        assert!(mocks.iter().any(|a| a.name() == "mock-elevation"));

        config.use_real_data = true;
        let real = create_adapters(&config);
        assert_eq!(real.len(), 4);
        assert!(real.iter().any(|a| a.name() == "corine-land-cover"));
    }

    #[test]
    fn test_source_hash_variants() {
        assert_eq!(source_hash(false, false), SOURCE_MOCK);
        assert_eq!(source_hash(false, true), SOURCE_MOCK);
        assert_eq!(source_hash(true, false), SOURCE_REAL);
        assert_eq!(source_hash(true, true), SOURCE_REAL_PRECIP);
    }
}
