//! On-disk grid rasters (ELSUS, seismic PGA, Corine land cover)
//!
//! The service does not parse raster formats itself; datasets are provisioned
//! under the raw-data directory as decoded grid files behind this narrow
//! sampling interface. Point sampling uses the grid's geo-transform.

use async_trait::async_trait;
use h3o::CellIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::DatasetAdapter;
use crate::models::{AreaRequest, CellFeatures};
use crate::services::h3_index::cell_centroid;
use crate::utils::{ApiError, ApiResult};

/// A decoded raster grid with a WGS84 bounding box.
///
/// `data` is row-major, north row first, `width * height` long.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterGrid {
    /// [min_lon, min_lat, max_lon, max_lat]
    pub bbox: [f64; 4],
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub nodata: Option<f64>,
    pub data: Vec<f64>,
}

impl RasterGrid {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let grid: RasterGrid = serde_json::from_str(&content)?;
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.width == 0 || self.height == 0 {
            anyhow::bail!("grid has zero dimension");
        }
        if self.data.len() != self.width * self.height {
            anyhow::bail!(
                "grid data length {} does not match {}x{}",
                self.data.len(),
                self.width,
                self.height
            );
        }
        if self.bbox[0] >= self.bbox[2] || self.bbox[1] >= self.bbox[3] {
            anyhow::bail!("grid bbox is degenerate");
        }
        Ok(())
    }

    /// Sample the grid at a point; out-of-bounds and nodata return None
    pub fn sample(&self, lat: f64, lon: f64) -> Option<f64> {
        let [min_lon, min_lat, max_lon, max_lat] = self.bbox;

        let px = ((lon - min_lon) / (max_lon - min_lon) * self.width as f64).floor();
        let py = ((max_lat - lat) / (max_lat - min_lat) * self.height as f64).floor();

        if px < 0.0 || py < 0.0 {
            return None;
        }
        let (px, py) = (px as usize, py as usize);
        if px >= self.width || py >= self.height {
            return None;
        }

        let value = self.data[py * self.width + px];
        if self.nodata.is_some_and(|nd| value == nd) || value.is_nan() {
            return None;
        }
        Some(value)
    }
}

/// Which feature field a grid layer populates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridFeature {
    ElsusClass,
    HazardPga,
    ClcClass,
}

impl GridFeature {
    fn apply(&self, features: &mut CellFeatures, value: f64) {
        match self {
            GridFeature::ElsusClass => {
                features.elsus_class = Some((value.round() as i64).clamp(1, 5) as u8);
            },
            GridFeature::HazardPga => {
                features.hazard_pga = Some(value.max(0.0));
            },
            GridFeature::ClcClass => {
                features.clc_class = Some((value.round() as i64).clamp(0, u16::MAX as i64) as u16);
            },
        }
    }
}

/// Real adapter over one on-disk grid dataset
pub struct GridRasterAdapter {
    name: String,
    feature: GridFeature,
    grid_path: PathBuf,
    quality: f64,
    grid: RwLock<Option<Arc<RasterGrid>>>,
}

impl GridRasterAdapter {
    pub fn new(name: &str, feature: GridFeature, raw_data_dir: &str, quality: f64) -> Self {
        let grid_path = Path::new(raw_data_dir).join(name).join("europe.grid.json");
        Self {
            name: name.to_string(),
            feature,
            grid_path,
            quality,
            grid: RwLock::new(None),
        }
    }

    async fn load_grid(&self) -> ApiResult<Option<Arc<RasterGrid>>> {
        {
            let cached = self.grid.read().await;
            if cached.is_some() {
                return Ok(cached.clone());
            }
        }

        if !self.grid_path.exists() {
            tracing::warn!(
                "Dataset '{}' has no grid file at {:?}; serving no data",
                self.name,
                self.grid_path
            );
            return Ok(None);
        }

        let grid = RasterGrid::from_file(&self.grid_path).map_err(|e| {
            ApiError::dataset_unavailable(self.name.clone(), format!("grid load failed: {}", e))
        })?;
        tracing::info!(
            "Dataset '{}' loaded: {}x{} cells covering {:?}",
            self.name,
            grid.width,
            grid.height,
            grid.bbox
        );

        let grid = Arc::new(grid);
        *self.grid.write().await = Some(Arc::clone(&grid));
        Ok(Some(grid))
    }
}

#[async_trait]
impl DatasetAdapter for GridRasterAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn quality_score(&self) -> f64 {
        self.quality
    }

    async fn ensure_coverage(&self, _area: &AreaRequest) -> ApiResult<()> {
        // best-effort warm-up; a missing or corrupt file must not fail the request
        if let Err(e) = self.load_grid().await {
            tracing::warn!("Dataset '{}' coverage check failed: {}", self.name, e);
        }
        Ok(())
    }

    async fn sample_features(
        &self,
        _area: &AreaRequest,
        cells: &[CellIndex],
    ) -> ApiResult<HashMap<CellIndex, CellFeatures>> {
        let Some(grid) = self.load_grid().await? else {
            return Ok(HashMap::new());
        };

        let mut out = HashMap::new();
        for &cell in cells {
            let (lat, lon) = cell_centroid(cell);
            if let Some(value) = grid.sample(lat, lon) {
                let mut features = CellFeatures::default();
                self.feature.apply(&mut features, value);
                out.insert(cell, features);
            }
        }
        Ok(out)
    }
}
