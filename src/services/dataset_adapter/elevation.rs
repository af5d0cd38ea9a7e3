//! Real elevation adapter
//!
//! Samples S3-hosted elevation tiles keyed by integer degree. Downloaded
//! tiles are cached raw on disk under the raw-data directory and decoded
//! grids are held in a bounded LRU. Slope is derived per cell from
//! finite differences around the centroid.

use async_trait::async_trait;
use h3o::CellIndex;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{DatasetAdapter, RasterGrid};
use crate::models::{AreaRequest, CellFeatures};
use crate::services::h3_index::cell_centroid;
use crate::utils::{ApiResult, RetryPolicy};

/// Decoded tiles held in memory at once
const TILE_CACHE_CAP: usize = 100;
/// Neighbour offset for the slope finite difference (~1 arc-second)
const ARC_SECOND: f64 = 1.0 / 3600.0;
/// Metres per degree of latitude
const METRES_PER_DEGREE: f64 = 111_320.0;
/// ensure_coverage refuses to prefetch unreasonably large areas
const MAX_PREFETCH_TILES: usize = 64;

type TileKey = (i32, i32);

pub struct ElevationAdapter {
    raw_dir: PathBuf,
    url_template: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    tiles: Mutex<LruCache<TileKey, Arc<RasterGrid>>>,
    healthy: AtomicBool,
}

impl ElevationAdapter {
    pub fn new(raw_data_dir: &str, url_template: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build HTTP client for elevation tiles: {}", e);
                reqwest::Client::default()
            });

        Self {
            raw_dir: PathBuf::from(raw_data_dir).join("elevation"),
            url_template: url_template.to_string(),
            http,
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
            tiles: Mutex::new(LruCache::new(
                NonZeroUsize::new(TILE_CACHE_CAP).expect("cap is non-zero"),
            )),
            healthy: AtomicBool::new(true),
        }
    }

    fn tile_key(lat: f64, lon: f64) -> TileKey {
        (lat.floor() as i32, lon.floor() as i32)
    }

    fn tile_path(&self, key: TileKey) -> PathBuf {
        self.raw_dir.join(format!("tile_{}_{}.grid.json", key.0, key.1))
    }

    fn tile_url(&self, key: TileKey) -> String {
        self.url_template
            .replace("{n}", &key.0.to_string())
            .replace("{e}", &key.1.to_string())
    }

    /// Fetch a tile into the raw-data directory.
    ///
    /// Transient failures retry with back-off; 401/403 benches the adapter
    /// for the remainder of the process and is never retried.
    async fn download_tile(&self, key: TileKey) -> ApiResult<bool> {
        let url = self.tile_url(key);

        let mut attempt = 1;
        loop {
            match self.http.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN
                    {
                        // no retries on auth failures; benched until restart
                        self.healthy.store(false, Ordering::Relaxed);
                        tracing::error!(
                            "Elevation source rejected credentials ({}); adapter disabled for this process",
                            status
                        );
                        return Err(crate::utils::ApiError::DatasetAuthFailed {
                            dataset: "elevation".to_string(),
                        });
                    }
                    if status == reqwest::StatusCode::NOT_FOUND {
                        // ocean tiles do not exist
                        tracing::debug!("No elevation tile at {:?}", key);
                        return Ok(false);
                    }
                    if status.is_success() {
                        let body = response.text().await.map_err(|e| {
                            crate::utils::ApiError::dataset_unavailable(
                                "elevation",
                                format!("tile body read failed: {}", e),
                            )
                        })?;
                        std::fs::create_dir_all(&self.raw_dir).ok();
                        std::fs::write(self.tile_path(key), &body).map_err(|e| {
                            crate::utils::ApiError::dataset_unavailable(
                                "elevation",
                                format!("tile write failed: {}", e),
                            )
                        })?;
                        tracing::info!("Downloaded elevation tile {:?}", key);
                        return Ok(true);
                    }
                    tracing::warn!(
                        "Elevation tile {:?} download failed with status {} (attempt {}/{})",
                        key,
                        status,
                        attempt,
                        self.retry.max_attempts
                    );
                },
                Err(e) => {
                    tracing::warn!(
                        "Elevation tile {:?} download error (attempt {}/{}): {}",
                        key,
                        attempt,
                        self.retry.max_attempts,
                        e
                    );
                },
            }

            if attempt >= self.retry.max_attempts {
                return Err(crate::utils::ApiError::dataset_unavailable(
                    "elevation",
                    format!("tile {:?} unreachable after {} attempts", key, attempt),
                ));
            }
            tokio::time::sleep(self.retry.delay_for(attempt)).await;
            attempt += 1;
        }
    }

    /// Decoded grid for the tile containing the key, loading and downloading
    /// as needed. None when the tile does not exist or the source is benched.
    async fn tile(&self, key: TileKey) -> Option<Arc<RasterGrid>> {
        {
            let mut cache = self.tiles.lock().await;
            if let Some(grid) = cache.get(&key) {
                return Some(Arc::clone(grid));
            }
        }

        let path = self.tile_path(key);
        if !path.exists() {
            if !self.healthy.load(Ordering::Relaxed) {
                return None;
            }
            match self.download_tile(key).await {
                Ok(true) => {},
                Ok(false) => return None,
                Err(e) => {
                    tracing::warn!("Elevation tile {:?} unavailable: {}", key, e);
                    return None;
                },
            }
        }

        match RasterGrid::from_file(&path) {
            Ok(grid) => {
                let grid = Arc::new(grid);
                self.tiles.lock().await.put(key, Arc::clone(&grid));
                Some(grid)
            },
            Err(e) => {
                tracing::warn!("Elevation tile {:?} is corrupt: {}", key, e);
                None
            },
        }
    }

    async fn sample_point(&self, lat: f64, lon: f64) -> Option<f64> {
        let grid = self.tile(Self::tile_key(lat, lon)).await?;
        grid.sample(lat, lon)
    }

    /// Slope from the centroid and four neighbours offset by ~1 arc-second
    async fn slope_at(&self, lat: f64, lon: f64) -> Option<f64> {
        let north = self.sample_point(lat + ARC_SECOND, lon).await?;
        let south = self.sample_point(lat - ARC_SECOND, lon).await?;
        let east = self.sample_point(lat, lon + ARC_SECOND).await?;
        let west = self.sample_point(lat, lon - ARC_SECOND).await?;
        Some(slope_from_gradient(north, south, east, west, lat))
    }
}

/// Finite-difference slope in degrees from four neighbour elevations
fn slope_from_gradient(north: f64, south: f64, east: f64, west: f64, lat: f64) -> f64 {
    let dy_m = 2.0 * ARC_SECOND * METRES_PER_DEGREE;
    let dx_m = dy_m * lat.to_radians().cos().abs().max(1e-9);

    let gx = (east - west) / dx_m;
    let gy = (north - south) / dy_m;

    (gx * gx + gy * gy).sqrt().atan().to_degrees()
}

#[async_trait]
impl DatasetAdapter for ElevationAdapter {
    fn name(&self) -> &str {
        "copernicus-elevation"
    }

    fn quality_score(&self) -> f64 {
        0.9
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    async fn ensure_coverage(&self, area: &AreaRequest) -> ApiResult<()> {
        let (lat_lo, lat_hi) = (area.min_lat.floor() as i32, area.max_lat.floor() as i32);
        let (lon_lo, lon_hi) = (area.min_lon.floor() as i32, area.max_lon.floor() as i32);

        let tile_count =
            ((lat_hi - lat_lo + 1) as usize).saturating_mul((lon_hi - lon_lo + 1) as usize);
        if tile_count > MAX_PREFETCH_TILES {
            tracing::warn!(
                "Skipping elevation prefetch for {} tiles (limit {})",
                tile_count,
                MAX_PREFETCH_TILES
            );
            return Ok(());
        }

        for lat in lat_lo..=lat_hi {
            for lon in lon_lo..=lon_hi {
                // best-effort: missing tiles surface as "no data" at sample time
                let _ = self.tile((lat, lon)).await;
            }
        }
        Ok(())
    }

    async fn sample_features(
        &self,
        _area: &AreaRequest,
        cells: &[CellIndex],
    ) -> ApiResult<HashMap<CellIndex, CellFeatures>> {
        if !self.is_healthy() {
            return Ok(HashMap::new());
        }

        let mut out = HashMap::new();
        for &cell in cells {
            let (lat, lon) = cell_centroid(cell);
            let Some(elevation) = self.sample_point(lat, lon).await else {
                continue;
            };
            let slope = self.slope_at(lat, lon).await;

            out.insert(
                cell,
                CellFeatures { elevation: Some(elevation), slope, ..Default::default() },
            );
        }
        Ok(out)
    }
}
