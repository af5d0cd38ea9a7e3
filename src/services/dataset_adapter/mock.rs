//! Mock dataset adapters
//!
//! Deterministic pseudo-random layers derived from cell centroids, with a few
//! coarse region heuristics (Alps steeper, Italy/Greece more seismic) so the
//! pipeline produces plausible maps without any credentials. Test fixtures,
//! not models; none of this leaks into the real adapters.

use async_trait::async_trait;
use h3o::CellIndex;
use std::collections::HashMap;

use super::DatasetAdapter;
use crate::models::{AreaRequest, CellFeatures};
use crate::services::h3_index::cell_centroid;
use crate::utils::ApiResult;

/// Deterministic noise in [0, 1) from a centroid and a per-layer salt
fn centroid_noise(lat: f64, lon: f64, salt: f64) -> f64 {
    let v = ((lat * 12.9898 + lon * 78.233 + salt * 37.719).sin() * 43758.5453).fract();
    v.abs()
}

fn in_alps(lat: f64, lon: f64) -> bool {
    (44.0..=47.8).contains(&lat) && (5.0..=16.0).contains(&lon)
}

fn in_mediterranean_seismic_belt(lat: f64, lon: f64) -> bool {
    // Italy and Greece carry the highest PGA values in Europe
    ((36.0..=46.0).contains(&lat) && (6.5..=19.0).contains(&lon))
        || ((34.5..=41.8).contains(&lat) && (19.0..=28.5).contains(&lon))
}

#[derive(Default)]
pub struct MockElevationAdapter;

#[derive(Default)]
pub struct MockSusceptibilityAdapter;

#[derive(Default)]
pub struct MockSeismicAdapter;

#[derive(Default)]
pub struct MockLandCoverAdapter;

impl MockElevationAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl MockSusceptibilityAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl MockSeismicAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl MockLandCoverAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatasetAdapter for MockElevationAdapter {
    fn name(&self) -> &str {
        "mock-elevation"
    }

    fn quality_score(&self) -> f64 {
        0.5
    }

    async fn ensure_coverage(&self, _area: &AreaRequest) -> ApiResult<()> {
        Ok(())
    }

    async fn sample_features(
        &self,
        _area: &AreaRequest,
        cells: &[CellIndex],
    ) -> ApiResult<HashMap<CellIndex, CellFeatures>> {
        let mut out = HashMap::with_capacity(cells.len());
        for &cell in cells {
            let (lat, lon) = cell_centroid(cell);
            let noise = centroid_noise(lat, lon, 1.0);

            let (elevation, slope) = if in_alps(lat, lon) {
                (400.0 + noise * 3400.0, 10.0 + centroid_noise(lat, lon, 2.0) * 45.0)
            } else {
                (noise * 800.0, centroid_noise(lat, lon, 2.0) * 15.0)
            };

            out.insert(
                cell,
                CellFeatures { elevation: Some(elevation), slope: Some(slope), ..Default::default() },
            );
        }
        Ok(out)
    }
}

#[async_trait]
impl DatasetAdapter for MockSusceptibilityAdapter {
    fn name(&self) -> &str {
        "mock-elsus"
    }

    fn quality_score(&self) -> f64 {
        0.5
    }

    async fn ensure_coverage(&self, _area: &AreaRequest) -> ApiResult<()> {
        Ok(())
    }

    async fn sample_features(
        &self,
        _area: &AreaRequest,
        cells: &[CellIndex],
    ) -> ApiResult<HashMap<CellIndex, CellFeatures>> {
        let mut out = HashMap::with_capacity(cells.len());
        for &cell in cells {
            let (lat, lon) = cell_centroid(cell);
            let noise = centroid_noise(lat, lon, 3.0);

            // mountainous terrain skews towards the upper classes
            let class = if in_alps(lat, lon) {
                2 + (noise * 4.0) as u8
            } else {
                1 + (noise * 3.0) as u8
            };

            out.insert(
                cell,
                CellFeatures { elsus_class: Some(class.clamp(1, 5)), ..Default::default() },
            );
        }
        Ok(out)
    }
}

#[async_trait]
impl DatasetAdapter for MockSeismicAdapter {
    fn name(&self) -> &str {
        "mock-seismic"
    }

    fn quality_score(&self) -> f64 {
        0.5
    }

    async fn ensure_coverage(&self, _area: &AreaRequest) -> ApiResult<()> {
        Ok(())
    }

    async fn sample_features(
        &self,
        _area: &AreaRequest,
        cells: &[CellIndex],
    ) -> ApiResult<HashMap<CellIndex, CellFeatures>> {
        let mut out = HashMap::with_capacity(cells.len());
        for &cell in cells {
            let (lat, lon) = cell_centroid(cell);
            let noise = centroid_noise(lat, lon, 4.0);

            let pga = if in_mediterranean_seismic_belt(lat, lon) {
                0.15 + noise * 0.35
            } else {
                noise * 0.12
            };

            out.insert(cell, CellFeatures { hazard_pga: Some(pga), ..Default::default() });
        }
        Ok(out)
    }
}

#[async_trait]
impl DatasetAdapter for MockLandCoverAdapter {
    fn name(&self) -> &str {
        "mock-land-cover"
    }

    fn quality_score(&self) -> f64 {
        0.5
    }

    async fn ensure_coverage(&self, _area: &AreaRequest) -> ApiResult<()> {
        Ok(())
    }

    async fn sample_features(
        &self,
        _area: &AreaRequest,
        cells: &[CellIndex],
    ) -> ApiResult<HashMap<CellIndex, CellFeatures>> {
        // a spread of Corine codes covering every super-category the models read
        const CODES: [u16; 10] = [112, 121, 131, 211, 231, 312, 324, 333, 411, 512];

        let mut out = HashMap::with_capacity(cells.len());
        for &cell in cells {
            let (lat, lon) = cell_centroid(cell);
            let noise = centroid_noise(lat, lon, 5.0);
            let code = CODES[((noise * CODES.len() as f64) as usize).min(CODES.len() - 1)];

            out.insert(cell, CellFeatures { clc_class: Some(code), ..Default::default() });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::h3_index::cells_in_bbox;

    fn alpine_area() -> AreaRequest {
        AreaRequest::new(7.5, 45.8, 7.9, 46.1, 6)
    }

    #[tokio::test]
    async fn test_mock_output_is_deterministic() {
        let area = alpine_area();
        let cells = cells_in_bbox(&area).unwrap();
        let adapter = MockElevationAdapter::new();

        let a = adapter.sample_features(&area, &cells).await.unwrap();
        let b = adapter.sample_features(&area, &cells).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_every_cell_receives_a_value() {
        let area = alpine_area();
        let cells = cells_in_bbox(&area).unwrap();

        let adapter = MockLandCoverAdapter::new();
        let sampled = adapter.sample_features(&area, &cells).await.unwrap();
        assert_eq!(sampled.len(), cells.len());
        assert!(sampled.values().all(|f| f.clc_class.is_some()));
    }

    #[tokio::test]
    async fn test_alps_are_steeper_than_lowlands() {
        let alpine = alpine_area();
        let flat = AreaRequest::new(4.5, 52.0, 5.0, 52.3, 6);

        let adapter = MockElevationAdapter::new();
        let avg_slope = |features: &HashMap<CellIndex, CellFeatures>| {
            let slopes: Vec<f64> = features.values().filter_map(|f| f.slope).collect();
            slopes.iter().sum::<f64>() / slopes.len() as f64
        };

        let alpine_cells = cells_in_bbox(&alpine).unwrap();
        let flat_cells = cells_in_bbox(&flat).unwrap();
        let a = adapter.sample_features(&alpine, &alpine_cells).await.unwrap();
        let b = adapter.sample_features(&flat, &flat_cells).await.unwrap();

        assert!(avg_slope(&a) > avg_slope(&b));
    }

    #[tokio::test]
    async fn test_seismic_belt_raises_pga() {
        let italy = AreaRequest::new(13.0, 41.5, 13.5, 42.0, 6);
        let netherlands = AreaRequest::new(4.5, 52.0, 5.0, 52.3, 6);

        let adapter = MockSeismicAdapter::new();
        let avg_pga = |features: &HashMap<CellIndex, CellFeatures>| {
            let values: Vec<f64> = features.values().filter_map(|f| f.hazard_pga).collect();
            values.iter().sum::<f64>() / values.len() as f64
        };

        let italy_cells = cells_in_bbox(&italy).unwrap();
        let nl_cells = cells_in_bbox(&netherlands).unwrap();
        let a = adapter.sample_features(&italy, &italy_cells).await.unwrap();
        let b = adapter.sample_features(&netherlands, &nl_cells).await.unwrap();

        assert!(avg_pga(&a) > avg_pga(&b));
    }

    #[test]
    fn test_elsus_classes_stay_in_range() {
        for i in 0..200 {
            let noise = centroid_noise(40.0 + i as f64 * 0.07, 8.0 + i as f64 * 0.05, 3.0);
            assert!((0.0..1.0).contains(&noise));
        }
    }
}
