use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::features::CellFeatures;
use super::risk::RiskResult;

/// Legacy flat record (v1 schema): bare mean scores per hazard.
///
/// Feeds the simple-score endpoints and the v1 cache file. Lives alongside
/// the v2 schema for the duration of the migration window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CellRecordV1 {
    pub h3_index: String,
    pub updated_at: i64,
    pub source_hash: String,
    pub water: f64,
    pub landslide: f64,
    pub seismic: f64,
    pub mineral: f64,
    pub metadata: V1Metadata,
}

/// Legacy metadata block. `lat`/`lon` were never populated by the source and
/// are kept at 0 for wire compatibility; do not infer them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct V1Metadata {
    pub data_source: String,
    pub lat: f64,
    pub lon: f64,
}

impl V1Metadata {
    pub fn new(data_source: impl Into<String>) -> Self {
        Self { data_source: data_source.into(), lat: 0.0, lon: 0.0 }
    }
}

/// Full-distribution record (v2 schema)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CellRecordV2 {
    pub h3_index: String,
    /// Data timestamp; v2 cache lookups require an exact match on this field
    pub timestamp: String,
    pub features: CellFeatures,
    pub risks: CellRisks,
    pub updated_at: i64,
    pub source_hash: String,
    pub metadata: RecordMetadata,
}

/// The four hazard results for one cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CellRisks {
    pub landslide: RiskResult,
    pub seismic: RiskResult,
    pub water: RiskResult,
    pub mineral: RiskResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub data_source: String,
    pub cache_hit: bool,
    pub compute_time_ms: f64,
}

impl CellRecordV2 {
    /// Flatten to the legacy v1 shape (bare mean scores)
    pub fn to_v1(&self) -> CellRecordV1 {
        CellRecordV1 {
            h3_index: self.h3_index.clone(),
            updated_at: self.updated_at,
            source_hash: self.source_hash.clone(),
            water: self.risks.water.distribution.mean,
            landslide: self.risks.landslide.distribution.mean,
            seismic: self.risks.seismic.distribution.mean,
            mineral: self.risks.mineral.distribution.mean,
            metadata: V1Metadata::new(self.metadata.data_source.clone()),
        }
    }

    /// Compact wire form for the optimized tile endpoint
    pub fn to_compact(&self) -> CompactCell {
        CompactCell {
            i: self.h3_index.clone(),
            w: self.risks.water.distribution.mean,
            l: self.risks.landslide.distribution.mean,
            s: self.risks.seismic.distribution.mean,
            m: self.risks.mineral.distribution.mean,
            e: self.features.elevation,
            p: self.features.rain24h,
        }
    }
}

/// Compact cell: `i`=cell id, `w/l/s/m`=hazard means in [0,1],
/// `e`=elevation (m), `p`=24h precipitation (mm)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CompactCell {
    pub i: String,
    pub w: f64,
    pub l: f64,
    pub s: f64,
    pub m: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<f64>,
}

/// Per-request phase timings in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTimings {
    pub generate_cells: f64,
    pub cache_lookup: f64,
    pub data_fetch: f64,
    pub risk_computation: f64,
    pub total: f64,
}

/// Request-level metrics returned next to the cells
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AreaMetrics {
    pub total_cells: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub data_cube_used: bool,
    /// Set when the request deadline cut adapter work short
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub truncated: bool,
    pub timings: PhaseTimings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::risk::{RiskDistribution, RiskResult};

    fn result_with_mean(mean: f64) -> RiskResult {
        RiskResult {
            distribution: RiskDistribution {
                p_low: 0.2,
                p_medium: 0.5,
                p_high: 0.3,
                mean,
                variance: 0.05,
            },
            features_used: vec!["slope".into()],
            features_missing: vec![],
            confidence: 1.0,
            model_version: "test-v0".into(),
            is_placeholder: false,
            explanation: None,
            use_case_warning: None,
        }
    }

    fn sample_v2() -> CellRecordV2 {
        CellRecordV2 {
            h3_index: "871f1d489ffffff".into(),
            timestamp: "latest".into(),
            features: CellFeatures { elevation: Some(420.0), ..Default::default() },
            risks: CellRisks {
                landslide: result_with_mean(0.7),
                seismic: result_with_mean(0.4),
                water: result_with_mean(0.2),
                mineral: result_with_mean(0.1),
            },
            updated_at: 1_700_000_000,
            source_hash: "v1-mock-data".into(),
            metadata: RecordMetadata {
                data_source: "v1-mock-data".into(),
                cache_hit: false,
                compute_time_ms: 1.5,
            },
        }
    }

    #[test]
    fn test_v1_flattening_uses_means() {
        let v2 = sample_v2();
        let v1 = v2.to_v1();
        assert_eq!(v1.landslide, 0.7);
        assert_eq!(v1.water, 0.2);
        assert_eq!(v1.h3_index, v2.h3_index);
        // legacy metadata lat/lon stay zero
        assert_eq!(v1.metadata.lat, 0.0);
        assert_eq!(v1.metadata.lon, 0.0);
    }

    #[test]
    fn test_compact_cell_shape() {
        let compact = sample_v2().to_compact();
        let json = serde_json::to_value(&compact).unwrap();
        assert_eq!(json["i"], "871f1d489ffffff");
        assert_eq!(json["e"], 420.0);
        assert!(json.get("p").is_none());
    }

    #[test]
    fn test_v2_round_trips_through_json() {
        let v2 = sample_v2();
        let json = serde_json::to_string(&v2).unwrap();
        let back: CellRecordV2 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v2);
    }
}
