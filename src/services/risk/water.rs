//! Water-stress models
//!
//! Two implementations behind one entry point: the production
//! runoff/infiltration model runs whenever a precipitation accumulation is
//! present; otherwise the terrain-proxy placeholder stands in and says so.

use super::{
    F_CLC, F_RAIN24, F_RAIN72, F_SLOPE, RiskError, RiskOutcome, clamp_confidence, clc,
    confidence, distribution_from_mean, normalize, substitute, variance_with_missing,
};
use crate::models::{CellFeatures, RiskConfig, RiskResult};

pub const PRODUCTION_VERSION: &str = "water-v1.0.0-PRODUCTION-precipitation-integrated";
pub const PLACEHOLDER_VERSION: &str = "water-v0.2.1-PLACEHOLDER-terrain-proxy";

const PLACEHOLDER_WARNING: &str = "Terrain-proxy estimate without precipitation data; \
     not validated for operational water-stress assessment";

/// Dispatch: production model when any precipitation accumulation is present,
/// terrain proxy otherwise
pub fn compute_water_risk(
    features: &CellFeatures,
    config: &RiskConfig,
) -> RiskOutcome<RiskResult> {
    if features.rain24h.is_some() || features.rain72h.is_some() {
        compute_production(features, config)
    } else {
        compute_terrain_proxy(features, config)
    }
}

// ============================================================================
// Production model: runoff vs infiltration
// ============================================================================

fn compute_production(features: &CellFeatures, config: &RiskConfig) -> RiskOutcome<RiskResult> {
    let mut used = Vec::new();
    let mut missing = Vec::new();

    let slope = match features.slope {
        Some(slope) => {
            used.push(F_SLOPE.to_string());
            slope
        },
        None => {
            missing.push(F_SLOPE.to_string());
            substitute(config, 10.0, 20.0).ok_or(RiskError::MissingRequiredFeature {
                model: "water",
                feature: F_SLOPE,
            })?
        },
    };

    let land_cover = features.clc_class;
    match land_cover {
        Some(_) => used.push(F_CLC.to_string()),
        None => missing.push(F_CLC.to_string()),
    }

    // precipitation gaps are zero-filled, matching the upstream service contract
    let rain24 = match features.rain24h {
        Some(mm) => {
            used.push(F_RAIN24.to_string());
            mm
        },
        None => {
            missing.push(F_RAIN24.to_string());
            0.0
        },
    };
    let rain72 = match features.rain72h {
        Some(mm) => {
            used.push(F_RAIN72.to_string());
            mm
        },
        None => {
            missing.push(F_RAIN72.to_string());
            0.0
        },
    };

    let runoff_coeff = runoff_coefficient(slope, land_cover);
    let capacity = match land_cover {
        Some(code) => infiltration_capacity(code),
        None => substitute(config, 30.0, 10.0).ok_or(RiskError::MissingRequiredFeature {
            model: "water",
            feature: F_CLC,
        })?,
    };

    let stress24 = (rain24 * runoff_coeff / (capacity * 24.0)).min(1.0);
    let stress72 = (rain72 * runoff_coeff / (capacity * 72.0)).min(1.0);
    let combined = 0.6 * stress24 + 0.4 * stress72;

    let intensity_boost = if rain24 > 100.0 {
        0.2
    } else if rain24 > 60.0 {
        0.1
    } else {
        0.0
    };

    let mean = (combined + intensity_boost).min(1.0).max(0.0);
    let variance = variance_with_missing(0.06, missing.len());
    let conf = clamp_confidence(confidence(used.len(), 4).min(0.85));

    let explanation = config.generate_explanations.then(|| {
        format!(
            "Water stress {:.3}: runoff coeff {:.2}, infiltration {:.0} mm/h, \
             24h stress {:.3}, 72h stress {:.3}, intensity boost {:.1}",
            mean, runoff_coeff, capacity, stress24, stress72, intensity_boost
        )
    });

    Ok(RiskResult {
        distribution: distribution_from_mean(mean, variance),
        features_used: used,
        features_missing: missing,
        confidence: conf,
        model_version: PRODUCTION_VERSION.to_string(),
        is_placeholder: false,
        explanation,
        use_case_warning: None,
    })
}

/// Fraction of incident precipitation that runs off instead of infiltrating.
/// Slope bands flat/moderate/steep/extreme interpolate into
/// [0.1-0.2] / [0.2-0.4] / [0.4-0.7] / [0.7-0.9]; land cover shifts the result.
fn runoff_coefficient(slope: f64, land_cover: Option<u16>) -> f64 {
    if let Some(code) = land_cover
        && clc::is_water(code)
    {
        // water bodies absorb whatever arrives
        return 0.0;
    }

    let slope = slope.max(0.0);
    let base = if slope <= 2.0 {
        0.1 + (slope / 2.0) * 0.1
    } else if slope <= 10.0 {
        0.2 + ((slope - 2.0) / 8.0) * 0.2
    } else if slope <= 20.0 {
        0.4 + ((slope - 10.0) / 10.0) * 0.3
    } else {
        // ramp to the 0.9 ceiling by 40 degrees, flat beyond
        0.7 + (((slope - 20.0) / 20.0).min(1.0)) * 0.2
    };

    let adjustment = match land_cover {
        Some(code) if clc::is_urban(code) => 0.2,
        Some(code) if clc::is_forest(code) => -0.15,
        Some(code) if clc::is_wetland(code) => -0.2,
        _ => 0.0,
    };

    (base + adjustment).clamp(0.0, 1.0)
}

/// Infiltration capacity in mm/h by land cover
fn infiltration_capacity(code: u16) -> f64 {
    if clc::is_forest(code) {
        50.0
    } else if clc::is_grassland(code) {
        30.0
    } else if clc::is_agricultural(code) {
        15.0
    } else if clc::is_urban(code) {
        5.0
    } else if clc::is_wetland(code) {
        80.0
    } else if clc::is_water(code) {
        1000.0
    } else if clc::is_bare(code) {
        10.0
    } else {
        // scrubland and remaining semi-natural classes
        30.0
    }
}

// ============================================================================
// Terrain-proxy placeholder
// ============================================================================

fn compute_terrain_proxy(
    features: &CellFeatures,
    config: &RiskConfig,
) -> RiskOutcome<RiskResult> {
    let mut used = Vec::new();
    let mut missing = Vec::new();

    let base = match features.slope {
        Some(slope) => {
            used.push(F_SLOPE.to_string());
            normalize(slope, 0.0, 20.0)
        },
        None => {
            missing.push(F_SLOPE.to_string());
            substitute(config, 0.5, 0.7).ok_or(RiskError::MissingRequiredFeature {
                model: "water",
                feature: F_SLOPE,
            })?
        },
    };

    let adjustment = match features.clc_class {
        Some(code) => {
            used.push(F_CLC.to_string());
            land_cover_adjustment(code)
        },
        None => {
            missing.push(F_CLC.to_string());
            0.0
        },
    };

    // the absent accumulations are what routed us here; they are reported as
    // missing but the placeholder's own variance base already prices them in
    let terrain_gaps = missing.len();
    missing.push(F_RAIN24.to_string());
    missing.push(F_RAIN72.to_string());

    let mean = (base + adjustment).clamp(0.0, 1.0);
    let variance = variance_with_missing(0.12, terrain_gaps);
    let conf = clamp_confidence(confidence(used.len(), 2) * 0.3);

    let explanation = config.generate_explanations.then(|| {
        format!(
            "Terrain-proxy water stress {:.3}: normalized slope {:.3} with land-cover adjustment {:+.2}",
            mean, base, adjustment
        )
    });

    Ok(RiskResult {
        distribution: distribution_from_mean(mean, variance),
        features_used: used,
        features_missing: missing,
        confidence: conf,
        model_version: PLACEHOLDER_VERSION.to_string(),
        is_placeholder: true,
        explanation,
        use_case_warning: Some(PLACEHOLDER_WARNING.to_string()),
    })
}

fn land_cover_adjustment(code: u16) -> f64 {
    if clc::is_forest(code) {
        -0.15
    } else if clc::is_scrubland(code) {
        -0.05
    } else if clc::is_urban(code) {
        0.2
    } else if clc::is_wetland(code) {
        -0.3
    } else if clc::is_water(code) {
        -0.4
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(
        slope: Option<f64>,
        clc: Option<u16>,
        rain24: Option<f64>,
        rain72: Option<f64>,
    ) -> CellFeatures {
        CellFeatures {
            slope,
            clc_class: clc,
            rain24h: rain24,
            rain72h: rain72,
            ..Default::default()
        }
    }

    #[test]
    fn test_fallback_without_rain_is_flagged() {
        let result = compute_water_risk(
            &features(Some(15.0), Some(312), None, None),
            &RiskConfig::default(),
        )
        .unwrap();

        assert!(result.is_placeholder);
        assert!(result.model_version.contains("PLACEHOLDER"));
        assert!(result.use_case_warning.as_deref().is_some_and(|w| !w.is_empty()));
        assert!(result.confidence <= 0.3);
        // normalize(15, 0, 20) - 0.15 forest
        assert!((result.distribution.mean - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_production_with_heavy_rain() {
        let result = compute_water_risk(
            &features(Some(15.0), Some(312), Some(120.0), Some(200.0)),
            &RiskConfig::default(),
        )
        .unwrap();

        assert!(!result.is_placeholder);
        assert_eq!(result.model_version, PRODUCTION_VERSION);
        assert!(result.confidence <= 0.85);
        assert!(result.use_case_warning.is_none());

        // coeff 0.55 - 0.15 = 0.40, capacity 50 mm/h
        let s24: f64 = (120.0 * 0.40_f64 / (50.0 * 24.0)).min(1.0);
        let s72: f64 = (200.0 * 0.40_f64 / (50.0 * 72.0)).min(1.0);
        let expected = (0.6 * s24 + 0.4 * s72 + 0.2).min(1.0);
        assert!((result.distribution.mean - expected).abs() < 1e-9);
    }

    #[test]
    fn test_intensity_boost_tiers() {
        let config = RiskConfig::default();
        let base = |rain: f64| {
            compute_water_risk(&features(Some(10.0), Some(211), Some(rain), Some(rain)), &config)
                .unwrap()
                .distribution
                .mean
        };

        // crossing the 60mm and 100mm thresholds adds visible jumps
        let below = base(59.0);
        let mid = base(61.0);
        let above = base(101.0);
        assert!(mid > below);
        assert!(above > mid);
    }

    #[test]
    fn test_mean_monotone_in_rain24() {
        let config = RiskConfig::default();
        let mut last = -1.0;
        for rain in [0.0, 10.0, 40.0, 61.0, 80.0, 101.0, 150.0, 400.0] {
            let result =
                compute_water_risk(&features(Some(12.0), Some(211), Some(rain), Some(50.0)), &config)
                    .unwrap();
            assert!(result.distribution.mean >= last, "decreased at rain {}", rain);
            last = result.distribution.mean;
        }
    }

    #[test]
    fn test_water_body_short_circuits_runoff() {
        assert_eq!(runoff_coefficient(25.0, Some(512)), 0.0);
        let result = compute_water_risk(
            &features(Some(25.0), Some(512), Some(200.0), Some(300.0)),
            &RiskConfig::default(),
        )
        .unwrap();
        // only the intensity boost survives
        assert!((result.distribution.mean - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_runoff_bands_are_continuous() {
        for (a, b) in [(2.0, 2.0001), (10.0, 10.0001), (20.0, 20.0001)] {
            let low = runoff_coefficient(a, None);
            let high = runoff_coefficient(b, None);
            assert!((high - low).abs() < 1e-3, "jump at slope {}", a);
        }
        assert!((runoff_coefficient(0.0, None) - 0.1).abs() < 1e-12);
        assert!((runoff_coefficient(40.0, None) - 0.9).abs() < 1e-12);
        assert!((runoff_coefficient(60.0, None) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_urban_raises_runoff_forest_lowers_it() {
        let neutral = runoff_coefficient(10.0, Some(211));
        assert!(runoff_coefficient(10.0, Some(112)) > neutral);
        assert!(runoff_coefficient(10.0, Some(312)) < neutral);
    }

    #[test]
    fn test_infiltration_table() {
        assert_eq!(infiltration_capacity(312), 50.0);
        assert_eq!(infiltration_capacity(321), 30.0);
        assert_eq!(infiltration_capacity(211), 15.0);
        assert_eq!(infiltration_capacity(112), 5.0);
        assert_eq!(infiltration_capacity(411), 80.0);
        assert_eq!(infiltration_capacity(512), 1000.0);
        assert_eq!(infiltration_capacity(333), 10.0);
    }

    #[test]
    fn test_placeholder_adjustments() {
        let config = RiskConfig::default();
        let wetland =
            compute_water_risk(&features(Some(10.0), Some(411), None, None), &config).unwrap();
        let urban =
            compute_water_risk(&features(Some(10.0), Some(112), None, None), &config).unwrap();
        assert!(urban.distribution.mean > wetland.distribution.mean);
    }

    #[test]
    fn test_missing_rain72_counts_missing_but_scores() {
        let result = compute_water_risk(
            &features(Some(10.0), Some(312), Some(30.0), None),
            &RiskConfig::default(),
        )
        .unwrap();
        assert!(!result.is_placeholder);
        assert!(result.features_missing.contains(&F_RAIN72.to_string()));
        assert!((result.distribution.variance - 0.06 * 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_used_and_missing_are_disjoint() {
        let config = RiskConfig::default();
        for f in [
            features(Some(10.0), Some(312), Some(30.0), Some(50.0)),
            features(None, Some(312), Some(30.0), None),
            features(Some(10.0), None, None, None),
            features(None, None, None, None),
        ] {
            let result = compute_water_risk(&f, &config).unwrap();
            for used in &result.features_used {
                assert!(!result.features_missing.contains(used));
            }
        }
    }
}
