//! Seismic hazard model
//!
//! Peak ground acceleration, optionally amplified by a site class inferred
//! from land cover. A known lithology would supersede the land-cover
//! heuristic; no adapter populates it yet.

use super::{
    F_CLC, F_PGA, RiskError, RiskOutcome, clamp_confidence, clc, confidence,
    distribution_from_mean, normalize, substitute, variance_with_missing,
};
use crate::models::{CellFeatures, RiskConfig, RiskResult};
use serde::{Deserialize, Serialize};

pub const MODEL_VERSION: &str = "seismic-v0.2.1-pga-site-enhanced";

/// Seismic carries high epistemic uncertainty
const BASE_VARIANCE: f64 = 0.15;

/// Qualitative hazard classification over the amplified PGA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeismicClass {
    Low,
    Moderate,
    High,
    VeryHigh,
}

pub fn classify_seismic(amplified_pga: f64) -> SeismicClass {
    if amplified_pga < 0.1 {
        SeismicClass::Low
    } else if amplified_pga < 0.3 {
        SeismicClass::Moderate
    } else if amplified_pga < 0.5 {
        SeismicClass::High
    } else {
        SeismicClass::VeryHigh
    }
}

pub fn compute_seismic_risk(
    features: &CellFeatures,
    config: &RiskConfig,
) -> RiskOutcome<RiskResult> {
    let mut used = Vec::new();
    let mut missing = Vec::new();
    let mut confidence_multiplier = 1.0;

    let base_pga = match features.hazard_pga {
        Some(pga) => {
            used.push(F_PGA.to_string());
            pga
        },
        None => {
            missing.push(F_PGA.to_string());
            substitute(config, 0.1, 0.2).ok_or(RiskError::MissingRequiredFeature {
                model: "seismic",
                feature: F_PGA,
            })?
        },
    };

    let amplification = match (features.lithology, features.clc_class) {
        // lithology supersedes the land-cover heuristic (reserved hook)
        (Some(_), _) => 1.0,
        (None, Some(code)) => {
            used.push(F_CLC.to_string());
            let factor = site_amplification(code);
            if factor != 1.0 {
                confidence_multiplier *= 0.7;
            }
            factor
        },
        (None, None) => {
            missing.push(F_CLC.to_string());
            1.0
        },
    };

    let amplified = base_pga * amplification;
    let mean = normalize(amplified, 0.0, 0.5).powf(0.8).clamp(0.0, 1.0);
    let variance = variance_with_missing(BASE_VARIANCE, missing.len());
    let conf = clamp_confidence(confidence(used.len(), 2) * confidence_multiplier);

    let explanation = config.generate_explanations.then(|| {
        format!(
            "Seismic mean {:.3}: PGA {:.3}g x site factor {:.1} = {:.3}g ({:?})",
            mean,
            base_pga,
            amplification,
            amplified,
            classify_seismic(amplified)
        )
    });

    Ok(RiskResult {
        distribution: distribution_from_mean(mean, variance),
        features_used: used,
        features_missing: missing,
        confidence: conf,
        model_version: MODEL_VERSION.to_string(),
        is_placeholder: false,
        explanation,
        use_case_warning: None,
    })
}

/// Land-cover-inferred site amplification: saturated ground amplifies shaking,
/// built-up areas sit on fill more often than not
fn site_amplification(code: u16) -> f64 {
    if clc::is_wetland(code) || clc::is_water(code) {
        1.8
    } else if clc::is_urban(code) {
        1.3
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MissingDataStrategy;

    fn features(pga: Option<f64>, clc: Option<u16>) -> CellFeatures {
        CellFeatures { hazard_pga: pga, clc_class: clc, ..Default::default() }
    }

    #[test]
    fn test_forest_site_is_unamplified() {
        let result =
            compute_seismic_risk(&features(Some(0.20), Some(312)), &RiskConfig::default())
                .unwrap();
        // (0.20/0.5)^0.8
        assert!((result.distribution.mean - 0.4805).abs() < 1e-3);
    }

    #[test]
    fn test_wetland_amplifies_over_forest() {
        let config = RiskConfig::default();
        let forest = compute_seismic_risk(&features(Some(0.20), Some(312)), &config).unwrap();
        let wetland = compute_seismic_risk(&features(Some(0.20), Some(411)), &config).unwrap();

        // amplified 0.36 -> (0.72)^0.8
        assert!((wetland.distribution.mean - 0.769).abs() < 1e-2);
        assert!(wetland.distribution.mean > forest.distribution.mean);
        // inferred site class costs confidence
        assert!(wetland.confidence < forest.confidence);
    }

    #[test]
    fn test_mean_monotone_in_pga() {
        let config = RiskConfig::default();
        let mut last = -1.0;
        for pga in [0.0, 0.05, 0.1, 0.2, 0.35, 0.5, 0.6] {
            let result = compute_seismic_risk(&features(Some(pga), Some(211)), &config).unwrap();
            assert!(result.distribution.mean >= last, "mean decreased at pga {}", pga);
            last = result.distribution.mean;
        }
    }

    #[test]
    fn test_conservative_default_when_pga_missing() {
        let config = RiskConfig::default();
        let result = compute_seismic_risk(&features(None, Some(211)), &config).unwrap();

        // base 0.2 under conservative strategy
        let expected = normalize(0.2, 0.0, 0.5).powf(0.8);
        assert!((result.distribution.mean - expected).abs() < 1e-9);
        assert_eq!(result.features_missing, vec![F_PGA.to_string()]);
        assert!((result.distribution.variance - 0.15 * 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_fail_strategy_aborts_on_missing_pga() {
        let config = RiskConfig {
            missing_data_strategy: MissingDataStrategy::Fail,
            ..Default::default()
        };
        assert!(compute_seismic_risk(&features(None, Some(211)), &config).is_err());
    }

    #[test]
    fn test_classification_bands() {
        assert_eq!(classify_seismic(0.05), SeismicClass::Low);
        assert_eq!(classify_seismic(0.15), SeismicClass::Moderate);
        assert_eq!(classify_seismic(0.4), SeismicClass::High);
        assert_eq!(classify_seismic(0.55), SeismicClass::VeryHigh);
    }

    #[test]
    fn test_site_amplification_table() {
        assert_eq!(site_amplification(411), 1.8);
        assert_eq!(site_amplification(512), 1.8);
        assert_eq!(site_amplification(112), 1.3);
        assert_eq!(site_amplification(312), 1.0);
        assert_eq!(site_amplification(211), 1.0);
    }

    #[test]
    fn test_deterministic() {
        let config = RiskConfig::default();
        let a = compute_seismic_risk(&features(Some(0.27), Some(411)), &config).unwrap();
        let b = compute_seismic_risk(&features(Some(0.27), Some(411)), &config).unwrap();
        assert_eq!(a, b);
    }
}
