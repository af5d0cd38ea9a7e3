//! Landslide susceptibility model
//!
//! Slope and ELSUS class, weighted 60/40. When the ELSUS layer has no value
//! for a cell the class factor is inferred from slope bands at a confidence
//! penalty.

use super::{
    F_ELSUS, F_SLOPE, RiskError, RiskOutcome, clamp_confidence, confidence,
    distribution_from_mean, substitute, variance_with_missing,
};
use crate::models::{CellFeatures, RiskConfig, RiskResult};

pub const MODEL_VERSION: &str = "landslide-v0.2.1-enhanced-heuristic";

const BASE_VARIANCE: f64 = 0.05;
const SLOPE_WEIGHT: f64 = 0.6;
const ELSUS_WEIGHT: f64 = 0.4;

pub fn compute_landslide_risk(
    features: &CellFeatures,
    config: &RiskConfig,
) -> RiskOutcome<RiskResult> {
    let mut used = Vec::new();
    let mut missing = Vec::new();
    let mut confidence_multiplier = 1.0;

    let slope_factor = match features.slope {
        Some(slope) => {
            used.push(F_SLOPE.to_string());
            slope_factor(slope)
        },
        None => {
            missing.push(F_SLOPE.to_string());
            substitute(config, 0.5, 0.7).ok_or(RiskError::MissingRequiredFeature {
                model: "landslide",
                feature: F_SLOPE,
            })?
        },
    };

    let elsus_factor = match features.elsus_class {
        Some(class) => {
            used.push(F_ELSUS.to_string());
            elsus_factor(class)
        },
        None => {
            missing.push(F_ELSUS.to_string());
            match features.slope {
                // ELSUS inferred from slope bands; penalized below
                Some(slope) => {
                    confidence_multiplier *= 0.8;
                    inferred_elsus_factor(slope)
                },
                None => substitute(config, 0.5, 0.7).ok_or(
                    RiskError::MissingRequiredFeature { model: "landslide", feature: F_ELSUS },
                )?,
            }
        },
    };

    let mean = (SLOPE_WEIGHT * slope_factor + ELSUS_WEIGHT * elsus_factor).clamp(0.0, 1.0);
    let variance = variance_with_missing(BASE_VARIANCE, missing.len());
    let conf = clamp_confidence(confidence(used.len(), 2) * confidence_multiplier);

    let explanation = config.generate_explanations.then(|| {
        format!(
            "Landslide mean {:.3} from slope factor {:.3} (weight {}) and ELSUS factor {:.3} (weight {})",
            mean, slope_factor, SLOPE_WEIGHT, elsus_factor, ELSUS_WEIGHT
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

/// Slope contribution: linear to 45 deg, non-linear boost up to 70 deg,
/// saturating beyond
fn slope_factor(slope: f64) -> f64 {
    if slope <= 0.0 {
        0.0
    } else if slope <= 45.0 {
        slope / 45.0
    } else {
        (1.0 + 0.3 * (slope - 45.0) / 25.0).min(1.3)
    }
}

/// ELSUS class 1..5 mapped onto [0, 1]
fn elsus_factor(class: u8) -> f64 {
    (class.clamp(1, 5) as f64 - 1.0) / 4.0
}

/// Slope-band fallback when the ELSUS layer has no value
fn inferred_elsus_factor(slope: f64) -> f64 {
    if slope < 10.0 {
        0.1
    } else if slope < 20.0 {
        0.3
    } else if slope < 30.0 {
        0.5
    } else if slope < 40.0 {
        0.7
    } else {
        0.85
    }
}
