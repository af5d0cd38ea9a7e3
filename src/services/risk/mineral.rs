//! Mineral resource model
//!
//! Existing-site detector over the land-cover layer. Flags mapped extraction
//! sites; it cannot predict undiscovered deposits and says so.

use super::{
    F_CLC, RiskError, RiskOutcome, clamp_confidence, clc, confidence, distribution_from_mean,
    variance_with_missing,
};
use crate::models::{CellFeatures, MissingDataStrategy, RiskConfig, RiskResult};

pub const MODEL_VERSION: &str = "mineral-v0.2.1-PLACEHOLDER-existing-site-detector";

const WARNING: &str = "Existing-site detector over land cover only; \
     does not predict undiscovered mineral deposits";

pub fn compute_mineral_risk(
    features: &CellFeatures,
    config: &RiskConfig,
) -> RiskOutcome<RiskResult> {
    let mut used = Vec::new();
    let mut missing = Vec::new();

    let mean = match features.clc_class {
        Some(code) => {
            used.push(F_CLC.to_string());
            if code == clc::MINERAL_EXTRACTION { 0.9 } else { 0.1 }
        },
        None => {
            if config.missing_data_strategy == MissingDataStrategy::Fail {
                return Err(RiskError::MissingRequiredFeature {
                    model: "mineral",
                    feature: F_CLC,
                });
            }
            missing.push(F_CLC.to_string());
            0.1
        },
    };

    let variance = variance_with_missing(0.15, missing.len());
    let conf = clamp_confidence(confidence(used.len(), 1) * 0.4);

    let explanation = config.generate_explanations.then(|| {
        if mean > 0.5 {
            "Land cover marks an active mineral-extraction site".to_string()
        } else {
            "No mapped extraction site in this cell".to_string()
        }
    });

    Ok(RiskResult {
        distribution: distribution_from_mean(mean, variance),
        features_used: used,
        features_missing: missing,
        confidence: conf,
        model_version: MODEL_VERSION.to_string(),
        is_placeholder: true,
        explanation,
        use_case_warning: Some(WARNING.to_string()),
    })
}
