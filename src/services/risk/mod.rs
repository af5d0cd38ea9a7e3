// Risk Engine
// Purpose: Pure deterministic scoring - one model per hazard, shared math
// Design: No I/O, no hidden state; byte-identical output for identical input

mod landslide;
mod mineral;
mod seismic;
mod water;

pub use landslide::compute_landslide_risk;
pub use mineral::compute_mineral_risk;
pub use seismic::{SeismicClass, classify_seismic, compute_seismic_risk};
pub use water::compute_water_risk;

use thiserror::Error;

use crate::models::{RiskConfig, RiskDistribution};

/// Guard failures inside a model. Fatal for the affected cell only; the
/// orchestrator skips the cell and keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RiskError {
    #[error("{model}: required feature '{feature}' is missing")]
    MissingRequiredFeature { model: &'static str, feature: &'static str },
}

pub type RiskOutcome<T> = Result<T, RiskError>;

// Wire-level feature names, shared by featuresUsed/featuresMissing lists
pub const F_ELEVATION: &str = "elevation";
pub const F_SLOPE: &str = "slope";
pub const F_ELSUS: &str = "elsusClass";
pub const F_PGA: &str = "hazardPGA";
pub const F_CLC: &str = "clcClass";
pub const F_RAIN24: &str = "rain24h";
pub const F_RAIN72: &str = "rain72h";

// ============================================================================
// Shared scoring utilities (reused by every model)
// ============================================================================

/// Linear rescale of `x` from [lo, hi] onto [0, 1], clamped
pub fn normalize(x: f64, lo: f64, hi: f64) -> f64 {
    ((x - lo) / (hi - lo)).clamp(0.0, 1.0)
}

/// Widen a base variance by the number of missing features relied upon
pub fn variance_with_missing(base: f64, missing: usize) -> f64 {
    base * (1.0 + 0.5 * missing as f64)
}

/// Confidence from used-vs-ideal feature counts, clamped to [0.3, 1.0]
pub fn confidence(used: usize, ideal: usize) -> f64 {
    (used as f64 / ideal as f64).clamp(0.3, 1.0)
}

/// Final clamp applied after all model-specific confidence multipliers
pub fn clamp_confidence(value: f64) -> f64 {
    value.clamp(0.3, 1.0)
}

/// Derive the categorical banding triple from a continuous mean.
///
/// The triple is renormalized to sum to 1 and is NOT moment-preserving: the
/// reported `mean` stays the caller's input, which clients consume as the
/// continuous risk score. Changing this formula is a wire-contract change.
pub fn distribution_from_mean(mean: f64, variance: f64) -> RiskDistribution {
    let mean = mean.clamp(0.0, 1.0);
    const LO_BAND: f64 = 0.33;
    const HI_BAND: f64 = 0.67;

    let (p_low, p_medium, p_high) = if mean < LO_BAND {
        (
            0.7 + (LO_BAND - mean) * 0.5,
            0.25 - (LO_BAND - mean) * 0.3,
            0.05,
        )
    } else if mean < HI_BAND {
        let d = (mean - 0.5).abs();
        (
            0.15 + (0.5 - mean) * 0.4,
            0.7 - d * 0.6,
            0.15 + (mean - 0.5) * 0.4,
        )
    } else {
        (
            0.05,
            0.25 - (mean - HI_BAND) * 0.3,
            0.7 + (mean - HI_BAND) * 0.5,
        )
    };

    let sum = p_low + p_medium + p_high;

    RiskDistribution {
        p_low: p_low / sum,
        p_medium: p_medium / sum,
        p_high: p_high / sum,
        mean,
        variance,
    }
}

/// Neutral vs pessimistic substitute for a missing scalar, per strategy.
/// Returns None under `Fail`, which the caller turns into a guard error.
pub fn substitute(
    config: &RiskConfig,
    mean_value: f64,
    conservative_value: f64,
) -> Option<f64> {
    use crate::models::MissingDataStrategy::*;
    match config.missing_data_strategy {
        Mean => Some(mean_value),
        Conservative => Some(conservative_value),
        Fail => None,
    }
}

// ============================================================================
// Corine land-cover code helpers
// First digit selects the super-category:
// 1 artificial, 2 agricultural, 3 forest/semi-natural, 4 wetland, 5 water
// ============================================================================

pub mod clc {
    /// Mineral extraction sites
    pub const MINERAL_EXTRACTION: u16 = 131;

    pub fn is_urban(code: u16) -> bool {
        (111..=142).contains(&code)
    }

    pub fn is_agricultural(code: u16) -> bool {
        (211..=244).contains(&code)
    }

    pub fn is_forest(code: u16) -> bool {
        (311..=313).contains(&code)
    }

    /// Pastures and natural grasslands
    pub fn is_grassland(code: u16) -> bool {
        code == 231 || code == 321
    }

    /// Moors, sclerophyllous vegetation, transitional woodland-shrub
    pub fn is_scrubland(code: u16) -> bool {
        (322..=324).contains(&code)
    }

    /// Open spaces with little or no vegetation
    pub fn is_bare(code: u16) -> bool {
        (331..=335).contains(&code)
    }

    pub fn is_wetland(code: u16) -> bool {
        (411..=423).contains(&code)
    }

    pub fn is_water(code: u16) -> bool {
        (511..=523).contains(&code)
    }
}
