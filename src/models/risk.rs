use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Three-class probabilistic risk distribution.
///
/// The categorical triple is a banding heuristic for the UI; `mean` is the
/// continuous risk score the triple was derived from and is NOT the
/// expectation of the categorical. Clients depend on this, so the two are
/// reported side by side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RiskDistribution {
    pub p_low: f64,
    pub p_medium: f64,
    pub p_high: f64,
    pub mean: f64,
    pub variance: f64,
}

impl RiskDistribution {
    /// Band label for the mean: [0, 0.33) low, [0.33, 0.67) medium, [0.67, 1] high
    pub fn band(&self) -> RiskBand {
        if self.mean < 0.33 {
            RiskBand::Low
        } else if self.mean < 0.67 {
            RiskBand::Medium
        } else {
            RiskBand::High
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

/// Outcome of one hazard model for one cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RiskResult {
    pub distribution: RiskDistribution,
    /// Feature names the model actually consumed
    pub features_used: Vec<String>,
    /// Feature names the model wanted but did not find
    pub features_missing: Vec<String>,
    /// In [0.3, 1.0] after clamping, possibly scaled down by inference penalties
    pub confidence: f64,
    pub model_version: String,
    /// True for models deliberately limited in validity; such results always
    /// carry a `use_case_warning`
    pub is_placeholder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_case_warning: Option<String>,
}

/// How a model treats a missing input it relies on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MissingDataStrategy {
    /// Substitute a neutral mid-range value
    Mean,
    /// Substitute a pessimistic value
    #[default]
    Conservative,
    /// Abort scoring for the cell
    Fail,
}

/// Risk-engine configuration, fixed per request
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RiskConfig {
    pub missing_data_strategy: MissingDataStrategy,
    pub compute_quantiles: bool,
    pub generate_explanations: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_conservative() {
        let config = RiskConfig::default();
        assert_eq!(config.missing_data_strategy, MissingDataStrategy::Conservative);
        assert!(!config.compute_quantiles);
        assert!(!config.generate_explanations);
    }

    #[test]
    fn test_band_edges() {
        let mut dist =
            RiskDistribution { p_low: 1.0, p_medium: 0.0, p_high: 0.0, mean: 0.0, variance: 0.0 };
        assert_eq!(dist.band(), RiskBand::Low);
        dist.mean = 0.33;
        assert_eq!(dist.band(), RiskBand::Medium);
        dist.mean = 0.67;
        assert_eq!(dist.band(), RiskBand::High);
        dist.mean = 1.0;
        assert_eq!(dist.band(), RiskBand::High);
    }
}
