use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Per-cell feature record assembled from the dataset adapters.
///
/// Every field is optional; `None` means "not sampled or not available" for
/// that cell, never an error. Unknown keys arriving on the wire land in
/// `extra` and propagate untouched; the risk models read the named fields
/// only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CellFeatures {
    /// Terrain height in metres
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    /// Derived slope in degrees, [0, 90]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slope: Option<f64>,
    /// Landslide-susceptibility class, 1..5
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elsus_class: Option<u8>,
    /// Peak ground acceleration in g
    #[serde(rename = "hazardPGA", skip_serializing_if = "Option::is_none")]
    pub hazard_pga: Option<f64>,
    /// Corine land-cover class code (111..523)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clc_class: Option<u16>,
    /// 24h precipitation accumulation in mm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rain24h: Option<f64>,
    /// 72h precipitation accumulation in mm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rain72h: Option<f64>,

    // Future hooks; carried through but not consumed by the current models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lithology: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permeability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soil_moisture: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snow_water_equivalent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curvature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dem_roughness: Option<f64>,

    /// Unknown keys from any source; tolerated and ignored by the models
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl CellFeatures {
    /// Merge `other` into `self`; fields already present in `self` win.
    ///
    /// The union a cell receives is therefore deterministic in the set of
    /// adapter outputs, not in their completion order, as long as callers
    /// merge in a fixed adapter order.
    pub fn merge_from(&mut self, other: &CellFeatures) {
        macro_rules! take_if_missing {
            ($field:ident) => {
                if self.$field.is_none() {
                    self.$field = other.$field;
                }
            };
        }

        take_if_missing!(elevation);
        take_if_missing!(slope);
        take_if_missing!(elsus_class);
        take_if_missing!(hazard_pga);
        take_if_missing!(clc_class);
        take_if_missing!(rain24h);
        take_if_missing!(rain72h);
        take_if_missing!(lithology);
        take_if_missing!(permeability);
        take_if_missing!(soil_moisture);
        take_if_missing!(snow_water_equivalent);
        take_if_missing!(aspect);
        take_if_missing!(curvature);
        take_if_missing!(dem_roughness);

        for (key, value) in &other.extra {
            self.extra.entry(key.clone()).or_insert(*value);
        }
    }

    /// True when no named field carries a value
    pub fn is_empty(&self) -> bool {
        self.elevation.is_none()
            && self.slope.is_none()
            && self.elsus_class.is_none()
            && self.hazard_pga.is_none()
            && self.clc_class.is_none()
            && self.rain24h.is_none()
            && self.rain72h.is_none()
            && self.lithology.is_none()
            && self.permeability.is_none()
            && self.soil_moisture.is_none()
            && self.snow_water_equivalent.is_none()
            && self.aspect.is_none()
            && self.curvature.is_none()
            && self.dem_roughness.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_earlier_source_wins() {
        let mut base = CellFeatures { slope: Some(12.0), ..Default::default() };
        let other =
            CellFeatures { slope: Some(30.0), elevation: Some(800.0), ..Default::default() };

        base.merge_from(&other);

        assert_eq!(base.slope, Some(12.0));
        assert_eq!(base.elevation, Some(800.0));
    }

    #[test]
    fn test_unknown_keys_round_trip() {
        let json = r#"{"slope": 10.0, "snowDepth": 1.5}"#;
        let features: CellFeatures = serde_json::from_str(json).unwrap();

        assert_eq!(features.slope, Some(10.0));
        assert_eq!(features.extra.get("snowDepth"), Some(&1.5));

        let out = serde_json::to_value(&features).unwrap();
        assert_eq!(out["snowDepth"], 1.5);
    }

    #[test]
    fn test_wire_names_are_camel_case() {
        let features = CellFeatures {
            elsus_class: Some(4),
            hazard_pga: Some(0.2),
            ..Default::default()
        };
        let out = serde_json::to_value(&features).unwrap();
        assert!(out.get("elsusClass").is_some());
        assert!(out.get("hazardPGA").is_some());
    }

    #[test]
    fn test_is_empty() {
        assert!(CellFeatures::default().is_empty());
        let features = CellFeatures { rain24h: Some(0.0), ..Default::default() };
        assert!(!features.is_empty());
    }
}
