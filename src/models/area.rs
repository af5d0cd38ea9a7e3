use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::utils::{ApiError, ApiResult};

/// Bounding-box query over Europe at a target H3 resolution.
///
/// The bbox is treated as inclusive on all four edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AreaRequest {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
    pub resolution: u8,
}

impl AreaRequest {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64, resolution: u8) -> Self {
        Self { min_lon, min_lat, max_lon, max_lat, resolution }
    }

    /// Build from XYZ tile coordinates using Web Mercator math, with the
    /// zoom-dependent H3 resolution mapping.
    pub fn from_tile(x: u32, y: u32, z: u32) -> Self {
        let (min_lon, min_lat, max_lon, max_lat) = tile_to_bbox(x, y, z);
        Self { min_lon, min_lat, max_lon, max_lat, resolution: resolution_for_zoom(z) }
    }

    pub fn validate(&self) -> ApiResult<()> {
        if !self.min_lon.is_finite()
            || !self.min_lat.is_finite()
            || !self.max_lon.is_finite()
            || !self.max_lat.is_finite()
        {
            return Err(ApiError::validation_error("bbox coordinates must be finite"));
        }
        if self.min_lon > self.max_lon {
            return Err(ApiError::validation_error("minLon must be <= maxLon"));
        }
        if self.min_lat > self.max_lat {
            return Err(ApiError::validation_error("minLat must be <= maxLat"));
        }
        if self.min_lat < -90.0 || self.max_lat > 90.0 {
            return Err(ApiError::validation_error("latitude must be within [-90, 90]"));
        }
        if self.min_lon < -180.0 || self.max_lon > 180.0 {
            return Err(ApiError::validation_error("longitude must be within [-180, 180]"));
        }
        if self.resolution > 15 {
            return Err(ApiError::validation_error("resolution must be in 0..=15"));
        }
        Ok(())
    }

    /// Point-in-bbox test, inclusive on all edges
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// Web Mercator tile corner math: `lon(x,z) = x/2^z*360 - 180`,
/// `lat(y,z) = atan(sinh(pi - 2*pi*y/2^z)) * 180/pi`
pub fn tile_to_bbox(x: u32, y: u32, z: u32) -> (f64, f64, f64, f64) {
    let n = 2_f64.powi(z as i32);

    let lon = |x: f64| x / n * 360.0 - 180.0;
    let lat = |y: f64| {
        let v = std::f64::consts::PI * (1.0 - 2.0 * y / n);
        v.sinh().atan().to_degrees()
    };

    let min_lon = lon(x as f64);
    let max_lon = lon((x + 1) as f64);
    // tile y grows southwards
    let max_lat = lat(y as f64);
    let min_lat = lat((y + 1) as f64);

    (min_lon, min_lat, max_lon, max_lat)
}

/// Tile zoom to H3 resolution mapping
pub fn resolution_for_zoom(z: u32) -> u8 {
    match z {
        0..=4 => 2,
        5..=6 => 3,
        7..=8 => 4,
        9..=10 => 5,
        _ => 6,
    }
}
