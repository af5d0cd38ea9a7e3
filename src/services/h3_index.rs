// H3 Indexing Helper
// Purpose: Translate bounding boxes into deterministic, deduplicated cell sets

use geo::{Coord, Rect};
use h3o::geom::{ContainmentMode, TilerBuilder};
use h3o::{CellIndex, LatLng, Resolution};
use std::str::FromStr;

use crate::models::AreaRequest;
use crate::utils::{ApiError, ApiResult};

/// Enumerate every cell whose polygon intersects the inclusive bbox, in
/// ascending index order with duplicates removed.
///
/// `Covers` containment also picks up cells whose centroid sits exactly on a
/// bbox edge, which is the documented tie policy.
pub fn cells_in_bbox(area: &AreaRequest) -> ApiResult<Vec<CellIndex>> {
    area.validate()?;

    let resolution = parse_resolution(area.resolution)?;

    let mut tiler = TilerBuilder::new(resolution)
        .containment_mode(ContainmentMode::Covers)
        .build();

    let rect = Rect::new(
        Coord { x: area.min_lon, y: area.min_lat },
        Coord { x: area.max_lon, y: area.max_lat },
    );
    tiler
        .add(rect.to_polygon())
        .map_err(|e| ApiError::invalid_input(format!("bbox is not tileable: {}", e)))?;

    let mut cells: Vec<CellIndex> = tiler.into_coverage().collect();
    cells.sort_unstable();
    cells.dedup();

    Ok(cells)
}

/// Centroid of a cell as (lat, lon) in degrees
pub fn cell_centroid(cell: CellIndex) -> (f64, f64) {
    let center = LatLng::from(cell);
    (center.lat(), center.lng())
}

/// Resolution encoded in the cell id
pub fn cell_resolution(cell: CellIndex) -> u8 {
    u8::from(cell.resolution())
}

/// Parse the canonical hex string form of a cell id
pub fn parse_cell(index: &str) -> ApiResult<CellIndex> {
    CellIndex::from_str(index)
        .map_err(|e| ApiError::InvalidCellIndex(format!("'{}': {}", index, e)))
}

pub fn parse_resolution(resolution: u8) -> ApiResult<Resolution> {
    Resolution::try_from(resolution)
        .map_err(|_| ApiError::validation_error(format!("invalid H3 resolution: {}", resolution)))
}

/// The cell containing the given point at the given resolution
pub fn cell_at(lat: f64, lon: f64, resolution: u8) -> ApiResult<CellIndex> {
    let coord = LatLng::new(lat, lon)
        .map_err(|e| ApiError::invalid_input(format!("invalid coordinate: {}", e)))?;
    Ok(coord.to_cell(parse_resolution(resolution)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zurich_area(resolution: u8) -> AreaRequest {
        AreaRequest::new(8.4, 47.2, 8.7, 47.5, resolution)
    }

    #[test]
    fn test_cells_are_sorted_and_unique() {
        let cells = cells_in_bbox(&zurich_area(6)).unwrap();
        assert!(!cells.is_empty());

        let mut sorted = cells.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(cells, sorted);
    }

    #[test]
    fn test_enumeration_is_deterministic() {
        let a = cells_in_bbox(&zurich_area(6)).unwrap();
        let b = cells_in_bbox(&zurich_area(6)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cell_count_grows_with_resolution() {
        let coarse = cells_in_bbox(&zurich_area(5)).unwrap();
        let fine = cells_in_bbox(&zurich_area(6)).unwrap();
        assert!(fine.len() > coarse.len());
    }

    #[test]
    fn test_centroids_fall_near_the_bbox() {
        let area = zurich_area(6);
        let cells = cells_in_bbox(&area).unwrap();
        // covering cells may overhang the bbox by about one cell diameter
        for cell in cells {
            let (lat, lon) = cell_centroid(cell);
            assert!(lat > area.min_lat - 0.2 && lat < area.max_lat + 0.2);
            assert!(lon > area.min_lon - 0.2 && lon < area.max_lon + 0.2);
        }
    }

    #[test]
    fn test_resolution_round_trip() {
        let cells = cells_in_bbox(&zurich_area(7)).unwrap();
        assert!(cells.iter().all(|c| cell_resolution(*c) == 7));
    }

    #[test]
    fn test_parse_cell_rejects_garbage() {
        assert!(parse_cell("not-a-cell").is_err());
        assert!(parse_cell("").is_err());
    }

    #[test]
    fn test_parse_cell_round_trips() {
        let cell = cell_at(47.37, 8.54, 8).unwrap();
        let parsed = parse_cell(&cell.to_string()).unwrap();
        assert_eq!(parsed, cell);
    }

    #[test]
    fn test_rejects_invalid_area() {
        let area = AreaRequest::new(10.0, 47.0, 8.0, 48.0, 6);
        assert!(cells_in_bbox(&area).is_err());
    }
}
