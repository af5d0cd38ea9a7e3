pub mod area;
pub mod features;
pub mod records;
pub mod risk;

pub use area::{AreaRequest, resolution_for_zoom, tile_to_bbox};
pub use features::CellFeatures;
pub use records::{
    AreaMetrics, CellRecordV1, CellRecordV2, CellRisks, CompactCell, PhaseTimings, RecordMetadata,
    V1Metadata,
};
pub use risk::{MissingDataStrategy, RiskBand, RiskConfig, RiskDistribution, RiskResult};
