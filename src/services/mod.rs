pub mod cell_cache;
pub mod dataset_adapter;
pub mod h3_index;
pub mod orchestrator;
pub mod precip_client;
pub mod risk;
pub mod tile_cache;

pub use cell_cache::CellCache;
pub use dataset_adapter::{
    AdapterStatus, DatasetAdapter, adapter_status, create_adapters, source_hash,
};
pub use orchestrator::{AreaRisks, ProgressEvent, RiskOrchestrator};
pub use precip_client::{PrecipClient, PrecipProvider};
pub use tile_cache::{TileCache, TileCacheStats};
