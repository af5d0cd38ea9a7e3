//! GeoLens Library
//!
//! Multi-hazard geospatial tile service: bbox, tile, and per-cell queries
//! over Europe, answered by assembling landslide, seismic, water-stress, and
//! mineral risk distributions for every H3 cell in the requested area.

use std::sync::Arc;

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use services::{CellCache, PrecipClient, PrecipProvider, RiskOrchestrator, TileCache};
pub use utils::{ApiError, ApiResult};

/// Application shared state
///
/// Design Philosophy: Keep it simple - Rust's type system IS our DI container.
/// The two caches are the only process-wide mutable stores; they are created
/// once at start-up, handed to request handlers and the background tasks as
/// explicit Arc values, and flushed at shutdown.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RiskOrchestrator>,
    pub cell_cache: Arc<CellCache>,
    pub tile_cache: Arc<TileCache>,
    pub default_resolution: u8,
}
