use axum::{
    Router,
    routing::{delete, get},
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use geolens::config::Config;
use geolens::services::{
    self, CellCache, PrecipClient, PrecipProvider, RiskOrchestrator, TileCache,
};
use geolens::utils::ScheduledExecutor;
use geolens::{AppState, handlers, models};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::area::get_area,
        handlers::area::get_area_v2,

        handlers::tile::get_tile,
        handlers::tile::get_tile_optimized,
        handlers::tile::get_cache_stats,
        handlers::tile::clear_cache,

        handlers::cell::get_cell,
        handlers::system::get_adapter_status,
    ),
    components(
        schemas(
            models::AreaRequest,
            models::CellFeatures,
            models::RiskDistribution,
            models::RiskResult,
            models::RiskConfig,
            models::MissingDataStrategy,
            models::CellRecordV1,
            models::V1Metadata,
            models::CellRecordV2,
            models::CellRisks,
            models::RecordMetadata,
            models::CompactCell,
            models::AreaMetrics,
            models::PhaseTimings,
            handlers::area::AreaResponse,
            handlers::area::V2AreaResponse,
            services::AdapterStatus,
            services::TileCacheStats,
        )
    ),
    tags(
        (name = "Area", description = "Bounding-box risk queries"),
        (name = "Tiles", description = "XYZ tile queries and tile-cache operations"),
        (name = "Cells", description = "Single-cell lookups"),
        (name = "System", description = "Health and introspection"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    let _log_guard = if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("geolens.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
        Some(guard)
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
        None
    };

    tracing::info!("GeoLens starting up");
    tracing::info!(
        "Data mode: {}",
        if config.data.use_real_data { "real adapters" } else { "mock adapters" }
    );

    let cell_cache = Arc::new(CellCache::open(&config.data.dir));
    tracing::info!(
        "Cell cache loaded: {} v1 records, {} v2 records",
        cell_cache.len_v1(),
        cell_cache.len_v2()
    );

    let tile_cache = Arc::new(TileCache::new(&config.tile_cache));

    let adapters = services::create_adapters(&config.data);

    let precip: Option<Arc<dyn PrecipProvider>> = if config.precip.enabled {
        tracing::info!("Precipitation client enabled: {}", config.precip.base_url);
        Some(Arc::new(PrecipClient::new(&config.precip)))
    } else {
        tracing::info!("Precipitation client disabled; water model falls back to terrain proxy");
        None
    };

    let orchestrator = Arc::new(RiskOrchestrator::new(
        adapters,
        precip,
        Arc::clone(&cell_cache),
        services::source_hash(config.data.use_real_data, config.precip.enabled),
        &config.orchestrator,
    ));

    // background flusher persists dirty cell records on a coarse interval
    {
        let executor = ScheduledExecutor::new(
            "cell-cache-flusher",
            Duration::from_secs(config.cell_cache.flush_interval_secs),
        );
        let cache = Arc::clone(&cell_cache);
        tokio::spawn(async move {
            executor.start(cache).await;
        });
    }

    // periodic sweep drops expired tile entries
    {
        let executor = ScheduledExecutor::new(
            "tile-cache-sweeper",
            Duration::from_secs(config.tile_cache.sweep_interval_secs),
        );
        let cache = Arc::clone(&tile_cache);
        tokio::spawn(async move {
            executor.start(cache).await;
        });
    }

    let app_state = Arc::new(AppState {
        orchestrator,
        cell_cache: Arc::clone(&cell_cache),
        tile_cache: Arc::clone(&tile_cache),
        default_resolution: config.orchestrator.default_resolution,
    });

    let api_routes = Router::new()
        .route("/h3/area", get(handlers::area::get_area))
        .route("/v2/h3/area", get(handlers::area::get_area_v2))
        .route("/h3/tile", get(handlers::tile::get_tile))
        .route("/h3/tile/optimized", get(handlers::tile::get_tile_optimized))
        .route("/h3/tile/cache/stats", get(handlers::tile::get_cache_stats))
        .route("/h3/tile/cache", delete(handlers::tile::clear_cache))
        .route("/h3/adapters/status", get(handlers::system::get_adapter_status))
        .route("/cell/:h3_index", get(handlers::cell::get_cell))
        .with_state(Arc::clone(&app_state));

    let health_routes = Router::new()
        .route("/health", get(handlers::system::health_check))
        .route("/ready", get(handlers::system::ready_check));

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_routes)
        .merge(health_routes)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // persist whatever the flusher has not reached yet
    if let Err(e) = cell_cache.flush_all() {
        tracing::error!("Final cell-cache flush failed: {}", e);
    }
    tracing::info!("GeoLens stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
