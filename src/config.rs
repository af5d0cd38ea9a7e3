use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub data: DataConfig,
    pub precip: PrecipConfig,
    pub tile_cache: TileCacheConfig,
    pub cell_cache: CellCacheConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Dataset layer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the persistent cell caches (h3_cache.json, h3_cache_v2.json)
    pub dir: String,
    /// Directory holding downloaded raw dataset files, keyed by dataset name
    pub raw_data_dir: String,
    /// Select real raster/HTTP adapters for every layer instead of mocks
    pub use_real_data: bool,
    /// URL template for S3-hosted elevation tiles ({n}/{e} integer degrees)
    pub elevation_tile_url: String,
}

/// Precipitation microservice client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrecipConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Request timeout in seconds. The upstream cold-starts, so keep this generous.
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Cell lists above this size are split into chunks and merged
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TileCacheConfig {
    pub max_size_mb: usize,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CellCacheConfig {
    pub flush_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Cells scored per chunk before the progress callback fires
    pub chunk_size: usize,
    /// H3 resolution used when a request does not specify one
    pub default_resolution: u8,
    /// Overall per-request deadline; in-flight adapter work past it is dropped
    pub request_timeout_secs: u64,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "geolens")]
#[command(version, about = "GeoLens - Multi-Hazard Geospatial Tile Service")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Logging level (overrides config file, e.g., "info,geolens=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Data directory for persistent caches (overrides config file)
    #[arg(long, value_name = "PATH")]
    pub data_dir: Option<String>,

    /// Use real raster/HTTP adapters instead of mocks (overrides config file)
    #[arg(long, value_name = "BOOL")]
    pub use_real_data: Option<bool>,

    /// Precipitation microservice base URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub precip_url: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();
        Self::load_with_args(&cli_args)
    }

    /// Load configuration from pre-parsed arguments (testable entry point)
    pub fn load_with_args(cli_args: &CommandLineArgs) -> Result<Self, anyhow::Error> {
        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST: Server host (default: 0.0.0.0)
    /// - APP_SERVER_PORT: Server port (default: 8080)
    /// - APP_LOG_LEVEL: Logging level (e.g., "info,geolens=debug")
    /// - APP_DATA_DIR: Data directory for persistent caches
    /// - USE_REAL_DATA: "true" selects real adapters for every layer
    /// - NASA_PRECIP_URL: base URL of the precipitation microservice
    /// - DB_*: reserved for the Postgres-backed cell-cache variant (detected
    ///   and reported only; this process serves the JSON-file store)
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(dir) = std::env::var("APP_DATA_DIR") {
            self.data.dir = dir;
            tracing::info!("Override data.dir from env: {}", self.data.dir);
        }

        if let Ok(flag) = std::env::var("USE_REAL_DATA") {
            self.data.use_real_data = flag.eq_ignore_ascii_case("true") || flag == "1";
            tracing::info!("Override data.use_real_data from env: {}", self.data.use_real_data);
        }

        if let Ok(url) = std::env::var("NASA_PRECIP_URL") {
            self.precip.base_url = url;
            self.precip.enabled = true;
            tracing::info!("Override precip.base_url from env: {}", self.precip.base_url);
        }

        if std::env::vars().any(|(k, _)| k.starts_with("DB_")) {
            tracing::warn!(
                "DB_* variables detected; the Postgres cell-cache variant is external, keeping the JSON-file store"
            );
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }

        if let Some(port) = args.server_port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        if let Some(dir) = &args.data_dir {
            self.data.dir = dir.clone();
            tracing::info!("Override data.dir from CLI: {}", self.data.dir);
        }

        if let Some(flag) = args.use_real_data {
            self.data.use_real_data = flag;
            tracing::info!("Override data.use_real_data from CLI: {}", flag);
        }

        if let Some(url) = &args.precip_url {
            self.precip.base_url = url.clone();
            self.precip.enabled = true;
            tracing::info!("Override precip.base_url from CLI: {}", self.precip.base_url);
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.data.dir.is_empty() {
            anyhow::bail!("data.dir cannot be empty");
        }

        if self.orchestrator.chunk_size == 0 {
            anyhow::bail!("orchestrator.chunk_size must be > 0");
        }

        if self.orchestrator.default_resolution > 15 {
            anyhow::bail!("orchestrator.default_resolution must be in 0..=15");
        }

        if self.precip.enabled && self.precip.base_url.is_empty() {
            anyhow::bail!("precip.base_url cannot be empty when precip.enabled is true");
        }

        if self.tile_cache.max_size_mb == 0 {
            anyhow::bail!("tile_cache.max_size_mb must be > 0");
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,geolens=debug".to_string(), file: Some("logs/geolens.log".to_string()) }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: "data".to_string(),
            raw_data_dir: "data/raw".to_string(),
            use_real_data: false,
            elevation_tile_url:
                "https://copernicus-dem-30m.s3.amazonaws.com/tiles/{n}/{e}.grid.json".to_string(),
        }
    }
}

impl Default for PrecipConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:8090".to_string(),
            timeout_secs: 120,
            max_retries: 2,
            chunk_size: 5000,
        }
    }
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self { max_size_mb: 200, ttl_secs: 600, sweep_interval_secs: 180 }
    }
}

impl Default for CellCacheConfig {
    fn default() -> Self {
        Self { flush_interval_secs: 60 }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { chunk_size: 100, default_resolution: 6, request_timeout_secs: 300 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.orchestrator.default_resolution, 6);
        assert_eq!(config.precip.timeout_secs, 120);
        assert_eq!(config.tile_cache.max_size_mb, 200);
    }

    #[test]
    fn test_toml_section_parsing() {
        let toml_str = r#"
            [server]
            port = 9090

            [data]
            use_real_data = true

            [orchestrator]
            chunk_size = 50
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9090);
        assert!(config.data.use_real_data);
        assert_eq!(config.orchestrator.chunk_size, 50);
        // untouched sections fall back to defaults
        assert_eq!(config.precip.chunk_size, 5000);
    }

    #[test]
    fn test_validate_rejects_bad_resolution() {
        let mut config = Config::default();
        config.orchestrator.default_resolution = 16;
        assert!(config.validate().is_err());
    }
}
