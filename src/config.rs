//! Configuration management for the tile server.
//!
//! Every option is a command-line flag that can also be set through an
//! environment variable with the `TILES_` prefix.
//!
//! # Example
//!
//! ```ignore
//! use tile_pool::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//! println!("Listening on {}", config.bind_address());
//! ```
//!
//! # Environment Variables
//!
//! - `TILES_HOST` - Server bind address (default: 0.0.0.0)
//! - `TILES_PORT` - Server port (default: 3000)
//! - `TILES_STYLE` - Comma-separated `name=path` styles, first is the default (required)
//! - `TILES_POOL_MAX_SIZE` - Renderers per style (default: 5)
//! - `TILES_IDLE_TIMEOUT_MS` - Idle renderer lifetime (default: 5000)
//! - `TILES_ACQUIRE_TIMEOUT_MS` - Wait for a renderer before 503 (default: 10000)
//! - `TILES_REAP_INTERVAL_MS` - Idle sweep interval (default: 1000)
//! - `TILES_TILE_WIDTH` / `TILES_TILE_HEIGHT` - Tile size in pixels (default: 256)
//! - `TILES_BUFFER_SIZE` - Extra pixels rendered around each tile (default: 0)
//! - `TILES_SRS` - Renderer projection (default: EPSG:3857)
//! - `TILES_TMS` - Count rows from the south (default: false)
//! - `TILES_JPEG_QUALITY` - JPEG quality (default: 80)
//! - `TILES_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `TILES_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::collections::HashSet;
use std::time::Duration;

use clap::Parser;

use crate::pool::{PoolConfig, DEFAULT_POOL_MAX_SIZE};
use crate::projection::{Proj4Transform, ProjectionTransform, Srs, TILE_SIZE};
use crate::render::StyleSource;
use crate::tile::{is_valid_quality, DEFAULT_JPEG_QUALITY};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default idle renderer lifetime in milliseconds.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 5000;

/// Default renderer acquire timeout in milliseconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 10_000;

/// Default idle sweep interval in milliseconds.
pub const DEFAULT_REAP_INTERVAL_MS: u64 = 1000;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Largest accepted tile edge in pixels.
pub const MAX_TILE_DIMENSION: u32 = 4096;

// =============================================================================
// CLI Arguments
// =============================================================================

/// XYZ map tile server with a pool of renderers per style.
#[derive(Parser, Debug, Clone)]
#[command(name = "tile-pool")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TILES_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TILES_PORT")]
    pub port: u16,

    // =========================================================================
    // Style Configuration
    // =========================================================================
    /// Style to serve, as `name=path` or `path` (named after the file stem).
    ///
    /// Repeat the flag for several styles. The first one is served on the
    /// unprefixed tile route.
    #[arg(
        long = "style",
        env = "TILES_STYLE",
        value_delimiter = ',',
        required = true
    )]
    pub styles: Vec<StyleSource>,

    // =========================================================================
    // Pool Configuration
    // =========================================================================
    /// Maximum number of renderers per style.
    #[arg(long, default_value_t = DEFAULT_POOL_MAX_SIZE, env = "TILES_POOL_MAX_SIZE")]
    pub pool_max_size: usize,

    /// Milliseconds an idle renderer is kept before it is destroyed.
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT_MS, env = "TILES_IDLE_TIMEOUT_MS")]
    pub idle_timeout_ms: u64,

    /// Milliseconds a request waits for a renderer before failing with 503.
    #[arg(long, default_value_t = DEFAULT_ACQUIRE_TIMEOUT_MS, env = "TILES_ACQUIRE_TIMEOUT_MS")]
    pub acquire_timeout_ms: u64,

    /// Milliseconds between sweeps for expired idle renderers.
    #[arg(long, default_value_t = DEFAULT_REAP_INTERVAL_MS, env = "TILES_REAP_INTERVAL_MS")]
    pub reap_interval_ms: u64,

    // =========================================================================
    // Tile Configuration
    // =========================================================================
    /// Tile width in pixels.
    #[arg(long, default_value_t = TILE_SIZE, env = "TILES_TILE_WIDTH")]
    pub tile_width: u32,

    /// Tile height in pixels.
    #[arg(long, default_value_t = TILE_SIZE, env = "TILES_TILE_HEIGHT")]
    pub tile_height: u32,

    /// Extra pixels rendered around each tile and cropped away.
    #[arg(long, default_value_t = 0, env = "TILES_BUFFER_SIZE")]
    pub buffer_size: u32,

    /// Spatial reference the renderers draw in.
    #[arg(long, default_value = "EPSG:3857", env = "TILES_SRS")]
    pub srs: Srs,

    /// Count tile rows from the south (TMS) instead of the north (XYZ).
    #[arg(long, default_value_t = false, env = "TILES_TMS")]
    pub tms: bool,

    /// JPEG quality for `.jpg` tiles (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "TILES_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "TILES_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "TILES_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.styles.is_empty() {
            return Err("At least one style is required. Set --style or TILES_STYLE".to_string());
        }

        let mut seen = HashSet::new();
        for style in &self.styles {
            if !seen.insert(style.name.as_str()) {
                return Err(format!("Style '{}' is configured more than once", style.name));
            }
        }

        self.pool_config().validate()?;

        if self.reap_interval_ms == 0 {
            return Err("reap_interval_ms must be greater than 0".to_string());
        }

        for (name, value) in [
            ("tile_width", self.tile_width),
            ("tile_height", self.tile_height),
        ] {
            if value == 0 || value > MAX_TILE_DIMENSION {
                return Err(format!(
                    "{} must be between 1 and {}",
                    name, MAX_TILE_DIMENSION
                ));
            }
        }

        if self.buffer_size > MAX_TILE_DIMENSION {
            return Err(format!("buffer_size must be at most {}", MAX_TILE_DIMENSION));
        }

        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        // Resolve the projection now rather than on the first request
        Proj4Transform::new()
            .transform(Srs::WEB_MERCATOR, self.srs, (0.0, 0.0))
            .map_err(|e| format!("srs {} cannot be used: {}", self.srs, e))?;

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Renderer pool sizing and timeouts.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(
            self.pool_max_size,
            Duration::from_millis(self.idle_timeout_ms),
            Duration::from_millis(self.acquire_timeout_ms),
        )
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    /// Row order for tile math: XYZ rows are transposed against projected `y`.
    pub fn transpose_rows(&self) -> bool {
        !self.tms
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["tile-pool"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    fn test_config() -> Config {
        parse(&["--style", "osm=styles/osm.json", "--host", "127.0.0.1", "--port", "8080"])
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--style", "osm=styles/osm.json"]);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.pool_max_size, 5);
        assert_eq!(config.idle_timeout_ms, 5000);
        assert_eq!(config.tile_width, 256);
        assert_eq!(config.tile_height, 256);
        assert_eq!(config.buffer_size, 0);
        assert_eq!(config.srs, Srs::WEB_MERCATOR);
        assert!(!config.tms);
        assert!(config.transpose_rows());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_style_is_required() {
        assert!(Config::try_parse_from(["tile-pool"]).is_err());
    }

    #[test]
    fn test_multiple_styles() {
        let config = parse(&[
            "--style",
            "osm=styles/osm.json",
            "--style",
            "styles/dark.json",
        ]);
        let names: Vec<_> = config.styles.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["osm", "dark"]);

        let config = parse(&["--style", "a=a.json,b=b.json"]);
        assert_eq!(config.styles.len(), 2);
    }

    #[test]
    fn test_invalid_style_argument() {
        assert!(Config::try_parse_from(["tile-pool", "--style", "=a.json"]).is_err());
    }

    #[test]
    fn test_duplicate_style_names() {
        let config = parse(&["--style", "osm=a.json", "--style", "osm=b.json"]);
        let result = config.validate();
        assert!(result.unwrap_err().contains("more than once"));
    }

    #[test]
    fn test_invalid_pool_settings() {
        let mut config = test_config();
        config.pool_max_size = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.idle_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.acquire_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.reap_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_tile_size() {
        let mut config = test_config();
        config.tile_width = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.tile_height = MAX_TILE_DIMENSION + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_jpeg_quality() {
        let mut config = test_config();
        config.jpeg_quality = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.jpeg_quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_srs_parsing() {
        let config = parse(&["--style", "osm=a.json", "--srs", "EPSG:4326"]);
        assert_eq!(config.srs, Srs::WGS84);
        assert!(config.validate().is_ok());

        assert!(Config::try_parse_from(["tile-pool", "--style", "a.json", "--srs", "mercator"]).is_err());

        let mut config = test_config();
        config.srs = Srs::from_epsg(1);
        assert!(config.validate().unwrap_err().contains("EPSG:1"));
    }

    #[test]
    fn test_pool_config() {
        let mut config = test_config();
        config.pool_max_size = 2;
        config.acquire_timeout_ms = 250;

        let pool = config.pool_config();
        assert_eq!(pool.max_size, 2);
        assert_eq!(pool.idle_timeout, Duration::from_secs(5));
        assert_eq!(pool.acquire_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_bind_address() {
        let config = test_config();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_cors_origins() {
        let config = parse(&[
            "--style",
            "osm=a.json",
            "--cors-origins",
            "https://example.com,https://other.com",
        ]);
        assert!(config.validate().is_ok());
        assert_eq!(config.cors_origins.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_tms_flag_disables_row_transpose() {
        let config = parse(&["--style", "osm=a.json", "--tms"]);
        assert!(config.tms);
        assert!(!config.transpose_rows());
    }
}
