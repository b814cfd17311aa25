//! Command-line configuration.
//!
//! Two subcommands share one binary:
//!
//! - `emtiles build <input> <output>` turns an image into a tile database
//! - `emtiles serve` serves every `*.mbtiles` file of a directory over HTTP
//!
//! # Environment Variables
//!
//! Options can also be set via environment variables with the `EMTILES_` prefix:
//!
//! - `EMTILES_TILE_SIZE` - Pyramid tile edge length (default: 256)
//! - `EMTILES_PSPEC_SIZE` - Power spectrum block size (default: 512)
//! - `EMTILES_TILE_FORMAT` - `jpg` or `png` (default: jpg)
//! - `EMTILES_JPEG_QUALITY` - JPEG quality (default: 80)
//! - `EMTILES_DESCRIPTION` - Metadata description (default: "EM Tiles")
//! - `EMTILES_HOST` - Server bind address (default: 0.0.0.0)
//! - `EMTILES_PORT` - Server port (default: 8080)
//! - `EMTILES_DATA_DIR` - Directory holding tilesets (default: .)
//! - `EMTILES_READ_WORKERS` - Concurrent database reads (default: 16)
//! - `EMTILES_CACHE_TILES` - Tile cache size in bytes (default: 100MB)
//! - `EMTILES_DEFAULT_FORMAT` - Tile format when a tileset has none (default: jpg)
//! - `EMTILES_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `EMTILES_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::build::BuildConfig;
use crate::processor::{TileFormat, DEFAULT_JPEG_QUALITY};
use crate::pyramid::{DEFAULT_PSPEC_TILE_SIZE, DEFAULT_TILE_SIZE};
use crate::server::{CorsPolicy, RouterConfig};
use crate::store::DEFAULT_DESCRIPTION;
use crate::tile::{TileService, DEFAULT_READ_WORKERS, DEFAULT_TILE_CACHE_CAPACITY};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// EMTiles - multi-resolution tiles for large scientific images.
#[derive(Parser, Debug, Clone)]
#[command(name = "emtiles")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build a tile database from an image file or directory of images.
    Build(BuildArgs),

    /// Serve tile databases over HTTP.
    Serve(ServeConfig),
}

/// Arguments of `emtiles build`.
#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Source image, or a directory whose images form a stack.
    pub input: PathBuf,

    /// Output tile database (conventionally `<name>.mbtiles`).
    pub output: PathBuf,

    /// Edge length of pyramid tiles in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "EMTILES_TILE_SIZE")]
    pub tile_size: u32,

    /// Edge length of power spectrum blocks (power of two).
    #[arg(long, default_value_t = DEFAULT_PSPEC_TILE_SIZE, env = "EMTILES_PSPEC_SIZE")]
    pub pspec_size: u32,

    /// Tile encoding.
    #[arg(long, value_enum, default_value_t = TileFormat::Jpeg, env = "EMTILES_TILE_FORMAT")]
    pub tile_format: TileFormat,

    /// JPEG quality for tiles (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "EMTILES_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Value of the `description` metadata entry.
    #[arg(long, default_value = DEFAULT_DESCRIPTION, env = "EMTILES_DESCRIPTION")]
    pub description: String,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl BuildArgs {
    /// Build configuration described by these arguments.
    pub fn build_config(&self) -> BuildConfig {
        BuildConfig::default()
            .with_tile_size(self.tile_size)
            .with_pspec_tile_size(self.pspec_size)
            .with_tile_format(self.tile_format)
            .with_jpeg_quality(self.jpeg_quality)
            .with_description(self.description.clone())
    }

    /// Validate the arguments and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.input == self.output {
            return Err("input and output must be different paths".to_string());
        }
        self.build_config().validate()
    }
}

/// Arguments of `emtiles serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "EMTILES_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "EMTILES_PORT")]
    pub port: u16,

    /// Directory containing `<tileset>.mbtiles` files.
    #[arg(long, default_value = ".", env = "EMTILES_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Maximum number of concurrent database reads.
    #[arg(long, default_value_t = DEFAULT_READ_WORKERS, env = "EMTILES_READ_WORKERS")]
    pub read_workers: usize,

    /// Tile cache capacity in bytes (0 disables the cache).
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "EMTILES_CACHE_TILES")]
    pub cache_tiles: usize,

    /// Content type for tilesets without `format` metadata.
    #[arg(long, value_enum, default_value_t = TileFormat::Jpeg, env = "EMTILES_DEFAULT_FORMAT")]
    pub default_format: TileFormat,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "EMTILES_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "EMTILES_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.data_dir.is_dir() {
            return Err(format!(
                "data directory {} does not exist. Set --data-dir or EMTILES_DATA_DIR",
                self.data_dir.display()
            ));
        }

        if self.read_workers == 0 {
            return Err("read_workers must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tile_service(&self) -> TileService {
        TileService::new(self.data_dir.clone())
            .with_read_workers(self.read_workers)
            .with_cache_capacity(self.cache_tiles)
            .with_default_format(self.default_format)
    }

    pub fn router_config(&self) -> RouterConfig {
        let cors = match &self.cors_origins {
            Some(origins) => CorsPolicy::Origins(origins.clone()),
            None => CorsPolicy::AnyOrigin,
        };
        RouterConfig::new()
            .with_cors(cors)
            .with_cache_max_age(self.cache_max_age)
            .with_request_tracing(!self.no_tracing)
    }
}

// =============================================================================
// Tests
// =============================================================================
