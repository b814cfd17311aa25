//! # EMTiles
//!
//! Multi-resolution tile pyramids for very large scientific images, stored in
//! a single SQLite database per image and served over HTTP.
//!
//! The offline builder turns a 2D image, an image stack or a 3D volume into
//! tile pyramids plus two auxiliary artifacts per slice: a thumbnail and an
//! averaged power spectrum. The server answers tile and info requests for
//! every `<name>.mbtiles` file in a directory.
//!
//! ## Architecture
//!
//! - [`processor`] - Pixel access and image operations behind [`ImageProcessor`]
//! - [`pyramid`] - Pyramid geometry and per-slice tile generation
//! - [`store`] - SQLite tile database
//! - [`build`] - Build orchestration (source to database)
//! - [`tile`] - Tile service, read pool and cache
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use emtiles::{build, BuildConfig, RasterProcessor};
//! use std::path::Path;
//!
//! let processor = RasterProcessor::new();
//! let report = build(
//!     &processor,
//!     Path::new("micrograph.tif"),
//!     Path::new("micrograph.mbtiles"),
//!     &BuildConfig::default(),
//! )
//! .unwrap();
//! println!("{} tiles written", report.tiles);
//! ```

pub mod build;
pub mod config;
pub mod error;
pub mod processor;
pub mod pyramid;
pub mod server;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use build::{build, BuildConfig, BuildReport};
pub use config::{BuildArgs, Cli, Command, ServeConfig};
pub use error::{BuildError, EncodeError, ServeError, SourceError, StoreError};
pub use processor::{
    ImageProcessor, PixelBuffer, PixelStats, RasterProcessor, Region, SliceHeader, TileFormat,
};
pub use pyramid::{PyramidBuilder, Slice};
pub use server::{create_router, AppState, RouterConfig};
pub use store::{InfoType, TileKey, TileStore, TilesetMetadata};
pub use tile::{ReadPool, TileCache, TileRequest, TileResponse, TileService};
