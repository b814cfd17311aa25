//! Tile serving layer.
//!
//! Sits between the HTTP handlers and the tile databases:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │    ReadPool     │  │
//! │  │  (tile       │  │  (semaphore +   │  │
//! │  │   bytes)     │  │   blocking)     │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │       TileStore (read-only, per lookup) │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: resolves tilesets, flips rows, caches and dispatches lookups
//! - [`ReadPool`]: bounded blocking workers with cancellation accounting
//! - [`TileCache`]: LRU cache of tile bytes with size-based eviction

mod cache;
mod pool;
mod service;

pub use cache::{CachedTile, TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use pool::{ReadPool, DEFAULT_READ_WORKERS};
pub use service::{InfoResponse, TileRequest, TileResponse, TileService, TILESET_EXTENSION};
