//! Tile service: request coordinates in, tile bytes or slice summaries out.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Resolve tileset   4. Open database read-only        │    │
//! │  │  2. Flip row, stat    5. Read tile and format           │    │
//! │  │  3. Check cache       6. Cache & return                 │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌───────────┐      ┌──────────────┐    ┌──────────────────┐  │
//! │    │ TileCache │      │   ReadPool   │    │    TileStore     │  │
//! │    └───────────┘      └──────────────┘    └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Steps 4 and 5 run on the read pool; everything else stays on the async
//! request path.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::error::ServeError;
use crate::processor::TileFormat;
use crate::pyramid::flip_row;
use crate::store::{InfoSummary, LevelSummary, MetadataMap, TileKey, TileStore};

use super::cache::{CachedTile, TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
use super::pool::{ReadPool, DEFAULT_READ_WORKERS};

/// File extension of tile databases in the data directory.
pub const TILESET_EXTENSION: &str = "mbtiles";

// =============================================================================
// Requests and responses
// =============================================================================

/// Coordinates of a tile or info request, as the client sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    /// Tileset name, the database file stem
    pub tileset: String,

    pub index: u32,
    pub z: u32,
    pub level: u32,
    pub column: u32,

    /// Row counted from the top; flipped before the database lookup
    pub row: u32,
}

impl TileRequest {
    /// Request against the default slice (index 0, z 0).
    pub fn new(tileset: impl Into<String>, level: u32, column: u32, row: u32) -> Self {
        Self {
            tileset: tileset.into(),
            index: 0,
            z: 0,
            level,
            column,
            row,
        }
    }

    pub fn with_slice(mut self, index: u32, z: u32) -> Self {
        self.index = index;
        self.z = z;
        self
    }
}

/// Tile bytes ready to send.
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub data: Bytes,
    pub format: TileFormat,

    /// Whether this tile was served from cache
    pub cache_hit: bool,
}

/// JSON body of the `info` operation.
#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub tileset: String,
    pub index: u32,
    pub z: u32,
    pub level: u32,
    pub column: u32,
    pub row: u32,
    pub metadata: MetadataMap,
    pub levels: Vec<LevelSummary>,
    pub infos: Vec<InfoSummary>,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Serves tiles from the `*.mbtiles` files of one directory.
///
/// Each lookup opens its own read-only connection on the read pool, so any
/// number of requests can target any number of tilesets concurrently.
pub struct TileService {
    data_dir: PathBuf,
    pool: ReadPool,
    cache: TileCache,

    /// Content type used when a database has no `format` metadata
    default_format: TileFormat,
}

impl TileService {
    /// Service with default pool size and cache capacity.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            pool: ReadPool::new(DEFAULT_READ_WORKERS),
            cache: TileCache::with_capacity(DEFAULT_TILE_CACHE_CAPACITY),
            default_format: TileFormat::default(),
        }
    }

    pub fn with_read_workers(mut self, workers: usize) -> Self {
        self.pool = ReadPool::new(workers);
        self
    }

    /// Set the tile cache capacity in bytes. Zero disables caching.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = TileCache::with_capacity(capacity);
        self
    }

    pub fn with_default_format(mut self, format: TileFormat) -> Self {
        self.default_format = format;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn pool(&self) -> &ReadPool {
        &self.pool
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Map a tileset name to its database path.
    ///
    /// Names are single path components: empty names, names containing a
    /// separator and names starting with `.` are rejected.
    pub fn resolve_tileset(&self, name: &str) -> Result<PathBuf, ServeError> {
        if name.is_empty() {
            return Err(ServeError::bad_request("tileset name is empty"));
        }
        if name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(ServeError::bad_request(format!(
                "invalid tileset name: {}",
                name
            )));
        }
        Ok(self
            .data_dir
            .join(format!("{}.{}", name, TILESET_EXTENSION)))
    }

    /// Fetch one tile, from cache when possible.
    pub async fn get_tile(&self, request: TileRequest) -> Result<TileResponse, ServeError> {
        let TileRequest {
            tileset,
            index,
            z,
            level,
            column,
            row,
        } = request;
        let not_found = ServeError::TileNotFound { level, column, row };

        let path = self.resolve_tileset(&tileset)?;
        let stored_row = flip_row(level, row).ok_or_else(|| not_found.clone())?;
        let key = TileKey::new(index, z, level, column, stored_row);

        let Some(modified) = tileset_stamp(&path).await else {
            self.cache.invalidate_tileset(&tileset).await;
            return Err(ServeError::TilesetNotFound { tileset });
        };

        let cache_key = TileCacheKey::new(tileset.as_str(), key);
        if let Some(cached) = self.cache.get(&cache_key).await {
            if cached.modified == modified {
                return Ok(TileResponse {
                    data: cached.data,
                    format: cached.format,
                    cache_hit: true,
                });
            }
            debug!(tileset = %tileset, "tileset changed on disk, dropping cached tiles");
            self.cache.invalidate_tileset(&tileset).await;
        }

        let default_format = self.default_format;
        let tile = self
            .pool
            .run(move || {
                let store = open_tileset(&path, &tileset)?;
                let data = store.read_tile(&key).map_err(|e| {
                    if e.is_not_found() {
                        not_found
                    } else {
                        ServeError::from(e)
                    }
                })?;
                let format = store
                    .read_metadata()?
                    .get("format")
                    .and_then(|f| f.parse().ok())
                    .unwrap_or(default_format);
                Ok(CachedTile {
                    data,
                    format,
                    modified,
                })
            })
            .await?;

        self.cache.put(cache_key, tile.clone()).await;

        Ok(TileResponse {
            data: tile.data,
            format: tile.format,
            cache_hit: false,
        })
    }

    /// Summarize the slice addressed by a request.
    pub async fn get_info(&self, request: TileRequest) -> Result<InfoResponse, ServeError> {
        let path = self.resolve_tileset(&request.tileset)?;

        self.pool
            .run(move || {
                let store = open_tileset(&path, &request.tileset)?;
                let metadata = store.read_metadata()?;
                let summary = store.slice_summary(request.index, request.z)?;
                if summary.is_empty() {
                    return Err(ServeError::SliceNotFound {
                        index: request.index,
                        z: request.z,
                    });
                }

                Ok(InfoResponse {
                    tileset: request.tileset,
                    index: request.index,
                    z: request.z,
                    level: request.level,
                    column: request.column,
                    row: request.row,
                    metadata,
                    levels: summary.levels,
                    infos: summary.infos,
                })
            })
            .await
    }

    /// Get tile cache statistics.
    ///
    /// Returns `(current_size, capacity, entry_count)`.
    pub async fn cache_stats(&self) -> (usize, usize, usize) {
        let size = self.cache.size().await;
        let count = self.cache.len().await;
        (size, self.cache.capacity(), count)
    }
}

/// Modification time of a tileset file.
///
/// `None` when no such file exists; `Some(None)` when the platform does not
/// report modification times.
async fn tileset_stamp(path: &Path) -> Option<Option<SystemTime>> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Some(metadata.modified().ok()),
        _ => None,
    }
}

/// Open a tileset read-only. Runs on a pool worker.
fn open_tileset(path: &Path, tileset: &str) -> Result<TileStore, ServeError> {
    if !path.is_file() {
        return Err(ServeError::TilesetNotFound {
            tileset: tileset.to_string(),
        });
    }
    Ok(TileStore::open_read_only(path)?)
}

// =============================================================================
// Tests
// =============================================================================
