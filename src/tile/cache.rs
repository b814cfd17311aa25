//! LRU cache of tile bytes read from tile databases.
//!
//! Tiles are immutable once a build commits, so an entry only goes stale when
//! its file is removed or replaced. Every entry remembers the modification
//! time of the file it came from; the tile service drops a tileset's entries
//! through [`TileCache::invalidate_tileset`] when that time no longer matches.
//!
//! The cache is bounded twice: by total payload bytes and by entry count, the
//! latter keeping LRU bookkeeping small when tiles are tiny.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::processor::TileFormat;
use crate::store::TileKey;

/// Default cache capacity: 100MB
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 100 * 1024 * 1024;

/// Default maximum number of entries
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Cache key: tileset name plus the stored tile address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    pub tileset: Arc<str>,

    /// Key with the stored (already flipped) row
    pub tile: TileKey,
}

impl TileCacheKey {
    pub fn new(tileset: impl Into<Arc<str>>, tile: TileKey) -> Self {
        Self {
            tileset: tileset.into(),
            tile,
        }
    }
}

/// Cached tile payload with the format it was served as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTile {
    pub data: Bytes,
    pub format: TileFormat,

    /// Modification time of the database file the tile was read from
    pub modified: Option<SystemTime>,
}

struct CacheState {
    entries: LruCache<TileCacheKey, CachedTile>,
    bytes: usize,
}

impl CacheState {
    fn evict_to(&mut self, max_bytes: usize) {
        while self.bytes > max_bytes {
            match self.entries.pop_lru() {
                Some((_, evicted)) => self.bytes = self.bytes.saturating_sub(evicted.data.len()),
                None => break,
            }
        }
    }
}

/// Size-bounded LRU cache shared by all request handlers.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use emtiles::processor::TileFormat;
/// use emtiles::store::TileKey;
/// use emtiles::tile::{CachedTile, TileCache, TileCacheKey};
///
/// #[tokio::main]
/// async fn main() {
///     let cache = TileCache::with_capacity(1024 * 1024);
///     let key = TileCacheKey::new("sample", TileKey::new(0, 0, 2, 1, 3));
///
///     let tile = CachedTile {
///         data: Bytes::from_static(b"\xFF\xD8"),
///         format: TileFormat::Jpeg,
///         modified: None,
///     };
///     cache.put(key.clone(), tile.clone()).await;
///     assert_eq!(cache.get(&key).await, Some(tile));
/// }
/// ```
pub struct TileCache {
    state: Mutex<CacheState>,

    /// Maximum total payload in bytes
    max_bytes: usize,
}

impl TileCache {
    /// Cache holding at most `max_bytes` of tile data. Zero disables caching.
    pub fn with_capacity(max_bytes: usize) -> Self {
        Self::with_capacity_and_entries(max_bytes, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity_and_entries(max_bytes: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(max_entries),
                bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Look up a tile, marking it recently used.
    pub async fn get(&self, key: &TileCacheKey) -> Option<CachedTile> {
        self.state.lock().await.entries.get(key).cloned()
    }

    /// Insert or replace a tile, then evict down to capacity.
    ///
    /// A tile larger than the whole cache is not stored.
    pub async fn put(&self, key: TileCacheKey, tile: CachedTile) {
        let size = tile.data.len();
        if size > self.max_bytes {
            return;
        }

        let mut state = self.state.lock().await;
        if let Some((_, replaced)) = state.entries.push(key, tile) {
            // `push` returns either the old value for this key or the entry
            // evicted by the count bound; both leave the cache.
            state.bytes = state.bytes.saturating_sub(replaced.data.len());
        }
        state.bytes += size;
        state.evict_to(self.max_bytes);
    }

    /// Drop every cached tile of one tileset.
    pub async fn invalidate_tileset(&self, tileset: &str) {
        let mut state = self.state.lock().await;
        let stale: Vec<TileCacheKey> = state
            .entries
            .iter()
            .filter(|(key, _)| key.tileset.as_ref() == tileset)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            if let Some(tile) = state.entries.pop(&key) {
                state.bytes = state.bytes.saturating_sub(tile.data.len());
            }
        }
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.bytes = 0;
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Total cached payload in bytes.
    pub async fn size(&self) -> usize {
        self.state.lock().await.bytes
    }

    /// Maximum payload in bytes.
    pub fn capacity(&self) -> usize {
        self.max_bytes
    }
}

// =============================================================================
// Tests
// =============================================================================
