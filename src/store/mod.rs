//! Tile database layer.
//!
//! Tiles and auxiliary artifacts are persisted in a single SQLite file laid
//! out so that ordinary MBTiles clients can read the default slice:
//!
//! ```text
//! tilestack(tile_index, tile_nz, zoom_level, tile_column, tile_row, tile_data)
//! tileinfo(tile_index, tile_nz, info_type, info_resolution, info_data)
//! metadata(name, value)
//! VIEW tiles(zoom_level, tile_column, tile_row, tile_data)   -- index 0, z 0
//! ```
//!
//! # Components
//!
//! - [`TileStore`]: schema creation, inserts, commit/abort and point lookups
//! - [`TileRecord`] / [`InfoRecord`]: value types produced by the pyramid builder
//! - [`TilesetMetadata`]: the MBTiles metadata table

mod record;
mod sqlite;

pub use record::{
    InfoKey, InfoRecord, InfoSummary, InfoType, LevelSummary, MetadataMap, SliceSummary, TileKey,
    TileRecord, TilesetMetadata, DEFAULT_DESCRIPTION, LAYER_TYPE, SCHEMA_VERSION,
};
pub use sqlite::{TileStore, DEFAULT_INDEX, DEFAULT_Z};
