//! Value types written to and read from the tile database.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::Serialize;

/// Metadata `type` value for every tileset we write.
pub const LAYER_TYPE: &str = "baselayer";

/// Metadata `version` value for the schema we write.
pub const SCHEMA_VERSION: &str = "1.1";

/// Default metadata `description`.
pub const DEFAULT_DESCRIPTION: &str = "EM Tiles";

// =============================================================================
// Tiles
// =============================================================================

/// Address of one tile in the `tilestack` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Stack index in the source image
    pub index: u32,

    /// Depth plane (0 for 2D images)
    pub z: u32,

    /// Zoom level (0 = coarsest)
    pub level: u32,

    /// Tile column, left to right
    pub column: u32,

    /// Tile row in storage order
    pub row: u32,
}

impl TileKey {
    pub fn new(index: u32, z: u32, level: u32, column: u32, row: u32) -> Self {
        Self {
            index,
            z,
            level,
            column,
            row,
        }
    }
}

/// One encoded tile produced by the pyramid builder.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRecord {
    pub key: TileKey,
    pub data: Bytes,
}

impl TileRecord {
    pub fn new(key: TileKey, data: impl Into<Bytes>) -> Self {
        Self {
            key,
            data: data.into(),
        }
    }
}

// =============================================================================
// Info artifacts
// =============================================================================

/// Kind of auxiliary artifact stored next to the tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoType {
    /// Whole-slice preview fitting one tile
    Thumbnail,

    /// Averaged 2D power spectrum image
    Pspec,

    /// Rotationally averaged 1D power spectrum as a JSON array
    PspecJson,
}

impl InfoType {
    /// Value stored in the `info_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoType::Thumbnail => "thumbnail",
            InfoType::Pspec => "pspec",
            InfoType::PspecJson => "pspec_json",
        }
    }
}

impl fmt::Display for InfoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InfoType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thumbnail" => Ok(InfoType::Thumbnail),
            "pspec" => Ok(InfoType::Pspec),
            "pspec_json" => Ok(InfoType::PspecJson),
            other => Err(format!("unknown info type: {}", other)),
        }
    }
}

/// Address of one artifact in the `tileinfo` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoKey {
    pub index: u32,
    pub z: u32,
    pub info_type: InfoType,
    pub resolution: u32,
}

impl InfoKey {
    pub fn new(index: u32, z: u32, info_type: InfoType, resolution: u32) -> Self {
        Self {
            index,
            z,
            info_type,
            resolution,
        }
    }
}

/// One encoded artifact (image or serialized array).
#[derive(Debug, Clone, PartialEq)]
pub struct InfoRecord {
    pub key: InfoKey,
    pub data: Bytes,
}

impl InfoRecord {
    pub fn new(key: InfoKey, data: impl Into<Bytes>) -> Self {
        Self {
            key,
            data: data.into(),
        }
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Contents of the MBTiles `metadata` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilesetMetadata {
    pub name: String,
    pub layer_type: String,
    pub version: String,
    pub description: String,
    /// Tile encoding, e.g. `jpg` or `png`
    pub format: String,
}

impl TilesetMetadata {
    /// Metadata for a freshly built tileset.
    pub fn new(name: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layer_type: LAYER_TYPE.to_string(),
            version: SCHEMA_VERSION.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            format: format.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Key/value pairs in the order they are written.
    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("name", self.name.as_str()),
            ("type", self.layer_type.as_str()),
            ("version", self.version.as_str()),
            ("description", self.description.as_str()),
            ("format", self.format.as_str()),
        ]
    }
}

// =============================================================================
// Slice summary
// =============================================================================

/// Tile grid extent of one zoom level as found in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelSummary {
    pub level: u32,
    pub tiles: u64,
    pub columns: u32,
    pub rows: u32,
}

/// Everything stored for one `(index, z)` slice, without payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SliceSummary {
    pub index: u32,
    pub z: u32,
    pub levels: Vec<LevelSummary>,
    pub infos: Vec<InfoSummary>,
}

impl SliceSummary {
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty() && self.infos.is_empty()
    }
}

/// Type and resolution of one stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoSummary {
    pub info_type: String,
    pub resolution: u32,
    pub bytes: u64,
}

/// Raw metadata table, for tilesets not written by this crate.
pub type MetadataMap = BTreeMap<String, String>;
