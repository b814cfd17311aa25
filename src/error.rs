use thiserror::Error;

use crate::store::InfoType;

/// Errors raised by an image source when it cannot produce requested pixels
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The source could not be opened or decoded
    #[error("Failed to open {path}: {message}")]
    Open { path: String, message: String },

    /// Stack index past the end of the source
    #[error("Stack index {index} out of range (source has {count} images)")]
    IndexOutOfRange { index: usize, count: usize },

    /// Depth plane past the end of a volume
    #[error("Z slice {z} out of range for index {index} (depth {depth})")]
    SliceOutOfRange { index: usize, z: u32, depth: u32 },

    /// Requested region does not fit inside the slice
    #[error("Region {x},{y} {width}x{height} exceeds slice bounds {slice_width}x{slice_height}")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        slice_width: u32,
        slice_height: u32,
    },
}

/// Errors produced while encoding pixels into tile bytes
#[derive(Debug, Clone, Error)]
#[error("Failed to encode {format} image: {message}")]
pub struct EncodeError {
    pub format: &'static str,
    pub message: String,
}

/// Errors from the tile database
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The database already holds a tile schema
    #[error("Schema already exists in {path}")]
    SchemaExists { path: String },

    /// No tile stored under the requested key
    #[error("Tile not found: index={index} z={z} level={level} column={column} row={row}")]
    TileNotFound {
        index: u32,
        z: u32,
        level: u32,
        column: u32,
        row: u32,
    },

    /// No info artifact stored under the requested key
    #[error("Tile info not found: index={index} z={z} type={info_type} resolution={resolution}")]
    InfoNotFound {
        index: u32,
        z: u32,
        info_type: InfoType,
        resolution: u32,
    },

    /// SQLite reported an error
    #[error("Database error: {0}")]
    Database(String),

    /// Filesystem error around the database file
    #[error("I/O error: {0}")]
    Io(String),
}

impl StoreError {
    /// Whether this error means a missing key rather than a broken database.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::TileNotFound { .. } | StoreError::InfoNotFound { .. }
        )
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Errors that abort a pyramid build
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// Source image could not be read
    #[error("Source read error: {0}")]
    Source(#[from] SourceError),

    /// Tile or artifact could not be encoded
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Tile database failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Build configuration rejected before any work started
    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    /// Radial profile could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Level grid taller than the `2^level` rows a level can address
    #[error("Row {row} does not fit level {level}")]
    RowOutOfRange { level: u32, row: u32 },
}

/// Errors surfaced by the tile server, one per request
#[derive(Debug, Clone, Error)]
pub enum ServeError {
    /// Malformed route or parameters
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// No database file for the requested tileset
    #[error("Tileset not found: {tileset}")]
    TilesetNotFound { tileset: String },

    /// Tileset exists but holds no tile at the requested coordinates
    #[error("Tile not found: level={level} column={column} row={row}")]
    TileNotFound { level: u32, column: u32, row: u32 },

    /// Tileset exists but holds nothing for the requested slice
    #[error("Slice not found: index={index} z={z}")]
    SliceNotFound { index: u32, z: u32 },

    /// Any other store failure
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Request abandoned before a result could be delivered
    #[error("Request cancelled")]
    Cancelled,

    /// Worker failure unrelated to the store
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ServeError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ServeError::BadRequest {
            message: message.into(),
        }
    }
}

impl From<StoreError> for ServeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TileNotFound {
                level, column, row, ..
            } => ServeError::TileNotFound { level, column, row },
            StoreError::InfoNotFound { index, z, .. } => ServeError::SliceNotFound { index, z },
            other => ServeError::Store(other),
        }
    }
}
