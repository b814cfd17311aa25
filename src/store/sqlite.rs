//! SQLite-backed tile database in the MBTiles layout.
//!
//! The store writes a `tilestack` table that is a superset of the MBTiles
//! `tiles` table (it adds the stack index and depth plane), a `tileinfo` table
//! for auxiliary artifacts, the standard `metadata` table, and a `tiles` view
//! over the default slice so plain MBTiles clients can open the file.
//!
//! # Transactions
//!
//! All writes go into one explicit transaction that is opened lazily by the
//! first write and closed by [`TileStore::commit`] or [`TileStore::abort`].
//! Dropping a store with an open transaction rolls it back, so a build that
//! fails before commit leaves no queryable rows behind.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, warn};

use crate::error::StoreError;

use super::record::{
    InfoKey, InfoRecord, InfoSummary, LevelSummary, MetadataMap, SliceSummary, TileKey,
    TileRecord, TilesetMetadata,
};

/// Stack index exposed through the `tiles` view.
pub const DEFAULT_INDEX: u32 = 0;

/// Depth plane exposed through the `tiles` view.
pub const DEFAULT_Z: u32 = 0;

/// How long readers wait on a locked database before giving up.
const READ_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_SCHEMA: &str = "
    CREATE TABLE tilestack (
        tile_index integer,
        tile_nz integer,
        zoom_level integer,
        tile_column integer,
        tile_row integer,
        tile_data blob
    );
    CREATE TABLE tileinfo (
        tile_index integer,
        tile_nz integer,
        info_type text,
        info_resolution integer,
        info_data blob
    );
    CREATE TABLE metadata (name text, value text);
    CREATE VIEW tiles AS
        SELECT
            tilestack.zoom_level,
            tilestack.tile_column,
            tilestack.tile_row,
            tilestack.tile_data
        FROM tilestack
        WHERE
            tilestack.tile_index = 0 AND
            tilestack.tile_nz = 0;
";

const SCHEMA_OBJECTS: &str = "
    SELECT COUNT(*) FROM sqlite_master
    WHERE name IN ('tilestack', 'tileinfo', 'metadata', 'tiles')
";

const INSERT_TILE: &str = "
    INSERT INTO tilestack(tile_index, tile_nz, zoom_level, tile_column, tile_row, tile_data)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
";

const INSERT_INFO: &str = "
    INSERT INTO tileinfo(tile_index, tile_nz, info_type, info_resolution, info_data)
    VALUES (?1, ?2, ?3, ?4, ?5)
";

const SELECT_TILE: &str = "
    SELECT tile_data FROM tilestack
    WHERE tile_index = ?1 AND tile_nz = ?2 AND zoom_level = ?3
      AND tile_column = ?4 AND tile_row = ?5
";

const SELECT_DEFAULT_TILE: &str = "
    SELECT tile_data FROM tiles
    WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3
";

const SELECT_INFO: &str = "
    SELECT info_data FROM tileinfo
    WHERE tile_index = ?1 AND tile_nz = ?2 AND info_type = ?3 AND info_resolution = ?4
";

/// Handle on one tile database file.
///
/// A store opened with [`TileStore::create`] is the single writer for the
/// duration of a build. Stores opened with [`TileStore::open_read_only`] are
/// cheap and independent, one per lookup on the serving side.
pub struct TileStore {
    conn: Connection,

    /// Display name used in error messages
    name: String,

    /// Whether an explicit transaction is open
    in_transaction: bool,
}

impl TileStore {
    /// Open (creating if needed) a database for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        Ok(Self::from_connection(conn, path.display().to_string()))
    }

    /// Open an existing database for reading only.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        conn.busy_timeout(READ_BUSY_TIMEOUT)?;
        Ok(Self::from_connection(conn, path.display().to_string()))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn, ":memory:".to_string()))
    }

    fn from_connection(conn: Connection, name: String) -> Self {
        Self {
            conn,
            name,
            in_transaction: false,
        }
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
            self.in_transaction = true;
        }
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Create the tile tables, metadata table and default view.
    ///
    /// Fails with [`StoreError::SchemaExists`] if any of them is already
    /// present, including when created earlier in the same transaction.
    pub fn create_schema(&mut self) -> Result<(), StoreError> {
        self.begin()?;
        let existing: i64 = self.conn.query_row(SCHEMA_OBJECTS, [], |row| row.get(0))?;
        if existing > 0 {
            return Err(StoreError::SchemaExists {
                path: self.name.clone(),
            });
        }
        self.conn.execute_batch(CREATE_SCHEMA)?;
        debug!(db = %self.name, "created tile schema");
        Ok(())
    }

    /// Write the metadata key/value pairs.
    pub fn write_metadata(&mut self, metadata: &TilesetMetadata) -> Result<(), StoreError> {
        self.begin()?;
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO metadata(name, value) VALUES (?1, ?2)")?;
        for (name, value) in metadata.entries() {
            stmt.execute(params![name, value])?;
        }
        Ok(())
    }

    /// Append one tile. Duplicate keys are not rejected here.
    pub fn insert_tile(&mut self, record: &TileRecord) -> Result<(), StoreError> {
        self.begin()?;
        let key = &record.key;
        self.conn.prepare_cached(INSERT_TILE)?.execute(params![
            key.index,
            key.z,
            key.level,
            key.column,
            key.row,
            record.data.as_ref()
        ])?;
        Ok(())
    }

    /// Append one info artifact. Duplicate keys are not rejected here.
    pub fn insert_info(&mut self, record: &InfoRecord) -> Result<(), StoreError> {
        self.begin()?;
        let key = &record.key;
        self.conn.prepare_cached(INSERT_INFO)?.execute(params![
            key.index,
            key.z,
            key.info_type.as_str(),
            key.resolution,
            record.data.as_ref()
        ])?;
        Ok(())
    }

    /// Make every write since open or the last commit durable.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        if self.in_transaction {
            self.conn.execute_batch("COMMIT")?;
            self.in_transaction = false;
            debug!(db = %self.name, "committed");
        }
        Ok(())
    }

    /// Discard every write since open or the last commit.
    pub fn abort(&mut self) -> Result<(), StoreError> {
        if self.in_transaction {
            self.in_transaction = false;
            self.conn.execute_batch("ROLLBACK")?;
            debug!(db = %self.name, "rolled back");
        }
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read one tile by its full key.
    pub fn read_tile(&self, key: &TileKey) -> Result<Bytes, StoreError> {
        let data: Option<Vec<u8>> = self
            .conn
            .prepare_cached(SELECT_TILE)?
            .query_row(
                params![key.index, key.z, key.level, key.column, key.row],
                |row| row.get(0),
            )
            .optional()?;

        data.map(Bytes::from).ok_or(StoreError::TileNotFound {
            index: key.index,
            z: key.z,
            level: key.level,
            column: key.column,
            row: key.row,
        })
    }

    /// Read one info artifact by its full key.
    pub fn read_tile_info(&self, key: &InfoKey) -> Result<Bytes, StoreError> {
        let data: Option<Vec<u8>> = self
            .conn
            .prepare_cached(SELECT_INFO)?
            .query_row(
                params![key.index, key.z, key.info_type.as_str(), key.resolution],
                |row| row.get(0),
            )
            .optional()?;

        data.map(Bytes::from).ok_or(StoreError::InfoNotFound {
            index: key.index,
            z: key.z,
            info_type: key.info_type,
            resolution: key.resolution,
        })
    }

    /// Read a tile of the default slice through the `tiles` view.
    pub fn read_default_tile(&self, level: u32, column: u32, row: u32) -> Result<Bytes, StoreError> {
        let data: Option<Vec<u8>> = self
            .conn
            .prepare_cached(SELECT_DEFAULT_TILE)?
            .query_row(params![level, column, row], |r| r.get(0))
            .optional()?;

        data.map(Bytes::from).ok_or(StoreError::TileNotFound {
            index: DEFAULT_INDEX,
            z: DEFAULT_Z,
            level,
            column,
            row,
        })
    }

    /// Read the whole metadata table.
    pub fn read_metadata(&self) -> Result<MetadataMap, StoreError> {
        let mut stmt = self.conn.prepare_cached("SELECT name, value FROM metadata")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut metadata = MetadataMap::new();
        for row in rows {
            let (name, value) = row?;
            metadata.insert(name, value);
        }
        Ok(metadata)
    }

    /// Summarize the tile grid and artifacts stored for one slice.
    pub fn slice_summary(&self, index: u32, z: u32) -> Result<SliceSummary, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT zoom_level, COUNT(*), MAX(tile_column) + 1, COUNT(DISTINCT tile_row)
             FROM tilestack WHERE tile_index = ?1 AND tile_nz = ?2
             GROUP BY zoom_level ORDER BY zoom_level",
        )?;
        let levels = stmt
            .query_map(params![index, z], |row| {
                Ok(LevelSummary {
                    level: row.get(0)?,
                    tiles: row.get::<_, i64>(1)?.max(0) as u64,
                    columns: row.get(2)?,
                    rows: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare_cached(
            "SELECT info_type, info_resolution, LENGTH(info_data)
             FROM tileinfo WHERE tile_index = ?1 AND tile_nz = ?2
             ORDER BY info_type, info_resolution",
        )?;
        let infos = stmt
            .query_map(params![index, z], |row| {
                Ok(InfoSummary {
                    info_type: row.get(0)?,
                    resolution: row.get(1)?,
                    bytes: row.get::<_, Option<i64>>(2)?.unwrap_or(0).max(0) as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SliceSummary {
            index,
            z,
            levels,
            infos,
        })
    }
}

impl Drop for TileStore {
    fn drop(&mut self) {
        if self.in_transaction {
            warn!(db = %self.name, "dropping tile store with uncommitted writes");
            if let Err(e) = self.abort() {
                warn!(db = %self.name, "rollback failed: {}", e);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
