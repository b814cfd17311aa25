//! Tile pyramid construction.
//!
//! A slice of `width × height` pixels becomes levels `0..=L` with
//! `L = ceil(log2(max(width, height) / tile_size))`. Level `L` is full
//! resolution; each lower level is the previous one mean-shrunk by 2. Tiles
//! are corner aligned, so tile `(column, row)` of a level covers pixels
//! starting at `(column · tile_size, row · tile_size)`, padded past the edge.
//! That row is stored as `2^level - 1 - row`, counting from the bottom as
//! MBTiles readers expect.
//!
//! - [`geometry`]: level counts, dimensions, tile grids and row flipping
//! - [`PyramidBuilder`]: tiles, thumbnail and power spectrum records for one slice

pub mod geometry;

mod builder;

pub use builder::{
    PyramidBuilder, PyramidTiles, Slice, DEFAULT_PSPEC_TILE_SIZE, DEFAULT_TILE_SIZE,
};
pub use geometry::{flip_row, level_count, LevelGeometry};
