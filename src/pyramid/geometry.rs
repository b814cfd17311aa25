//! Pyramid level and tile grid arithmetic.
//!
//! Level `L` is full resolution and level 0 the coarsest. Each step down
//! halves both dimensions with the same rounding as the mean shrink, so the
//! sizes computed here match the buffers the builder actually produces.

/// Number of the finest level: `ceil(log2(max(width, height) / tile_size))`.
///
/// Zero when the slice fits in one tile. Computed on integers so exact powers
/// of two do not pick up an extra level through float rounding.
pub fn level_count(width: u32, height: u32, tile_size: u32) -> u32 {
    let tile_size = u64::from(tile_size.max(1));
    let extent = u64::from(width.max(height));

    let mut level = 0;
    while tile_size << level < extent {
        level += 1;
    }
    level
}

/// Dimensions of `level` given full-resolution dimensions and the finest level.
///
/// Mirrors repeated shrinking by 2 with rounding down and a 1 pixel floor.
pub fn level_dimensions(width: u32, height: u32, finest: u32, level: u32) -> (u32, u32) {
    let mut dims = (width, height);
    for _ in level..finest {
        dims = ((dims.0 / 2).max(1), (dims.1 / 2).max(1));
    }
    dims
}

/// Number of tile columns and rows covering a `width × height` level.
pub fn tile_grid(width: u32, height: u32, tile_size: u32) -> (u32, u32) {
    let tile_size = tile_size.max(1);
    (width.div_ceil(tile_size), height.div_ceil(tile_size))
}

/// Geometry of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelGeometry {
    pub level: u32,
    pub width: u32,
    pub height: u32,
    pub columns: u32,
    pub rows: u32,
}

impl LevelGeometry {
    pub fn tile_count(&self) -> u64 {
        u64::from(self.columns) * u64::from(self.rows)
    }
}

/// Geometry of every level of a slice, finest first.
pub fn pyramid_levels(width: u32, height: u32, tile_size: u32) -> Vec<LevelGeometry> {
    let finest = level_count(width, height, tile_size);
    (0..=finest)
        .rev()
        .map(|level| {
            let (w, h) = level_dimensions(width, height, finest, level);
            let (columns, rows) = tile_grid(w, h, tile_size);
            LevelGeometry {
                level,
                width: w,
                height: h,
                columns,
                rows,
            }
        })
        .collect()
}

/// Convert between request rows and stored rows.
///
/// Stored rows count from the bottom (`2^level - 1 - row`); the mapping is its
/// own inverse. Returns `None` for rows that cannot exist at `level`.
pub fn flip_row(level: u32, row: u32) -> Option<u32> {
    if level >= 32 {
        return None;
    }
    let rows = 1u64 << level;
    let row = u64::from(row);
    if row >= rows {
        return None;
    }
    u32::try_from(rows - 1 - row).ok()
}

/// Smallest power-of-two shrink factor that fits `max(width, height)` in
/// one tile.
pub fn thumbnail_factor(width: u32, height: u32, tile_size: u32) -> u32 {
    1u32 << level_count(width, height, tile_size).min(31)
}
