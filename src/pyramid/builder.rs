//! Tile pyramid, thumbnail and power spectrum generation for one slice.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       PyramidBuilder                            │
//! │                                                                 │
//! │   build_pyramid()        thumbnail()        power_spectrum()    │
//! │   level L .. 0           shrink to fit      P×P blocks          │
//! │   clip + encode          encode PNG         FFT² + log + PNG    │
//! │   shrink by 2                               radial profile JSON │
//! │        │                      │                    │            │
//! │        ▼                      ▼                    ▼            │
//! │   TileRecord            InfoRecord           InfoRecord × 2     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every pixel operation goes through the [`ImageProcessor`], so the builder
//! only decides geometry and rendering ranges.

use tracing::debug;

use crate::error::BuildError;
use crate::processor::{ImageProcessor, PixelBuffer, Region, TileFormat, DEFAULT_JPEG_QUALITY};
use crate::store::{InfoKey, InfoRecord, InfoType, TileKey, TileRecord};

use super::geometry::{flip_row, level_count, thumbnail_factor, tile_grid};

/// Default edge length of a pyramid tile.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default edge length of a power spectrum block.
pub const DEFAULT_PSPEC_TILE_SIZE: u32 = 512;

/// Display range half-width for tiles and thumbnails, in standard deviations.
const RENDER_SIGMAS: f32 = 3.0;

/// Value written over the zero-frequency term of the averaged spectrum.
const PSPEC_DC_VALUE: f32 = 0.01;

/// One 2D slice of a source image, at full resolution.
#[derive(Debug, Clone)]
pub struct Slice {
    pub index: u32,
    pub z: u32,
    pub pixels: PixelBuffer,
}

impl Slice {
    pub fn new(index: u32, z: u32, pixels: PixelBuffer) -> Self {
        Self { index, z, pixels }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Produces the tile and info records for slices of one build.
pub struct PyramidBuilder<'a, P: ImageProcessor> {
    processor: &'a P,
    tile_size: u32,
    pspec_tile_size: u32,
    format: TileFormat,
    quality: u8,
}

impl<'a, P: ImageProcessor> PyramidBuilder<'a, P> {
    /// Builder with default tile sizes, JPEG tiles at quality 80.
    pub fn new(processor: &'a P) -> Self {
        Self {
            processor,
            tile_size: DEFAULT_TILE_SIZE,
            pspec_tile_size: DEFAULT_PSPEC_TILE_SIZE,
            format: TileFormat::Jpeg,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.max(1);
        self
    }

    pub fn with_pspec_tile_size(mut self, pspec_tile_size: u32) -> Self {
        self.pspec_tile_size = pspec_tile_size.max(1);
        self
    }

    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn pspec_tile_size(&self) -> u32 {
        self.pspec_tile_size
    }

    /// Lazily produce every tile of the slice, finest level first.
    ///
    /// Within a level, columns are the outer loop and rows the inner one,
    /// walking down from the top edge. Keys carry stored rows, which count
    /// from the bottom of a `2^level` row grid (see [`flip_row`]).
    /// Iteration stops after the first error. Calling this again starts over
    /// from the full-resolution pixels.
    pub fn build_pyramid<'s>(&'s self, slice: &'s Slice) -> PyramidTiles<'s, P> {
        let (width, height) = slice.pixels.dimensions();
        let finest = level_count(width, height, self.tile_size);
        debug!(
            index = slice.index,
            z = slice.z,
            width,
            height,
            levels = finest + 1,
            "building pyramid"
        );

        PyramidTiles {
            processor: self.processor,
            slice,
            tile_size: self.tile_size,
            format: self.format,
            quality: self.quality,
            level: finest,
            working: None,
            grid: (0, 0),
            next_tile: (0, 0),
            fill_range: (0.0, 0.0),
            finished: false,
        }
    }

    /// Downscaled preview fitting in one tile, encoded as PNG.
    pub fn thumbnail(&self, slice: &Slice) -> Result<InfoRecord, BuildError> {
        let (width, height) = slice.pixels.dimensions();
        let factor = thumbnail_factor(width, height, self.tile_size);

        let mut thumb = self.processor.shrink_by_factor(&slice.pixels, factor);
        let (rmin, rmax) = self.processor.stats(&thumb).sigma_range(RENDER_SIGMAS);
        thumb.set_render_range(rmin, rmax);

        let data = self.processor.encode(&thumb, TileFormat::Png, None)?;
        Ok(InfoRecord::new(
            InfoKey::new(slice.index, slice.z, InfoType::Thumbnail, self.tile_size),
            data,
        ))
    }

    /// Averaged power spectrum image and its radial profile.
    ///
    /// Returns no records when the slice is smaller than two blocks in either
    /// direction. With three or more blocks along an axis the outer ring of
    /// blocks is skipped.
    pub fn power_spectrum(&self, slice: &Slice) -> Result<Vec<InfoRecord>, BuildError> {
        let size = self.pspec_tile_size;
        let (width, height) = slice.pixels.dimensions();
        let (nx, ny) = (width / size, height / size);
        if nx < 2 || ny < 2 {
            debug!(
                index = slice.index,
                z = slice.z,
                "slice too small for a {}px power spectrum",
                size
            );
            return Ok(Vec::new());
        }

        let inner = |n: u32| if n > 2 { 1..n - 1 } else { 0..n };
        let mut sum = None;
        for by in inner(ny) {
            for bx in inner(nx) {
                let block = self
                    .processor
                    .clip_with_fill(&slice.pixels, Region::square(bx * size, by * size, size), 0.0);
                self.processor.fft_power_accumulate(&block, &mut sum);
            }
        }
        let Some(mut spectrum) = sum else {
            return Ok(Vec::new());
        };

        spectrum.set(size / 2, size / 2, PSPEC_DC_VALUE);

        let before = self.processor.stats(&spectrum);
        let floor = (before.sigma * 0.01).max(1e-6);
        let shift = before.min - floor;
        spectrum.data_mut().mapv_inplace(|v| (v - shift).ln());

        let after = self.processor.stats(&spectrum);
        spectrum.set_render_range(after.min - after.sigma * 0.1, after.mean + after.sigma * 4.0);

        let image = self.processor.encode(&spectrum, TileFormat::Png, None)?;

        let max_radius = (size / 2).saturating_sub(1) as usize;
        let profile = self.processor.radial_average(&spectrum, max_radius);
        let json = serde_json::to_vec(&profile).map_err(|e| BuildError::Serialize(e.to_string()))?;

        Ok(vec![
            InfoRecord::new(InfoKey::new(slice.index, slice.z, InfoType::Pspec, size), image),
            InfoRecord::new(
                InfoKey::new(slice.index, slice.z, InfoType::PspecJson, size / 2),
                json,
            ),
        ])
    }
}

// =============================================================================
// Tile iterator
// =============================================================================

/// Iterator over the encoded tiles of one slice.
///
/// Holds only the current level's pixels; the next level is produced by
/// shrinking once the current one is exhausted.
pub struct PyramidTiles<'s, P: ImageProcessor> {
    processor: &'s P,
    slice: &'s Slice,
    tile_size: u32,
    format: TileFormat,
    quality: u8,

    /// Level whose tiles are being emitted
    level: u32,

    /// Pixels of `level`, `None` until the first call to `next`
    working: Option<PixelBuffer>,

    /// Columns and rows of `level`
    grid: (u32, u32),

    /// Column and row of the next tile
    next_tile: (u32, u32),

    /// Render range and edge fill of `level`
    fill_range: (f32, f32),

    finished: bool,
}

impl<'s, P: ImageProcessor> PyramidTiles<'s, P> {
    fn enter_level(&mut self, pixels: PixelBuffer) {
        let (width, height) = pixels.dimensions();
        self.grid = tile_grid(width, height, self.tile_size);
        self.next_tile = (0, 0);
        self.fill_range = self.processor.stats(&pixels).sigma_range(RENDER_SIGMAS);
        debug!(
            index = self.slice.index,
            z = self.slice.z,
            level = self.level,
            width,
            height,
            columns = self.grid.0,
            rows = self.grid.1,
            "tiling level"
        );
        self.working = Some(pixels);
    }

    fn encode_tile(&self, pixels: &PixelBuffer, column: u32, row: u32) -> Result<TileRecord, BuildError> {
        let (rmin, rmax) = self.fill_range;
        let region = Region::square(column * self.tile_size, row * self.tile_size, self.tile_size);

        let stored_row = flip_row(self.level, row).ok_or(BuildError::RowOutOfRange {
            level: self.level,
            row,
        })?;

        let mut tile = self.processor.clip_with_fill(pixels, region, rmax);
        tile.set_render_range(rmin, rmax);
        let data = self.processor.encode(&tile, self.format, Some(self.quality))?;

        Ok(TileRecord::new(
            TileKey::new(self.slice.index, self.slice.z, self.level, column, stored_row),
            data,
        ))
    }
}

impl<'s, P: ImageProcessor> Iterator for PyramidTiles<'s, P> {
    type Item = Result<TileRecord, BuildError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            let Some(pixels) = self.working.take() else {
                self.enter_level(self.slice.pixels.clone());
                continue;
            };

            let (columns, rows) = self.grid;
            let (column, row) = self.next_tile;
            if column < columns {
                let result = self.encode_tile(&pixels, column, row);
                self.working = Some(pixels);
                self.next_tile = if row + 1 < rows {
                    (column, row + 1)
                } else {
                    (column + 1, 0)
                };
                if result.is_err() {
                    self.finished = true;
                }
                return Some(result);
            }

            if self.level == 0 {
                self.finished = true;
                return None;
            }
            self.level -= 1;
            let shrunk = self.processor.shrink_by_factor(&pixels, 2);
            self.enter_level(shrunk);
        }
    }
}
