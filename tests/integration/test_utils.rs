//! Test utilities for integration tests.
//!
//! This module provides a mock image processor that synthesizes pixel data
//! for stacks and volumes, and helpers for building tilesets into temporary
//! directories.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use emtiles::error::SourceError;
use emtiles::processor::{ImageProcessor, PixelBuffer, Region, SliceHeader};
use emtiles::store::TileStore;
use emtiles::{build, BuildConfig, BuildReport, TileFormat};

// =============================================================================
// Mock Image Processor
// =============================================================================

/// Dimensions of one synthetic stack index.
#[derive(Debug, Clone, Copy)]
pub struct MockImage {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// An image processor that serves synthetic pixels without touching disk.
///
/// Pixel values depend on the stack index and Z plane, so tiles of different
/// slices differ. Reads of one index can be made to fail, and every
/// `read_region` call is counted.
#[derive(Debug, Clone, Default)]
pub struct MockProcessor {
    images: Vec<MockImage>,
    bright_top: bool,
    fail_open: bool,
    fail_index: Option<usize>,
    reads: Arc<AtomicUsize>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stack of `count` 2D images of the same size.
    pub fn stack(count: usize, width: u32, height: u32) -> Self {
        let mut processor = Self::new();
        for _ in 0..count {
            processor = processor.with_image(width, height);
        }
        processor
    }

    pub fn with_image(mut self, width: u32, height: u32) -> Self {
        self.images.push(MockImage {
            width,
            height,
            depth: 1,
        });
        self
    }

    pub fn with_volume(mut self, width: u32, height: u32, depth: u32) -> Self {
        self.images.push(MockImage {
            width,
            height,
            depth,
        });
        self
    }

    /// Paint the upper half of every image bright and the lower half dark.
    pub fn with_bright_top(mut self) -> Self {
        self.bright_top = true;
        self
    }

    /// Make `open_image` fail.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Make every read of stack index `index` fail.
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_index = Some(index);
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Pixel value at `(x, y)` of slice `(index, z)`.
    pub fn pixel(index: usize, z: u32, x: u32, y: u32) -> f32 {
        let base = (x * 7 + y * 13) % 97;
        (base as f32) + (index as f32) * 50.0 + (z as f32) * 5.0
    }
}

impl ImageProcessor for MockProcessor {
    type Handle = Vec<MockImage>;

    fn open_image(&self, path: &Path) -> Result<Self::Handle, SourceError> {
        if self.fail_open || self.images.is_empty() {
            return Err(SourceError::Open {
                path: path.display().to_string(),
                message: "mock source unavailable".to_string(),
            });
        }
        Ok(self.images.clone())
    }

    fn slice_count(&self, handle: &Self::Handle) -> usize {
        handle.len()
    }

    fn read_header(&self, handle: &Self::Handle, index: usize) -> Result<SliceHeader, SourceError> {
        let image = handle.get(index).ok_or(SourceError::IndexOutOfRange {
            index,
            count: handle.len(),
        })?;
        Ok(SliceHeader {
            width: image.width,
            height: image.height,
            depth: image.depth,
        })
    }

    fn read_region(
        &self,
        handle: &Self::Handle,
        index: usize,
        z: Option<u32>,
        region: Option<Region>,
    ) -> Result<PixelBuffer, SourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let image = handle.get(index).ok_or(SourceError::IndexOutOfRange {
            index,
            count: handle.len(),
        })?;
        if self.fail_index == Some(index) {
            return Err(SourceError::Open {
                path: format!("mock[{}]", index),
                message: "injected read failure".to_string(),
            });
        }

        let z = z.unwrap_or(0);
        if z >= image.depth {
            return Err(SourceError::SliceOutOfRange {
                index,
                z,
                depth: image.depth,
            });
        }

        let region = region.unwrap_or(Region::new(0, 0, image.width, image.height));
        if !region.fits_within(image.width, image.height) {
            return Err(SourceError::RegionOutOfBounds {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                slice_width: image.width,
                slice_height: image.height,
            });
        }

        let bright_top = self.bright_top;
        Ok(PixelBuffer::from_fn(region.width, region.height, |x, y| {
            match bright_top {
                true if region.y + y < image.height / 2 => 250.0,
                true => 5.0,
                false => Self::pixel(index, z, region.x + x, region.y + y),
            }
        }))
    }
}

// =============================================================================
// Tileset Helpers
// =============================================================================

/// Build configuration used by the tests: PNG tiles and small spectrum blocks.
pub fn test_config(tile_size: u32) -> BuildConfig {
    BuildConfig::default()
        .with_tile_size(tile_size)
        .with_pspec_tile_size(64)
        .with_tile_format(TileFormat::Png)
}

/// Build `<name>.mbtiles` in `dir` from a mock processor.
pub fn build_tileset(
    dir: &Path,
    name: &str,
    processor: &MockProcessor,
    config: &BuildConfig,
) -> (PathBuf, BuildReport) {
    let output = dir.join(format!("{}.mbtiles", name));
    let report = build(processor, Path::new("mock"), &output, config).expect("build failed");
    (output, report)
}

/// Count tiles stored for one slice and level by reading the whole grid.
pub fn count_level_tiles(store: &TileStore, index: u32, z: u32, level: u32) -> u64 {
    store
        .slice_summary(index, z)
        .expect("summary failed")
        .levels
        .iter()
        .find(|l| l.level == level)
        .map(|l| l.tiles)
        .unwrap_or(0)
}

/// Mean gray level of the rows `top..bottom` of an encoded tile.
pub fn mean_luma(data: &[u8], top: u32, bottom: u32) -> f64 {
    let gray = image::load_from_memory(data)
        .expect("tile does not decode")
        .to_luma8();
    let (mut sum, mut count) = (0.0, 0u32);
    for y in top..bottom.min(gray.height()) {
        for x in 0..gray.width() {
            sum += f64::from(gray.get_pixel(x, y).0[0]);
            count += 1;
        }
    }
    sum / f64::from(count.max(1))
}

/// Check if data is a PNG image (starts with the PNG signature).
pub fn is_valid_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}

/// Check if data is a JPEG image (starts with SOI, ends with EOI).
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data.starts_with(&[0xFF, 0xD8]) && data.ends_with(&[0xFF, 0xD9])
}
