//! Image processing layer.
//!
//! Everything that touches pixel values lives behind the [`ImageProcessor`]
//! trait, so the pyramid builder only deals with geometry:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      Build Orchestrator / Pyramid       │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          ImageProcessor Trait           │
//! │  source access: open, header, regions   │
//! │  pixel ops: shrink, clip, FFT, encode   │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │ RasterProcessor │    │  other processors   │
//! │ (image crate)   │    │  (EM file formats)  │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! Source access is implementation specific. The pixel operations have default
//! implementations over [`PixelBuffer`] that implementors may override.

mod buffer;
mod encoder;
mod raster;
mod spectrum;

use std::path::Path;

use bytes::Bytes;

use crate::error::{EncodeError, SourceError};

pub use buffer::{PixelBuffer, PixelStats, Region};
pub use encoder::{
    clamp_quality, is_valid_quality, PixelEncoder, TileFormat, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use raster::{RasterProcessor, RasterStack};

/// Dimensions of one stack index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceHeader {
    pub width: u32,
    pub height: u32,

    /// Number of Z planes; 1 for a plain 2D image
    pub depth: u32,
}

impl SliceHeader {
    pub fn is_volume(&self) -> bool {
        self.depth > 1
    }
}

/// Source access and pixel operations used by the pyramid builder.
///
/// `Handle` is whatever the implementation needs to keep a source open. The
/// build runs on a single thread, but the handle must be `Send` so the whole
/// build can move onto a blocking worker.
pub trait ImageProcessor: Send + Sync {
    type Handle: Send;

    /// Open a source image.
    fn open_image(&self, path: &Path) -> Result<Self::Handle, SourceError>;

    /// Number of stack indices in the source.
    fn slice_count(&self, handle: &Self::Handle) -> usize;

    /// Dimensions of one stack index.
    fn read_header(&self, handle: &Self::Handle, index: usize) -> Result<SliceHeader, SourceError>;

    /// Read pixels from one stack index.
    ///
    /// `z` selects a plane of a volume (`None` means plane 0). `region` selects
    /// a rectangle; `None` reads the whole plane. A region that does not fit
    /// is an error rather than being clipped.
    fn read_region(
        &self,
        handle: &Self::Handle,
        index: usize,
        z: Option<u32>,
        region: Option<Region>,
    ) -> Result<PixelBuffer, SourceError>;

    // =========================================================================
    // Pixel operations
    // =========================================================================

    /// Rescale in place to zero mean and unit standard deviation.
    fn normalize(&self, buffer: &mut PixelBuffer) {
        buffer::normalize(buffer);
    }

    /// Mean-shrink by an integer factor, rounding dimensions down.
    fn shrink_by_factor(&self, buffer: &PixelBuffer, factor: u32) -> PixelBuffer {
        buffer::mean_shrink(buffer, factor)
    }

    /// Copy a region, filling pixels outside the buffer with `fill`.
    fn clip_with_fill(&self, buffer: &PixelBuffer, region: Region, fill: f32) -> PixelBuffer {
        buffer::clip_with_fill(buffer, region, fill)
    }

    fn stats(&self, buffer: &PixelBuffer) -> PixelStats {
        buffer::stats(buffer)
    }

    /// Normalize a block, take its power spectrum and add it to `sum`.
    ///
    /// The first call initializes `sum`. Every block passed for one sum must
    /// have the same dimensions.
    fn fft_power_accumulate(&self, block: &PixelBuffer, sum: &mut Option<PixelBuffer>) {
        let mut block = block.clone();
        self.normalize(&mut block);
        let power = spectrum::power_spectrum(&block);
        match sum {
            Some(total) => total.accumulate(&power),
            None => *sum = Some(power),
        }
    }

    /// Rotational average on rings `1..=max_radius` around the buffer center.
    fn radial_average(&self, buffer: &PixelBuffer, max_radius: usize) -> Vec<f32> {
        spectrum::radial_average(buffer, max_radius)
    }

    /// Encode through the buffer's render range.
    fn encode(
        &self,
        buffer: &PixelBuffer,
        format: TileFormat,
        quality: Option<u8>,
    ) -> Result<Bytes, EncodeError> {
        PixelEncoder::new().encode(buffer, format, quality)
    }
}
