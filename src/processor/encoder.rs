//! Pixel buffer encoder.
//!
//! Floating-point buffers are mapped to 8-bit grayscale through their render
//! range and written as JPEG or PNG.
//!
//! # Design Decisions
//!
//! - **Render range first**: a buffer carrying `(min, max)` hints maps `min`
//!   to black and `max` to white, clamping outside values. Buffers without
//!   hints use their own extrema.
//!
//! - **Quality control**: JPEG quality is clamped to 1-100. PNG ignores it.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use bytes::Bytes;
use clap::ValueEnum;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, ImageFormat, Luma};

use crate::error::EncodeError;

use super::buffer::{stats, PixelBuffer};

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Tile Format
// =============================================================================

/// Encoding used for tiles and image artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum TileFormat {
    /// Baseline JPEG
    #[default]
    #[value(name = "jpg", alias = "jpeg")]
    Jpeg,

    /// Lossless PNG
    #[value(name = "png")]
    Png,
}

impl TileFormat {
    /// Name stored in the MBTiles `format` metadata entry.
    pub fn name(&self) -> &'static str {
        match self {
            TileFormat::Jpeg => "jpg",
            TileFormat::Png => "png",
        }
    }

    /// HTTP `Content-Type` for tiles in this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            TileFormat::Jpeg => "image/jpeg",
            TileFormat::Png => "image/png",
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(TileFormat::Jpeg),
            "png" => Ok(TileFormat::Png),
            other => Err(format!("unsupported tile format: {}", other)),
        }
    }
}

/// Check if a quality value is within the valid range.
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp a quality value to the valid range.
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Encoder
// =============================================================================

/// Encoder from [`PixelBuffer`] to image bytes.
///
/// # Example
///
/// ```
/// use emtiles::processor::{PixelBuffer, PixelEncoder, TileFormat};
///
/// let buffer = PixelBuffer::from_fn(16, 16, |x, y| (x + y) as f32)
///     .with_render_range(0.0, 30.0);
/// let png = PixelEncoder::new().encode(&buffer, TileFormat::Png, None).unwrap();
/// assert_eq!(&png[1..4], b"PNG");
/// ```
#[derive(Debug, Clone, Default)]
pub struct PixelEncoder {}

impl PixelEncoder {
    pub fn new() -> Self {
        Self {}
    }

    /// Encode a buffer, using `quality` for JPEG (default 80).
    pub fn encode(
        &self,
        buffer: &PixelBuffer,
        format: TileFormat,
        quality: Option<u8>,
    ) -> Result<Bytes, EncodeError> {
        let gray = to_gray(buffer);
        let mut output = Vec::new();

        match format {
            TileFormat::Jpeg => {
                let quality = clamp_quality(quality.unwrap_or(DEFAULT_JPEG_QUALITY));
                let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);
                encoder
                    .encode_image(&gray)
                    .map_err(|e| EncodeError {
                        format: "jpg",
                        message: e.to_string(),
                    })?;
            }
            TileFormat::Png => {
                gray.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
                    .map_err(|e| EncodeError {
                        format: "png",
                        message: e.to_string(),
                    })?;
            }
        }

        Ok(Bytes::from(output))
    }
}

/// Map a buffer onto 8-bit gray through its render range.
pub fn to_gray(buffer: &PixelBuffer) -> GrayImage {
    let (low, high) = buffer.render_range().unwrap_or_else(|| {
        let s = stats(buffer);
        (s.min, s.max)
    });
    let span = high - low;
    let scale = if span.is_finite() && span > 0.0 {
        255.0 / span
    } else {
        0.0
    };

    GrayImage::from_fn(buffer.width(), buffer.height(), |x, y| {
        let v = (buffer.get(x, y) - low) * scale;
        let v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 255.0) };
        Luma([v.round() as u8])
    })
}
