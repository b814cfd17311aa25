//! Image processor for ordinary raster files.
//!
//! A single file is a one-image stack; a directory is a stack with one index
//! per supported file, ordered by file name. Every image is read as a 2D
//! slice of luminance values.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::error::SourceError;

use super::buffer::{PixelBuffer, Region};
use super::{ImageProcessor, SliceHeader};

/// Extensions picked up when a directory is opened as a stack.
const RASTER_EXTENSIONS: &[&str] = &["tif", "tiff", "png", "jpg", "jpeg"];

/// Check if a path has a supported raster extension.
fn is_raster_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            RASTER_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Open raster source: the files backing each stack index.
#[derive(Debug, Clone)]
pub struct RasterStack {
    files: Vec<PathBuf>,
}

impl RasterStack {
    fn file(&self, index: usize) -> Result<&Path, SourceError> {
        self.files
            .get(index)
            .map(PathBuf::as_path)
            .ok_or(SourceError::IndexOutOfRange {
                index,
                count: self.files.len(),
            })
    }
}

/// [`ImageProcessor`] backed by the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct RasterProcessor {}

impl RasterProcessor {
    pub fn new() -> Self {
        Self {}
    }
}

fn open_error(path: &Path, message: impl ToString) -> SourceError {
    SourceError::Open {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

impl ImageProcessor for RasterProcessor {
    type Handle = RasterStack;

    fn open_image(&self, path: &Path) -> Result<RasterStack, SourceError> {
        let meta = fs::metadata(path).map_err(|e| open_error(path, e))?;

        let files = if meta.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(path)
                .map_err(|e| open_error(path, e))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_raster_file(p))
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        if files.is_empty() {
            return Err(open_error(path, "directory holds no raster images"));
        }

        Ok(RasterStack { files })
    }

    fn slice_count(&self, handle: &RasterStack) -> usize {
        handle.files.len()
    }

    fn read_header(&self, handle: &RasterStack, index: usize) -> Result<SliceHeader, SourceError> {
        let file = handle.file(index)?;
        let (width, height) = image::image_dimensions(file).map_err(|e| open_error(file, e))?;
        Ok(SliceHeader {
            width,
            height,
            depth: 1,
        })
    }

    fn read_region(
        &self,
        handle: &RasterStack,
        index: usize,
        z: Option<u32>,
        region: Option<Region>,
    ) -> Result<PixelBuffer, SourceError> {
        let file = handle.file(index)?;
        let z = z.unwrap_or(0);
        if z != 0 {
            return Err(SourceError::SliceOutOfRange { index, z, depth: 1 });
        }

        let luma = image::open(file)
            .map_err(|e| open_error(file, e))?
            .to_luma32f();
        let (width, height) = luma.dimensions();
        let data = Array2::from_shape_vec((height as usize, width as usize), luma.into_raw())
            .map_err(|e| open_error(file, e))?;
        let pixels = PixelBuffer::new(data);

        match region {
            None => Ok(pixels),
            Some(region) if region.fits_within(width, height) => Ok(pixels.crop(region)),
            Some(region) => Err(SourceError::RegionOutOfBounds {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                slice_width: width,
                slice_height: height,
            }),
        }
    }
}
