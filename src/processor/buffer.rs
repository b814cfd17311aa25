//! Floating-point pixel buffers and the basic operations on them.
//!
//! Buffers use ndarray matrix indexing: `data[[y, x]]` with shape
//! `(height, width)`.

use ndarray::{s, Array2};

/// Rectangle in slice pixel coordinates, anchored at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Square region of `size` pixels at `(x, y)`.
    pub fn square(x: u32, y: u32, size: u32) -> Self {
        Self::new(x, y, size, size)
    }

    /// Whether the region lies inside a `width × height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }
}

/// Summary statistics of a buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelStats {
    pub mean: f32,
    /// Population standard deviation
    pub sigma: f32,
    pub min: f32,
    pub max: f32,
}

impl PixelStats {
    /// Display range `mean ± k·sigma`.
    pub fn sigma_range(&self, k: f32) -> (f32, f32) {
        (self.mean - k * self.sigma, self.mean + k * self.sigma)
    }
}

/// A single-channel image with optional rendering hints.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    data: Array2<f32>,

    /// Values mapped to black and white when encoding
    render_range: Option<(f32, f32)>,
}

impl PixelBuffer {
    pub fn new(data: Array2<f32>) -> Self {
        Self {
            data,
            render_range: None,
        }
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self::new(Array2::from_elem((height as usize, width as usize), value))
    }

    /// Build a buffer by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        Self::new(Array2::from_shape_fn(
            (height as usize, width as usize),
            |(y, x)| f(x as u32, y as u32),
        ))
    }

    pub fn width(&self) -> u32 {
        self.data.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.data.nrows() as u32
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<f32> {
        &mut self.data
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[[y as usize, x as usize]]
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        self.data[[y as usize, x as usize]] = value;
    }

    pub fn render_range(&self) -> Option<(f32, f32)> {
        self.render_range
    }

    pub fn set_render_range(&mut self, min: f32, max: f32) {
        self.render_range = Some((min, max));
    }

    pub fn with_render_range(mut self, min: f32, max: f32) -> Self {
        self.set_render_range(min, max);
        self
    }

    /// Add another buffer of the same shape pixel by pixel.
    pub fn accumulate(&mut self, other: &PixelBuffer) {
        self.data += &other.data;
    }

    /// Copy of the pixels inside `region`, which must fit within the buffer.
    pub fn crop(&self, region: Region) -> PixelBuffer {
        let (x, y) = (region.x as usize, region.y as usize);
        let view = self.data.slice(s![
            y..y + region.height as usize,
            x..x + region.width as usize
        ]);
        PixelBuffer::new(view.to_owned())
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Mean, standard deviation and extrema, accumulated in `f64`.
pub fn stats(buffer: &PixelBuffer) -> PixelStats {
    let n = buffer.data.len();
    if n == 0 {
        return PixelStats {
            mean: 0.0,
            sigma: 0.0,
            min: 0.0,
            max: 0.0,
        };
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in buffer.data.iter() {
        let v64 = f64::from(v);
        sum += v64;
        sum_sq += v64 * v64;
        min = min.min(v);
        max = max.max(v);
    }

    let mean = sum / n as f64;
    let variance = (sum_sq / n as f64 - mean * mean).max(0.0);
    PixelStats {
        mean: mean as f32,
        sigma: variance.sqrt() as f32,
        min,
        max,
    }
}

/// Shift to zero mean and scale to unit standard deviation.
///
/// A constant buffer is only shifted.
pub fn normalize(buffer: &mut PixelBuffer) {
    let PixelStats { mean, sigma, .. } = stats(buffer);
    if sigma > 0.0 {
        buffer.data.mapv_inplace(|v| (v - mean) / sigma);
    } else {
        buffer.data.mapv_inplace(|v| v - mean);
    }
}

/// Average non-overlapping `factor × factor` blocks.
///
/// Output dimensions are the input dimensions divided by `factor`, rounded
/// down, but never below one pixel. Trailing rows and columns that do not
/// fill a whole block are dropped unless they are all there is.
pub fn mean_shrink(buffer: &PixelBuffer, factor: u32) -> PixelBuffer {
    if factor <= 1 {
        return PixelBuffer::new(buffer.data.clone());
    }

    let (width, height) = buffer.dimensions();
    let out_width = (width / factor).max(1);
    let out_height = (height / factor).max(1);
    let n = factor as usize;

    let data = Array2::from_shape_fn((out_height as usize, out_width as usize), |(oy, ox)| {
        let y0 = oy * n;
        let x0 = ox * n;
        let y1 = (y0 + n).min(height as usize);
        let x1 = (x0 + n).min(width as usize);
        let block = buffer.data.slice(s![y0..y1, x0..x1]);
        block.mean().unwrap_or(0.0)
    });

    PixelBuffer::new(data)
}

/// Copy `region` out of the buffer, filling pixels past the edge with `fill`.
pub fn clip_with_fill(buffer: &PixelBuffer, region: Region, fill: f32) -> PixelBuffer {
    let mut out = PixelBuffer::filled(region.width, region.height, fill);
    let (width, height) = buffer.dimensions();

    if region.x >= width || region.y >= height {
        return out;
    }

    let copy_w = (width - region.x).min(region.width) as usize;
    let copy_h = (height - region.y).min(region.height) as usize;
    let (x, y) = (region.x as usize, region.y as usize);

    out.data
        .slice_mut(s![0..copy_h, 0..copy_w])
        .assign(&buffer.data.slice(s![y..y + copy_h, x..x + copy_w]));
    out
}
