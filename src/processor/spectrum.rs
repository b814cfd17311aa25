//! Power spectrum and radial profile.
//!
//! The 2D transform runs `rustfft` over the rows, then over the columns.

use ndarray::Array2;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use super::buffer::PixelBuffer;

/// Squared magnitude of the 2D Fourier transform with the zero frequency
/// moved to `(width / 2, height / 2)`.
pub fn power_spectrum(buffer: &PixelBuffer) -> PixelBuffer {
    let (width, height) = (buffer.width() as usize, buffer.height() as usize);
    if width == 0 || height == 0 {
        return buffer.clone();
    }

    let mut planner = FftPlanner::<f64>::new();
    let row_fft = planner.plan_fft_forward(width);
    let column_fft = planner.plan_fft_forward(height);

    let mut grid: Vec<Complex<f64>> = buffer
        .data()
        .iter()
        .map(|&v| Complex::new(f64::from(v), 0.0))
        .collect();

    // One call transforms every row: the buffer is a run of width-long chunks
    row_fft.process(&mut grid);

    let mut column = vec![Complex::default(); height];
    for x in 0..width {
        for (y, value) in column.iter_mut().enumerate() {
            *value = grid[y * width + x];
        }
        column_fft.process(&mut column);
        for (y, value) in column.iter().enumerate() {
            grid[y * width + x] = *value;
        }
    }

    let (shift_x, shift_y) = (width - width / 2, height - height / 2);
    let data = Array2::from_shape_fn((height, width), |(y, x)| {
        let src_y = (y + shift_y) % height;
        let src_x = (x + shift_x) % width;
        grid[src_y * width + src_x].norm_sqr() as f32
    });

    PixelBuffer::new(data)
}

/// Mean value on rings of radius `1..=max_radius` around
/// `(width / 2, height / 2)`.
///
/// Entry `i` averages the pixels whose distance from the center rounds to
/// `i + 1`. The center pixel itself is left out. Rings without pixels
/// report zero.
pub fn radial_average(buffer: &PixelBuffer, max_radius: usize) -> Vec<f32> {
    let mut sums = vec![0.0f64; max_radius];
    let mut counts = vec![0u64; max_radius];
    let cx = f64::from(buffer.width() / 2);
    let cy = f64::from(buffer.height() / 2);

    for ((y, x), &v) in buffer.data().indexed_iter() {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let r = (dx * dx + dy * dy).sqrt().round() as usize;
        if (1..=max_radius).contains(&r) {
            sums[r - 1] += f64::from(v);
            counts[r - 1] += 1;
        }
    }

    sums.iter()
        .zip(&counts)
        .map(|(&sum, &count)| {
            if count == 0 {
                0.0
            } else {
                (sum / count as f64) as f32
            }
        })
        .collect()
}
