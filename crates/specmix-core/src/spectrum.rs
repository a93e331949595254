//! Forward and inverse 2-D discrete Fourier transforms.
//!
//! A [`ComplexSpectrum`] is stored *centered*: the zero-frequency term
//! sits at `(width / 2, height / 2)`, as after a conventional
//! `fftshift`. Region masks are defined relative to that center, and
//! [`inverse`] undoes the shift before transforming back.
//!
//! The 2-D transform is separable: a 1-D FFT over every row followed by
//! a 1-D FFT over every column, both planned by `rustfft`. The inverse
//! is normalized by `1 / (width * height)` so that
//! `inverse(forward(x)) == x` up to floating-point error.

use rustfft::num_complex::Complex;
use rustfft::{FftDirection, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, GrayImage};

/// Largest valid output sample.
const MAX_SAMPLE: f64 = 255.0;

/// A 2-D array of complex Fourier coefficients, row-major and centered.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexSpectrum {
    dimensions: Dimensions,
    data: Vec<Complex<f64>>,
}

impl ComplexSpectrum {
    /// Wrap raw centered coefficients.
    ///
    /// Returns `None` if `data.len()` does not equal
    /// `dimensions.pixel_count()`.
    #[must_use]
    pub fn from_raw(dimensions: Dimensions, data: Vec<Complex<f64>>) -> Option<Self> {
        (data.len() == dimensions.pixel_count()).then_some(Self { dimensions, data })
    }

    /// A spectrum of all zeros.
    #[must_use]
    pub fn zeros(dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            data: vec![Complex::new(0.0, 0.0); dimensions.pixel_count()],
        }
    }

    /// Spectrum dimensions (equal to the source image's).
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Position of the zero-frequency coefficient.
    #[must_use]
    pub const fn center(&self) -> (u32, u32) {
        (self.dimensions.width / 2, self.dimensions.height / 2)
    }

    /// Coefficient at `(x, y)` in centered coordinates.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<Complex<f64>> {
        if x >= self.dimensions.width || y >= self.dimensions.height {
            return None;
        }
        self.data
            .get(y as usize * self.dimensions.width as usize + x as usize)
            .copied()
    }

    /// All coefficients, row-major.
    #[must_use]
    pub fn as_slice(&self) -> &[Complex<f64>] {
        &self.data
    }

    /// Mutable access to all coefficients, row-major.
    pub fn as_mut_slice(&mut self) -> &mut [Complex<f64>] {
        &mut self.data
    }
}

/// How the real part of an inverse transform is mapped to samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputScaling {
    /// Round and clip to `0..=255`. Preserves absolute intensities, so an
    /// unmodified spectrum reproduces its source exactly.
    #[default]
    Clip,
    /// Min-max stretch the real part to `0..=255`. Makes low-energy mixes
    /// visible at the cost of absolute intensity.
    Normalize,
}

/// Forward 2-D transform of a grayscale image.
///
/// Deterministic: the same image always yields the same spectrum.
#[must_use]
pub fn forward(image: &GrayImage) -> ComplexSpectrum {
    let dimensions = Dimensions::of(image);
    let mut buffer: Vec<Complex<f64>> = image
        .as_raw()
        .iter()
        .map(|&sample| Complex::new(f64::from(sample), 0.0))
        .collect();

    fft_2d(&mut buffer, dimensions, FftDirection::Forward);

    ComplexSpectrum {
        dimensions,
        data: shift(&buffer, dimensions, Shift::Center),
    }
}

/// Inverse 2-D transform back to a grayscale image.
///
/// The imaginary residue left by numerical error is discarded; the real
/// part is mapped to samples according to `scaling`.
#[must_use]
pub fn inverse(spectrum: &ComplexSpectrum, scaling: OutputScaling) -> GrayImage {
    let dimensions = spectrum.dimensions;
    let mut buffer = shift(&spectrum.data, dimensions, Shift::Uncenter);

    fft_2d(&mut buffer, dimensions, FftDirection::Inverse);

    #[allow(clippy::cast_precision_loss)]
    let norm = 1.0 / dimensions.pixel_count() as f64;
    let real: Vec<f64> = buffer.iter().map(|c| c.re * norm).collect();

    let samples = match scaling {
        OutputScaling::Clip => real.iter().map(|&v| to_sample(v)).collect(),
        OutputScaling::Normalize => {
            let (min, max) = min_max(&real);
            let range = max - min;
            real.iter()
                .map(|&v| {
                    if range > f64::EPSILON {
                        to_sample((v - min) / range * MAX_SAMPLE)
                    } else {
                        0
                    }
                })
                .collect()
        }
    };

    // Length always matches: one sample per coefficient.
    GrayImage::from_raw(dimensions.width, dimensions.height, samples)
        .unwrap_or_else(|| GrayImage::new(dimensions.width, dimensions.height))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_sample(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, MAX_SAMPLE) as u8
}

/// Minimum and maximum of a slice of finite values.
pub(crate) fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| {
            Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))))
        })
        .unwrap_or((0.0, 0.0))
}

/// In-place separable 2-D FFT (unnormalized).
fn fft_2d(buffer: &mut [Complex<f64>], dimensions: Dimensions, direction: FftDirection) {
    let width = dimensions.width as usize;
    let height = dimensions.height as usize;
    if width == 0 || height == 0 {
        return;
    }

    let mut planner = FftPlanner::<f64>::new();

    let row_fft = planner.plan_fft(width, direction);
    for row in buffer.chunks_exact_mut(width) {
        row_fft.process(row);
    }

    let col_fft = planner.plan_fft(height, direction);
    let mut column = vec![Complex::new(0.0, 0.0); height];
    for x in 0..width {
        for (y, value) in column.iter_mut().enumerate() {
            *value = buffer[y * width + x];
        }
        col_fft.process(&mut column);
        for (y, value) in column.iter().enumerate() {
            buffer[y * width + x] = *value;
        }
    }
}

#[derive(Clone, Copy)]
enum Shift {
    /// Move the zero-frequency term from `(0, 0)` to the center.
    Center,
    /// Move it back from the center to `(0, 0)`.
    Uncenter,
}

/// Circularly shift quadrants (`fftshift` / `ifftshift`).
///
/// For odd sizes the two directions differ by one sample, so each is an
/// exact inverse of the other.
fn shift(input: &[Complex<f64>], dimensions: Dimensions, direction: Shift) -> Vec<Complex<f64>> {
    let width = dimensions.width as usize;
    let height = dimensions.height as usize;
    let (dx, dy) = match direction {
        Shift::Center => (width / 2, height / 2),
        Shift::Uncenter => (width - width / 2, height - height / 2),
    };

    let mut out = vec![Complex::new(0.0, 0.0); input.len()];
    for (y, row) in input.chunks_exact(width.max(1)).enumerate() {
        let ty = (y + dy) % height;
        for (x, value) in row.iter().enumerate() {
            out[ty * width + (x + dx) % width] = *value;
        }
    }
    out
}
