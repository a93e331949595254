//! Centered rectangular frequency masks.
//!
//! A mask keeps either the low frequencies (inside a rectangle centered
//! on the zero-frequency term) or the high frequencies (everything
//! outside it). The mask is purely positional: it zeroes whole complex
//! coefficients, so it acts identically whichever component a slot
//! contributes.
//!
//! Out-of-range sizes are clamped to the spectrum rather than rejected,
//! keeping interactive sliders forgiving.

use std::borrow::Cow;

use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::spectrum::ComplexSpectrum;
use crate::types::Dimensions;

/// Which side of the rectangle is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionMode {
    /// No masking: the spectrum passes through unchanged.
    #[default]
    None,
    /// Keep coefficients inside the rectangle (low-pass).
    Inner,
    /// Keep coefficients outside the rectangle (high-pass).
    Outer,
}

/// Extent of the centered rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RegionExtent {
    /// Fraction of each dimension, `0.0..=1.0`.
    Fraction(f64),
    /// Side length of a square, in coefficients.
    Pixels(u32),
}

impl Default for RegionExtent {
    fn default() -> Self {
        Self::Fraction(0.5)
    }
}

/// An axis-aligned rectangle in spectrum coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge (inclusive).
    pub x: u32,
    /// Top edge (inclusive).
    pub y: u32,
    /// Width in coefficients.
    pub width: u32,
    /// Height in coefficients.
    pub height: u32,
}

impl Rect {
    /// Returns `true` if `(x, y)` lies inside the rectangle.
    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Mode and size of a region mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionMaskSpec {
    /// Which side of the rectangle is kept.
    pub mode: RegionMode,
    /// Rectangle size.
    pub extent: RegionExtent,
}

impl RegionMaskSpec {
    /// No masking.
    pub const NONE: Self = Self {
        mode: RegionMode::None,
        extent: RegionExtent::Fraction(0.5),
    };

    /// Keep the inside of a rectangle of the given extent.
    #[must_use]
    pub const fn inner(extent: RegionExtent) -> Self {
        Self {
            mode: RegionMode::Inner,
            extent,
        }
    }

    /// Keep the outside of a rectangle of the given extent.
    #[must_use]
    pub const fn outer(extent: RegionExtent) -> Self {
        Self {
            mode: RegionMode::Outer,
            extent,
        }
    }

    /// The centered rectangle for a spectrum of the given dimensions,
    /// clamped to fit. `None` when the mode is [`RegionMode::None`].
    ///
    /// Front-ends use this to draw the selector over the FT display.
    #[must_use]
    pub fn rect(&self, dimensions: Dimensions) -> Option<Rect> {
        if self.mode == RegionMode::None {
            return None;
        }
        let (width, height) = match self.extent {
            RegionExtent::Fraction(fraction) => {
                let clamped = if fraction.is_nan() {
                    0.0
                } else {
                    fraction.clamp(0.0, 1.0)
                };
                if !(0.0..=1.0).contains(&fraction) {
                    tracing::warn!(fraction, clamped, "region mask fraction clamped");
                }
                (
                    scale_axis(dimensions.width, clamped),
                    scale_axis(dimensions.height, clamped),
                )
            }
            RegionExtent::Pixels(side) => {
                if side > dimensions.width || side > dimensions.height {
                    tracing::warn!(side, %dimensions, "region mask size clamped");
                }
                (side.min(dimensions.width), side.min(dimensions.height))
            }
        };
        Some(Rect {
            x: centered_origin(dimensions.width, width),
            y: centered_origin(dimensions.height, height),
            width,
            height,
        })
    }
}

/// Start of a span of `extent` coefficients around the zero-frequency
/// index `length / 2`, kept inside `0..length`.
const fn centered_origin(length: u32, extent: u32) -> u32 {
    let start = (length / 2).saturating_sub(extent / 2);
    let last_fit = length - extent;
    if start < last_fit { start } else { last_fit }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_axis(length: u32, fraction: f64) -> u32 {
    let scaled = (f64::from(length) * fraction).round() as u32;
    scaled.min(length)
}

/// Apply a region mask to a centered spectrum.
///
/// [`RegionMode::None`] borrows the input unchanged. `Inner` zeroes every
/// coefficient outside the rectangle, `Outer` every coefficient inside
/// it, so for the same extent the two results sum to the original.
#[must_use]
pub fn apply<'a>(spectrum: &'a ComplexSpectrum, spec: &RegionMaskSpec) -> Cow<'a, ComplexSpectrum> {
    let Some(rect) = spec.rect(spectrum.dimensions()) else {
        return Cow::Borrowed(spectrum);
    };
    let keep_inside = spec.mode == RegionMode::Inner;
    let width = spectrum.dimensions().width as usize;

    let mut masked = spectrum.clone();
    for (y, row) in masked.as_mut_slice().chunks_exact_mut(width.max(1)).enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let y = y as u32;
        for (x, value) in row.iter_mut().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let inside = rect.contains(x as u32, y);
            if inside != keep_inside {
                *value = Complex::new(0.0, 0.0);
            }
        }
    }
    Cow::Owned(masked)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::spectrum;
    use crate::types::GrayImage;

    fn test_spectrum(w: u32, h: u32) -> ComplexSpectrum {
        let image = GrayImage::from_fn(w, h, |x, y| {
            image::Luma([u8::try_from((x * 31 + y * 17 + x * y) % 256).unwrap()])
        });
        spectrum::forward(&image)
    }

    #[test]
    fn none_borrows_input() {
        let spectrum = test_spectrum(8, 8);
        let out = apply(&spectrum, &RegionMaskSpec::NONE);
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn rect_is_centered() {
        let spec = RegionMaskSpec::inner(RegionExtent::Fraction(0.5));
        let rect = spec.rect(Dimensions::new(100, 60)).unwrap();
        assert_eq!(
            rect,
            Rect {
                x: 25,
                y: 15,
                width: 50,
                height: 30
            }
        );
        assert!(rect.contains(50, 30), "zero frequency must be inside");
    }

    #[test]
    fn odd_extent_on_even_axis_is_symmetric_about_zero_frequency() {
        let dims = Dimensions::new(10, 8);
        let (cx, cy) = (5, 4);
        for side in [1, 3, 5, 7] {
            let rect = RegionMaskSpec::inner(RegionExtent::Pixels(side)).rect(dims).unwrap();
            assert!(rect.contains(cx, cy), "{side}px: {rect:?}");
            assert_eq!(cx - rect.x, rect.x + rect.width - 1 - cx, "{side}px: {rect:?}");
            assert_eq!(cy - rect.y, rect.y + rect.height - 1 - cy, "{side}px: {rect:?}");
        }
    }

    #[test]
    fn single_coefficient_inner_mask_keeps_dc_on_even_spectrum() {
        let image = GrayImage::from_pixel(10, 10, image::Luma([90]));
        let spectrum = spectrum::forward(&image);
        let masked = apply(&spectrum, &RegionMaskSpec::inner(RegionExtent::Pixels(1)));
        let (cx, cy) = spectrum.center();
        let dc = masked.get(cx, cy).unwrap();
        assert!((dc.re - 9000.0).abs() < 1e-6, "dc {dc}");
        let kept = masked.as_slice().iter().filter(|c| c.norm() != 0.0).count();
        assert_eq!(kept, 1);
    }

    #[test]
    fn spans_clamp_to_the_axis() {
        assert_eq!(centered_origin(10, 10), 0);
        assert_eq!(centered_origin(10, 9), 1);
        assert_eq!(centered_origin(10, 0), 5);
        assert_eq!(centered_origin(11, 5), 3);
        assert_eq!(centered_origin(1, 1), 0);
    }

    #[test]
    fn pixel_extent_is_square_and_clamped() {
        let spec = RegionMaskSpec::outer(RegionExtent::Pixels(80));
        let rect = spec.rect(Dimensions::new(100, 60)).unwrap();
        assert_eq!((rect.width, rect.height), (80, 60));
        assert_eq!((rect.x, rect.y), (10, 0));
    }

    #[test]
    fn fraction_out_of_range_is_clamped() {
        let dims = Dimensions::new(10, 10);
        let rect = |fraction| {
            RegionMaskSpec::inner(RegionExtent::Fraction(fraction))
                .rect(dims)
                .unwrap()
        };
        let big = rect(3.0);
        assert_eq!((big.width, big.height), (10, 10));
        let negative = rect(-1.0);
        assert_eq!((negative.width, negative.height), (0, 0));
        let nan = rect(f64::NAN);
        assert_eq!((nan.width, nan.height), (0, 0));
    }

    #[test]
    fn inner_zeroes_outside() {
        let spectrum = test_spectrum(12, 10);
        let spec = RegionMaskSpec::inner(RegionExtent::Pixels(4));
        let rect = spec.rect(spectrum.dimensions()).unwrap();
        let masked = apply(&spectrum, &spec);
        for y in 0..10 {
            for x in 0..12 {
                let value = masked.get(x, y).unwrap();
                if rect.contains(x, y) {
                    assert_eq!(value, spectrum.get(x, y).unwrap());
                } else {
                    assert_eq!(value, Complex::new(0.0, 0.0));
                }
            }
        }
    }

    #[test]
    fn inner_and_outer_are_exact_complements() {
        for extent in [
            RegionExtent::Fraction(0.3),
            RegionExtent::Fraction(1.0),
            RegionExtent::Pixels(5),
            RegionExtent::Pixels(0),
        ] {
            let spectrum = test_spectrum(11, 9);
            let inner = apply(&spectrum, &RegionMaskSpec::inner(extent));
            let outer = apply(&spectrum, &RegionMaskSpec::outer(extent));
            for ((a, b), original) in inner
                .as_slice()
                .iter()
                .zip(outer.as_slice())
                .zip(spectrum.as_slice())
            {
                assert_eq!(a + b, *original, "extent {extent:?}");
            }
        }
    }

    #[test]
    fn full_outer_mask_zeroes_everything() {
        let spectrum = test_spectrum(6, 6);
        let masked = apply(&spectrum, &RegionMaskSpec::outer(RegionExtent::Fraction(1.0)));
        assert!(masked.as_slice().iter().all(|c| c.norm() == 0.0));
    }
}
