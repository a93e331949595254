//! Non-destructive brightness/contrast remapping.
//!
//! The displayed image of a slot is always re-derived from the stored
//! original samples:
//!
//! ```text
//! out = clip(round(original * gain + offset), 0, 255)
//! ```
//!
//! Because nothing is accumulated into the pixels themselves, any
//! number of adjustments followed by [`BrightnessContrast::reset`]
//! reproduces the original bit for bit.
//!
//! These adjustments affect only what the user sees. Spectra are always
//! computed from the unadjusted image.

use serde::{Deserialize, Serialize};

use crate::types::GrayImage;

/// Contrast gain added per horizontal pixel of drag.
pub const CONTRAST_PER_PIXEL: f64 = 0.01;

/// Brightness offset added per vertical pixel of drag.
pub const BRIGHTNESS_PER_PIXEL: f64 = 1.0;

/// Per-slot brightness offset and contrast gain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrightnessContrast {
    /// Added to every sample after scaling.
    pub brightness: f64,
    /// Multiplies every sample. Never negative.
    pub contrast: f64,
}

impl BrightnessContrast {
    /// Neutral adjustment: offset 0, gain 1.
    pub const NEUTRAL: Self = Self {
        brightness: 0.0,
        contrast: 1.0,
    };

    /// Create an adjustment, clamping a negative gain to zero.
    #[must_use]
    pub const fn new(brightness: f64, contrast: f64) -> Self {
        Self {
            brightness,
            contrast: contrast.max(0.0),
        }
    }

    /// Returns `true` if this adjustment leaves samples unchanged.
    #[must_use]
    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }

    /// Apply a drag gesture delta.
    ///
    /// Horizontal movement changes contrast, vertical movement changes
    /// brightness. Gain is clamped so it never goes negative.
    pub fn nudge(&mut self, dx: f64, dy: f64) {
        self.brightness += dy * BRIGHTNESS_PER_PIXEL;
        let contrast = dx.mul_add(CONTRAST_PER_PIXEL, self.contrast);
        if contrast < 0.0 {
            tracing::warn!(contrast, "negative contrast gain clamped to 0");
        }
        self.contrast = contrast.max(0.0);
    }

    /// Return to the neutral adjustment.
    pub const fn reset(&mut self) {
        *self = Self::NEUTRAL;
    }

    /// Remap one sample.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn remap(&self, sample: u8) -> u8 {
        let value = f64::from(sample)
            .mul_add(self.contrast, self.brightness)
            .round()
            .clamp(0.0, 255.0);
        value as u8
    }
}

impl Default for BrightnessContrast {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Derive the displayed image from the stored original.
///
/// A pure function of `original` and `adjustment`: calling it twice with
/// the same arguments yields identical output, and the neutral
/// adjustment returns an exact copy.
#[must_use]
pub fn apply_brightness_contrast(
    original: &GrayImage,
    adjustment: BrightnessContrast,
) -> GrayImage {
    if adjustment.is_neutral() {
        return original.clone();
    }
    let mut out = original.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = adjustment.remap(pixel.0[0]);
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ramp() -> GrayImage {
        GrayImage::from_fn(16, 16, |x, y| image::Luma([u8::try_from(x + y * 16).unwrap()]))
    }

    #[test]
    fn neutral_is_identity() {
        let original = ramp();
        let out = apply_brightness_contrast(&original, BrightnessContrast::NEUTRAL);
        assert_eq!(out.as_raw(), original.as_raw());
    }

    #[test]
    fn brightness_offsets_and_clips() {
        let original = ramp();
        let out = apply_brightness_contrast(&original, BrightnessContrast::new(100.0, 1.0));
        assert_eq!(out.get_pixel(0, 0).0[0], 100);
        assert_eq!(out.get_pixel(15, 15).0[0], 255);
    }

    #[test]
    fn contrast_scales_around_zero() {
        let original = ramp();
        let out = apply_brightness_contrast(&original, BrightnessContrast::new(0.0, 0.5));
        assert_eq!(out.get_pixel(10, 0).0[0], 5);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn negative_result_clips_to_zero() {
        let original = ramp();
        let out = apply_brightness_contrast(&original, BrightnessContrast::new(-300.0, 1.0));
        assert!(out.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn negative_gain_is_clamped() {
        assert!((BrightnessContrast::new(0.0, -2.0).contrast).abs() < f64::EPSILON);
        let mut bc = BrightnessContrast::NEUTRAL;
        bc.nudge(-500.0, 0.0);
        assert!(bc.contrast.abs() < f64::EPSILON);
    }

    #[test]
    fn nudge_maps_drag_axes() {
        let mut bc = BrightnessContrast::NEUTRAL;
        bc.nudge(20.0, -15.0);
        assert!((bc.brightness + 15.0).abs() < 1e-12);
        assert!((bc.contrast - 1.2).abs() < 1e-12);
    }

    #[test]
    fn reset_after_many_nudges_restores_original() {
        let original = ramp();
        let mut bc = BrightnessContrast::NEUTRAL;
        for i in 0..50 {
            bc.nudge(f64::from(i % 7) - 3.0, f64::from(i % 5) - 2.0);
            let _ = apply_brightness_contrast(&original, bc);
        }
        bc.reset();
        assert!(bc.is_neutral());
        let out = apply_brightness_contrast(&original, bc);
        assert_eq!(out.as_raw(), original.as_raw());
    }

    #[test]
    fn application_is_idempotent_on_the_original() {
        let original = ramp();
        let bc = BrightnessContrast::new(12.0, 1.3);
        let first = apply_brightness_contrast(&original, bc);
        let second = apply_brightness_contrast(&original, bc);
        assert_eq!(first.as_raw(), second.as_raw());
    }
}
