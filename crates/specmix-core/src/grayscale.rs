//! Raw pixel ingestion and grayscale conversion.
//!
//! The image I/O collaborator hands us an interleaved 8-bit pixel
//! buffer with an arbitrary channel count. This module turns it into a
//! single-channel [`GrayImage`] suitable for the Fourier pipeline.
//!
//! This is the first step of every slot load: raw buffer in,
//! `GrayImage` out.

use image::{DynamicImage, GrayAlphaImage, RgbImage, RgbaImage};

use crate::types::{GrayImage, MixError};

/// An interleaved 8-bit pixel buffer as delivered by a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPixels {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Channels per pixel: 1 (gray), 2 (gray+alpha), 3 (RGB) or 4 (RGBA).
    pub channels: u8,
    /// Row-major interleaved samples.
    pub data: Vec<u8>,
}

impl RawPixels {
    /// Create a new raw pixel buffer.
    #[must_use]
    pub const fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * usize::from(self.channels)
    }
}

/// Convert a raw pixel buffer to grayscale.
///
/// Color input is reduced with the `image` crate's fixed luma weighting
/// (Rec. 709 coefficients); alpha is dropped. Single-channel input is
/// taken as-is, so original sample values survive bit for bit.
///
/// # Errors
///
/// Returns [`MixError::UnsupportedFormat`] for channel counts other than
/// 1-4, [`MixError::EmptyImage`] when either axis is zero, and
/// [`MixError::BufferSize`] when `data` does not match the declared shape.
#[must_use = "returns the grayscale image"]
pub fn load(raw: RawPixels) -> Result<GrayImage, MixError> {
    if !(1..=4).contains(&raw.channels) {
        return Err(MixError::UnsupportedFormat {
            channels: raw.channels,
        });
    }
    if raw.width == 0 || raw.height == 0 {
        return Err(MixError::EmptyImage);
    }
    let expected = raw.expected_len();
    if raw.data.len() != expected {
        return Err(MixError::BufferSize {
            expected,
            actual: raw.data.len(),
        });
    }

    let RawPixels {
        width,
        height,
        channels,
        data,
    } = raw;
    let size_error = MixError::BufferSize {
        expected,
        actual: expected,
    };

    let dynamic = match channels {
        1 => {
            return GrayImage::from_raw(width, height, data).ok_or(size_error);
        }
        2 => GrayAlphaImage::from_raw(width, height, data).map(DynamicImage::ImageLumaA8),
        3 => RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
        _ => RgbaImage::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
    }
    .ok_or(size_error)?;

    Ok(dynamic.to_luma8())
}
