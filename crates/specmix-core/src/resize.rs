//! Unified resizing of all loaded input images.
//!
//! Fourier spectra are only comparable when they share dimensions, so
//! every loaded slot is resampled to a common size: the minimum width
//! and the minimum height across the currently loaded images.
//!
//! Images already at the common size are returned untouched (no
//! resampling round trip), so their samples stay bit-exact.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, GrayImage, INPUT_SLOTS};

/// Resampling filter used when resizing to the common size.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResizeFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

/// The common size of a set of slots: `(min(widths), min(heights))`.
///
/// Width and height minima are taken independently, so the result may
/// not match any single input. Returns `None` when no slot is loaded.
#[must_use]
pub fn common_dimensions<'a, I>(images: I) -> Option<Dimensions>
where
    I: IntoIterator<Item = Option<&'a GrayImage>>,
{
    images
        .into_iter()
        .flatten()
        .map(Dimensions::of)
        .reduce(|a, b| Dimensions::new(a.width.min(b.width), a.height.min(b.height)))
}

/// Resize a single image to exactly `target`.
///
/// Returns a clone when the image already has the target size.
#[must_use]
pub fn resize_to(image: &GrayImage, target: Dimensions, filter: ResizeFilter) -> GrayImage {
    if Dimensions::of(image) == target {
        return image.clone();
    }
    image::imageops::resize(
        image,
        target.width,
        target.height,
        filter.to_image_filter(),
    )
}

/// Resize every loaded slot to the common size of all loaded slots.
///
/// Empty slots stay empty. Returns the resized slots and the common
/// size (`None` when nothing is loaded).
#[must_use]
pub fn unify_size(
    images: &[Option<GrayImage>; INPUT_SLOTS],
    filter: ResizeFilter,
) -> ([Option<GrayImage>; INPUT_SLOTS], Option<Dimensions>) {
    let Some(target) = common_dimensions(images.iter().map(Option::as_ref)) else {
        return (Default::default(), None);
    };
    let resized = std::array::from_fn(|i| {
        images[i]
            .as_ref()
            .map(|image| resize_to(image, target, filter))
    });
    (resized, Some(target))
}
