//! Shared types for the specmix mixing engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference
/// grayscale raster data without depending on `image` directly.
pub use image::GrayImage;

/// Number of input image slots.
pub const INPUT_SLOTS: usize = 4;

/// Number of output image slots.
pub const OUTPUT_SLOTS: usize = 2;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new set of dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of a grayscale image.
    #[must_use]
    pub fn of(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total number of samples (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One of the four input image slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputSlot {
    One,
    Two,
    Three,
    Four,
}

impl InputSlot {
    /// All input slots in index order.
    pub const ALL: [Self; INPUT_SLOTS] = [Self::One, Self::Two, Self::Three, Self::Four];

    /// Zero-based index of this slot.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
            Self::Three => 2,
            Self::Four => 3,
        }
    }

    /// Slot for a zero-based index, if in range.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::One),
            1 => Some(Self::Two),
            2 => Some(Self::Three),
            3 => Some(Self::Four),
            _ => None,
        }
    }
}

impl fmt::Display for InputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input {}", self.index() + 1)
    }
}

/// One of the two output image slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputSlot {
    One,
    Two,
}

impl OutputSlot {
    /// All output slots in index order.
    pub const ALL: [Self; OUTPUT_SLOTS] = [Self::One, Self::Two];

    /// Zero-based index of this slot.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
        }
    }
}

impl fmt::Display for OutputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output {}", self.index() + 1)
    }
}

/// Errors that can occur while loading, transforming, or mixing images.
///
/// Serializable so a front-end running the engine out of process (or
/// the CLI in `--json` mode) can report failures verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum MixError {
    /// The raw pixel buffer has a channel layout we cannot interpret.
    #[error("unsupported pixel format: {channels} channels per pixel")]
    UnsupportedFormat {
        /// Channel count reported by the caller.
        channels: u8,
    },

    /// The raw pixel buffer length does not match its declared shape.
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize {
        /// `width * height * channels`.
        expected: usize,
        /// Length of the supplied buffer.
        actual: usize,
    },

    /// The image has zero width or height.
    #[error("image has no pixels")]
    EmptyImage,

    /// Spectra taking part in one mix have different dimensions.
    ///
    /// Unreachable while every slot goes through
    /// [`ImageBank`](crate::bank::ImageBank), which unifies sizes.
    #[error("spectrum dimensions {found} do not match {expected}")]
    DimensionMismatch {
        /// Dimensions of the first spectrum in the mix.
        expected: Dimensions,
        /// Dimensions of the offending spectrum.
        found: Dimensions,
    },

    /// The mix request is malformed (weight out of range, component
    /// outside the active family, ...).
    #[error("invalid mix specification: {0}")]
    InvalidSpec(String),

    /// No input slot holds an image.
    #[error("no input images loaded")]
    NoImages,

    /// The job was cancelled before it finished.
    #[error("mix cancelled")]
    Cancelled,

    /// The background worker thread could not be started.
    #[error("failed to start mix worker: {0}")]
    Spawn(String),
}
