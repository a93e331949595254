//! specmix-core: Frequency-domain image mixing engine (sans-IO).
//!
//! Up to four grayscale images are transformed to the Fourier domain and
//! recombined into an output image through:
//! grayscale -> unified resize -> forward FFT -> region mask ->
//! weighted component accumulation -> inverse FFT.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! pixel buffers and returns images. Decoding, encoding and the user
//! interface live in front-ends such as `specmix-cli`.
//!
//! The usual flow is:
//!
//! 1. Load raw pixels into an [`ImageBank`], which unifies sizes and
//!    caches one spectrum per slot.
//! 2. Describe a mix with a [`MixSpec`].
//! 3. Submit it with the bank's spectra to a [`JobController`], which
//!    runs it in the background and publishes the result per output
//!    slot, or call [`mix`] directly.

pub mod adjust;
pub mod bank;
pub mod component;
pub mod diagnostics;
pub mod grayscale;
pub mod job;
pub mod mixer;
pub mod region;
pub mod resize;
pub mod spectrum;
pub mod types;

pub use adjust::BrightnessContrast;
pub use bank::{EngineConfig, ImageBank, SpectrumCache};
pub use component::{ComponentFamily, ComponentKind, ComponentView, VisualizeOptions};
pub use diagnostics::{Clock, MixDiagnostics, WebClock};
pub use grayscale::RawPixels;
pub use job::{CancelToken, JobContext, JobController, JobEvent, JobHandle, JobOutput, JobStatus};
pub use mixer::{MixControl, MixSpec, SlotMix, SlotWeights, SpectrumSet, Unsupervised};
pub use region::{Rect, RegionExtent, RegionMaskSpec, RegionMode};
pub use resize::ResizeFilter;
pub use spectrum::{ComplexSpectrum, OutputScaling};
pub use types::{Dimensions, GrayImage, InputSlot, MixError, OutputSlot};

/// Mix the bank's current spectra on the calling thread.
///
/// Convenience for callers that do not need cancellation or progress;
/// interactive front-ends should go through [`JobController`] instead.
///
/// # Errors
///
/// See [`mixer::mix_with_diagnostics`].
pub fn mix(bank: &ImageBank, spec: &MixSpec) -> Result<GrayImage, MixError> {
    mixer::mix(spec, &bank.spectra(), &Unsupervised)
}
