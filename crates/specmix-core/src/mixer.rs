//! Weighted, region-masked recombination of spectra.
//!
//! A [`MixSpec`] describes one request: for each input slot, how much of
//! each component to take and which region of the spectrum to keep;
//! plus the active [`ComponentFamily`] and the target output slot.
//!
//! Per coefficient, two real accumulators are built up across the four
//! slots:
//!
//! ```text
//! A += w_primary(i)   * primary(S_i)      (magnitude or real part)
//! B += w_secondary(i) * secondary(S_i)    (phase or imaginary part)
//! ```
//!
//! and recombined as `A * exp(iB)` (magnitude/phase) or `A + iB`
//! (real/imaginary) before a single inverse transform.
//!
//! Every slot is visited in order even at weight zero, so the floating
//! point summation order never depends on the weights.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::component::{ComponentFamily, ComponentKind};
use crate::diagnostics::{Clock, MixDiagnostics, SlotDiagnostics, WebClock};
use crate::region::{self, RegionMaskSpec, RegionMode};
use crate::spectrum::{self, ComplexSpectrum, OutputScaling};
use crate::types::{Dimensions, GrayImage, INPUT_SLOTS, InputSlot, MixError, OutputSlot};

/// Spectra for all input slots, as handed to a mix.
pub type SpectrumSet = [Option<Arc<ComplexSpectrum>>; INPUT_SLOTS];

/// Rows accumulated between cancellation checks.
const ROWS_PER_CHUNK: usize = 32;

/// Progress stages: one per input slot plus the inverse transform.
const STAGES: usize = INPUT_SLOTS + 1;

/// How a slot's weights map onto the two components of the family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SlotWeights {
    /// One weight drives the single selected component; the other
    /// component of the family gets nothing from this slot.
    Shared {
        /// Selected component; must belong to the mix's family.
        component: ComponentKind,
        /// Weight in `0.0..=1.0`.
        weight: f64,
    },
    /// Independent weights for both components of the family.
    Split {
        /// Weight of the magnitude (or real part), `0.0..=1.0`.
        primary: f64,
        /// Weight of the phase (or imaginary part), `0.0..=1.0`.
        secondary: f64,
    },
}

impl SlotWeights {
    /// Resolve to `(primary, secondary)` weights for `family`.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidSpec`] if a weight is not a finite
    /// value in `0.0..=1.0`, or a shared component is outside `family`.
    pub fn resolve(&self, family: ComponentFamily) -> Result<(f64, f64), MixError> {
        let (primary, secondary) = match *self {
            Self::Shared { component, weight } => {
                if component.family() != family {
                    return Err(MixError::InvalidSpec(format!(
                        "{component} is not part of the {family} family"
                    )));
                }
                if component == family.primary() {
                    (weight, 0.0)
                } else {
                    (0.0, weight)
                }
            }
            Self::Split { primary, secondary } => (primary, secondary),
        };
        for weight in [primary, secondary] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(MixError::InvalidSpec(format!(
                    "weight {weight} outside 0..=1"
                )));
            }
        }
        Ok((primary, secondary))
    }
}

/// Contribution of one input slot to a mix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotMix {
    /// Component weights.
    pub weights: SlotWeights,
    /// Region of the spectrum this slot contributes.
    #[serde(default)]
    pub mask: RegionMaskSpec,
}

impl SlotMix {
    /// A slot that contributes nothing.
    pub const SILENT: Self = Self {
        weights: SlotWeights::Split {
            primary: 0.0,
            secondary: 0.0,
        },
        mask: RegionMaskSpec::NONE,
    };

    /// One weight on one selected component, unmasked.
    #[must_use]
    pub const fn shared(component: ComponentKind, weight: f64) -> Self {
        Self {
            weights: SlotWeights::Shared { component, weight },
            mask: RegionMaskSpec::NONE,
        }
    }

    /// Independent weights on both components, unmasked.
    #[must_use]
    pub const fn split(primary: f64, secondary: f64) -> Self {
        Self {
            weights: SlotWeights::Split { primary, secondary },
            mask: RegionMaskSpec::NONE,
        }
    }

    /// Replace the region mask.
    #[must_use]
    pub const fn with_mask(mut self, mask: RegionMaskSpec) -> Self {
        self.mask = mask;
        self
    }
}

impl Default for SlotMix {
    fn default() -> Self {
        Self::SILENT
    }
}

/// One complete, immutable mix request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixSpec {
    /// Which pair of components is mixed.
    pub family: ComponentFamily,
    /// Per-slot contributions, in slot order.
    pub slots: [SlotMix; INPUT_SLOTS],
    /// Where the result is published.
    pub output: OutputSlot,
    /// How the inverse transform is mapped back to samples.
    #[serde(default)]
    pub output_scaling: OutputScaling,
}

impl MixSpec {
    /// A request in which every slot is silent.
    #[must_use]
    pub const fn new(family: ComponentFamily, output: OutputSlot) -> Self {
        Self {
            family,
            slots: [SlotMix::SILENT; INPUT_SLOTS],
            output,
            output_scaling: OutputScaling::Clip,
        }
    }

    /// Replace one slot's contribution.
    #[must_use]
    pub const fn with_slot(mut self, slot: InputSlot, mix: SlotMix) -> Self {
        self.slots[slot.index()] = mix;
        self
    }

    /// Replace the output scaling.
    #[must_use]
    pub const fn with_scaling(mut self, scaling: OutputScaling) -> Self {
        self.output_scaling = scaling;
        self
    }

    /// Resolve every slot's weights for this spec's family.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidSpec`] for the first malformed slot.
    pub fn resolved_weights(&self) -> Result<[(f64, f64); INPUT_SLOTS], MixError> {
        let mut resolved = [(0.0, 0.0); INPUT_SLOTS];
        for (slot, (out, mix)) in InputSlot::ALL
            .iter()
            .zip(resolved.iter_mut().zip(&self.slots))
        {
            *out = mix.weights.resolve(self.family).map_err(|e| match e {
                MixError::InvalidSpec(msg) => MixError::InvalidSpec(format!("{slot}: {msg}")),
                other => other,
            })?;
        }
        Ok(resolved)
    }
}

/// Cooperative cancellation and progress reporting for a running mix.
pub trait MixControl {
    /// Polled at stage and chunk boundaries.
    fn is_cancelled(&self) -> bool {
        false
    }

    /// Called with a monotonically increasing fraction in `0.0..=1.0`.
    fn report(&self, _fraction: f64) {}
}

/// A [`MixControl`] that never cancels and ignores progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupervised;

impl MixControl for Unsupervised {}

fn checkpoint(control: &impl MixControl) -> Result<(), MixError> {
    if control.is_cancelled() {
        Err(MixError::Cancelled)
    } else {
        Ok(())
    }
}

/// Mix spectra into one output image.
///
/// # Errors
///
/// See [`mix_with_diagnostics`].
pub fn mix(
    spec: &MixSpec,
    spectra: &SpectrumSet,
    control: &impl MixControl,
) -> Result<GrayImage, MixError> {
    mix_with_diagnostics(spec, spectra, control, &WebClock).map(|(image, _)| image)
}

/// Mix spectra into one output image, timing every stage.
///
/// # Errors
///
/// - [`MixError::InvalidSpec`] if a weight or component is malformed.
/// - [`MixError::NoImages`] if no slot holds a spectrum.
/// - [`MixError::DimensionMismatch`] if loaded spectra differ in size.
/// - [`MixError::Cancelled`] if `control` reports cancellation at a
///   stage or chunk boundary.
#[allow(clippy::cast_precision_loss)]
pub fn mix_with_diagnostics<C: Clock>(
    spec: &MixSpec,
    spectra: &SpectrumSet,
    control: &impl MixControl,
    clock: &C,
) -> Result<(GrayImage, MixDiagnostics), MixError> {
    let started = clock.now();
    let weights = spec.resolved_weights()?;
    let dimensions = common_dimensions(spectra)?;

    let chunk_len = (dimensions.width as usize * ROWS_PER_CHUNK).max(1);
    let len = dimensions.pixel_count();
    let primary = spec.family.primary();
    let secondary = spec.family.secondary();
    let mut accum_a = vec![0.0_f64; len];
    let mut accum_b = vec![0.0_f64; len];
    let mut slots = Vec::with_capacity(INPUT_SLOTS);

    for (stage, slot) in InputSlot::ALL.into_iter().enumerate() {
        checkpoint(control)?;
        let stage_started = clock.now();
        let (w_primary, w_secondary) = weights[slot.index()];
        let mix = &spec.slots[slot.index()];
        let mut masked_coefficients = 0;

        if let Some(source) = &spectra[slot.index()] {
            let masked = region::apply(source, &mix.mask);
            if let Some(rect) = mix.mask.rect(dimensions) {
                let inside = rect.width as usize * rect.height as usize;
                masked_coefficients = match mix.mask.mode {
                    RegionMode::Inner => len - inside,
                    RegionMode::Outer => inside,
                    RegionMode::None => 0,
                };
            }

            let rows = masked.as_slice().chunks(chunk_len);
            let targets = accum_a
                .chunks_mut(chunk_len)
                .zip(accum_b.chunks_mut(chunk_len));
            for (chunk, (a_chunk, b_chunk)) in rows.zip(targets) {
                checkpoint(control)?;
                for ((&value, a), b) in chunk.iter().zip(a_chunk).zip(b_chunk) {
                    *a += w_primary * primary.of(value);
                    *b += w_secondary * secondary.of(value);
                }
            }
        }

        slots.push(SlotDiagnostics {
            slot,
            duration: clock.elapsed(&stage_started),
            loaded: spectra[slot.index()].is_some(),
            primary_weight: w_primary,
            secondary_weight: w_secondary,
            mask: mix.mask.mode,
            masked_coefficients,
        });
        tracing::debug!(%slot, w_primary, w_secondary, "slot accumulated");
        control.report((stage + 1) as f64 / STAGES as f64);
    }

    checkpoint(control)?;
    let inverse_started = clock.now();
    let mut combined = ComplexSpectrum::zeros(dimensions);
    for ((value, &a), &b) in combined.as_mut_slice().iter_mut().zip(&accum_a).zip(&accum_b) {
        *value = spec.family.combine(a, b);
    }
    let image = spectrum::inverse(&combined, spec.output_scaling);
    let inverse_duration = clock.elapsed(&inverse_started);
    control.report(1.0);

    let diagnostics = MixDiagnostics {
        dimensions,
        family: spec.family,
        slots,
        inverse_duration,
        total_duration: clock.elapsed(&started),
    };
    Ok((image, diagnostics))
}

/// Dimensions shared by every loaded spectrum.
fn common_dimensions(spectra: &SpectrumSet) -> Result<Dimensions, MixError> {
    let mut loaded = spectra.iter().flatten().map(|s| s.dimensions());
    let expected = loaded.next().ok_or(MixError::NoImages)?;
    if let Some(found) = loaded.find(|&d| d != expected) {
        tracing::error!(%expected, %found, "spectra with mismatched dimensions reached the mixer");
        return Err(MixError::DimensionMismatch { expected, found });
    }
    Ok(expected)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::region::RegionExtent;

    fn pattern(w: u32, h: u32, seed: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let value = (x * (7 + seed) + y * (13 + seed) + x * y * seed) % 256;
            image::Luma([u8::try_from(value).unwrap()])
        })
    }

    fn set(images: &[Option<&GrayImage>; INPUT_SLOTS]) -> SpectrumSet {
        std::array::from_fn(|i| images[i].map(|image| Arc::new(spectrum::forward(image))))
    }

    #[test]
    fn split_identity_reproduces_source() {
        let a = pattern(16, 12, 1);
        let b = pattern(16, 12, 2);
        let spectra = set(&[Some(&a), Some(&b), Some(&b), None]);
        for family in [ComponentFamily::MagnitudePhase, ComponentFamily::RealImaginary] {
            let spec = MixSpec::new(family, OutputSlot::One)
                .with_slot(InputSlot::One, SlotMix::split(1.0, 1.0));
            let out = mix(&spec, &spectra, &Unsupervised).unwrap();
            assert_eq!(out.as_raw(), a.as_raw(), "{family}");
        }
    }

    #[test]
    fn shared_weights_across_two_slots_reproduce_source() {
        let a = pattern(10, 10, 3);
        let spectra = set(&[Some(&a), Some(&a), None, None]);
        let spec = MixSpec::new(ComponentFamily::MagnitudePhase, OutputSlot::Two)
            .with_slot(InputSlot::One, SlotMix::shared(ComponentKind::Magnitude, 1.0))
            .with_slot(InputSlot::Two, SlotMix::shared(ComponentKind::Phase, 1.0));
        let out = mix(&spec, &spectra, &Unsupervised).unwrap();
        assert_eq!(out.as_raw(), a.as_raw());
    }

    #[test]
    fn real_imaginary_weights_are_linear() {
        let a = GrayImage::from_pixel(8, 8, image::Luma([200]));
        let spectra = set(&[Some(&a), None, None, None]);
        let spec = MixSpec::new(ComponentFamily::RealImaginary, OutputSlot::One)
            .with_slot(InputSlot::One, SlotMix::split(0.5, 0.5));
        let out = mix(&spec, &spectra, &Unsupervised).unwrap();
        assert!(out.pixels().all(|p| p.0[0] == 100));
    }

    #[test]
    fn all_zero_weights_give_black() {
        let a = pattern(8, 8, 1);
        let spectra = set(&[Some(&a), Some(&a), Some(&a), Some(&a)]);
        let spec = MixSpec::new(ComponentFamily::MagnitudePhase, OutputSlot::One);
        let out = mix(&spec, &spectra, &Unsupervised).unwrap();
        assert!(out.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn inner_mask_keeps_only_dc_for_single_coefficient() {
        let a = pattern(9, 9, 5);
        let spectra = set(&[Some(&a), None, None, None]);
        let mask = RegionMaskSpec::inner(RegionExtent::Pixels(1));
        let spec = MixSpec::new(ComponentFamily::RealImaginary, OutputSlot::One)
            .with_slot(InputSlot::One, SlotMix::split(1.0, 1.0).with_mask(mask));
        let out = mix(&spec, &spectra, &Unsupervised).unwrap();
        // Only the mean survives a 1x1 low-pass.
        let mean = a.pixels().map(|p| f64::from(p.0[0])).sum::<f64>() / 81.0;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let expected = mean.round() as u8;
        assert!(out.pixels().all(|p| p.0[0] == expected));
    }

    #[test]
    fn shared_component_outside_family_is_rejected() {
        let a = pattern(4, 4, 1);
        let spectra = set(&[Some(&a), None, None, None]);
        let spec = MixSpec::new(ComponentFamily::RealImaginary, OutputSlot::One)
            .with_slot(InputSlot::Three, SlotMix::shared(ComponentKind::Phase, 0.5));
        let err = mix(&spec, &spectra, &Unsupervised).unwrap_err();
        assert!(matches!(err, MixError::InvalidSpec(ref msg) if msg.contains("input 3")), "{err}");
    }

    #[test]
    fn out_of_range_weight_is_rejected() {
        let a = pattern(4, 4, 1);
        let spectra = set(&[Some(&a), None, None, None]);
        for bad in [1.5, -0.1, f64::NAN] {
            let spec = MixSpec::new(ComponentFamily::MagnitudePhase, OutputSlot::One)
                .with_slot(InputSlot::One, SlotMix::split(bad, 0.0));
            assert!(matches!(
                mix(&spec, &spectra, &Unsupervised),
                Err(MixError::InvalidSpec(_))
            ));
        }
    }

    #[test]
    fn no_images_is_an_error() {
        let spectra: SpectrumSet = Default::default();
        let spec = MixSpec::new(ComponentFamily::MagnitudePhase, OutputSlot::One);
        assert_eq!(mix(&spec, &spectra, &Unsupervised).unwrap_err(), MixError::NoImages);
    }

    #[test]
    fn mismatched_dimensions_fail() {
        let a = pattern(8, 8, 1);
        let b = pattern(8, 6, 1);
        let spectra = set(&[Some(&a), None, Some(&b), None]);
        let spec = MixSpec::new(ComponentFamily::MagnitudePhase, OutputSlot::One);
        assert_eq!(
            mix(&spec, &spectra, &Unsupervised).unwrap_err(),
            MixError::DimensionMismatch {
                expected: Dimensions::new(8, 8),
                found: Dimensions::new(8, 6),
            }
        );
    }

    struct Recorder {
        cancel_after: Option<usize>,
        polls: Cell<usize>,
        progress: RefCell<Vec<f64>>,
    }

    impl MixControl for Recorder {
        fn is_cancelled(&self) -> bool {
            let polls = self.polls.get() + 1;
            self.polls.set(polls);
            self.cancel_after.is_some_and(|limit| polls > limit)
        }

        fn report(&self, fraction: f64) {
            self.progress.borrow_mut().push(fraction);
        }
    }

    #[test]
    fn progress_is_monotonic_and_ends_at_one() {
        let a = pattern(8, 8, 1);
        let spectra = set(&[Some(&a), None, Some(&a), None]);
        let recorder = Recorder {
            cancel_after: None,
            polls: Cell::new(0),
            progress: RefCell::new(Vec::new()),
        };
        let spec = MixSpec::new(ComponentFamily::MagnitudePhase, OutputSlot::One);
        mix(&spec, &spectra, &recorder).unwrap();
        let progress = recorder.progress.into_inner();
        assert_eq!(progress.len(), STAGES);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert!((progress.last().unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cancellation_is_honoured_at_a_checkpoint() {
        let a = pattern(8, 8, 1);
        let spectra = set(&[Some(&a), Some(&a), Some(&a), Some(&a)]);
        let recorder = Recorder {
            cancel_after: Some(2),
            polls: Cell::new(0),
            progress: RefCell::new(Vec::new()),
        };
        let spec = MixSpec::new(ComponentFamily::MagnitudePhase, OutputSlot::One);
        assert_eq!(mix(&spec, &spectra, &recorder).unwrap_err(), MixError::Cancelled);
        assert!(recorder.progress.into_inner().len() < STAGES);
    }

    #[test]
    fn diagnostics_cover_every_slot() {
        let a = pattern(8, 8, 1);
        let spectra = set(&[Some(&a), None, None, None]);
        let mask = RegionMaskSpec::outer(RegionExtent::Pixels(2));
        let spec = MixSpec::new(ComponentFamily::MagnitudePhase, OutputSlot::One)
            .with_slot(InputSlot::One, SlotMix::split(1.0, 0.5).with_mask(mask));
        let (_, diagnostics) =
            mix_with_diagnostics(&spec, &spectra, &Unsupervised, &WebClock).unwrap();
        assert_eq!(diagnostics.slots.len(), INPUT_SLOTS);
        assert!(diagnostics.slots[0].loaded);
        assert!(!diagnostics.slots[1].loaded);
        assert_eq!(diagnostics.slots[0].masked_coefficients, 4);
        assert!((diagnostics.slots[0].secondary_weight - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn spec_serde_defaults_mask_and_scaling() {
        let json = r#"{
            "family": "MagnitudePhase",
            "slots": [
                {"weights": {"Split": {"primary": 1.0, "secondary": 1.0}}},
                {"weights": {"Shared": {"component": "Phase", "weight": 0.25}}},
                {"weights": {"Split": {"primary": 0.0, "secondary": 0.0}}},
                {"weights": {"Split": {"primary": 0.0, "secondary": 0.0}},
                 "mask": {"mode": "Outer", "extent": {"Pixels": 20}}}
            ],
            "output": "Two"
        }"#;
        let spec: MixSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.output, OutputSlot::Two);
        assert_eq!(spec.output_scaling, OutputScaling::Clip);
        assert_eq!(spec.slots[0].mask, RegionMaskSpec::NONE);
        assert_eq!(spec.slots[3].mask, RegionMaskSpec::outer(RegionExtent::Pixels(20)));
        assert_eq!(spec.resolved_weights().unwrap()[1], (0.0, 0.25));
    }
}
