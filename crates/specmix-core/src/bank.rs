//! Per-slot image storage and the shared spectrum cache.
//!
//! [`ImageBank`] owns everything a front-end manipulates between mixes:
//! the loaded originals, their copies resized to the unified size, each
//! slot's [`BrightnessContrast`], and the forward transform of every
//! loaded slot.
//!
//! Spectra live in a [`SpectrumCache`] shared with mix workers. Writers
//! compute new spectra first and then swap the handles in under a short
//! write lock; readers clone the handles under a read lock. A reader
//! therefore sees either the complete old set or the complete new set,
//! never a half-written spectrum and never a mix of sizes.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::adjust::{BrightnessContrast, apply_brightness_contrast};
use crate::component::{self, ComponentKind, VisualizeOptions};
use crate::grayscale::{self, RawPixels};
use crate::mixer::SpectrumSet;
use crate::resize::{ResizeFilter, unify_size};
use crate::spectrum::{self, ComplexSpectrum};
use crate::types::{Dimensions, GrayImage, INPUT_SLOTS, InputSlot, MixError};

/// Engine-wide settings that are not part of an individual mix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Filter used when resizing slots to the unified size.
    pub resize_filter: ResizeFilter,
    /// Gamma for real/imaginary visualizations.
    pub visual_gamma: f64,
}

impl EngineConfig {
    /// Default resize filter (bilinear).
    pub const DEFAULT_RESIZE_FILTER: ResizeFilter = ResizeFilter::Triangle;
    /// Default visualization gamma.
    pub const DEFAULT_VISUAL_GAMMA: f64 = VisualizeOptions::DEFAULT_GAMMA;
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resize_filter: Self::DEFAULT_RESIZE_FILTER,
            visual_gamma: Self::DEFAULT_VISUAL_GAMMA,
        }
    }
}

/// Spectra of all input slots, readable from any thread.
#[derive(Debug, Default)]
pub struct SpectrumCache {
    entries: RwLock<SpectrumSet>,
}

impl SpectrumCache {
    /// Consistent snapshot of every slot's spectrum.
    #[must_use]
    pub fn snapshot(&self) -> SpectrumSet {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The current spectrum of one slot.
    #[must_use]
    pub fn get(&self, slot: InputSlot) -> Option<Arc<ComplexSpectrum>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)[slot.index()].clone()
    }

    /// Swap in new handles for the given slots in one step.
    fn publish(
        &self,
        updates: impl IntoIterator<Item = (InputSlot, Option<Arc<ComplexSpectrum>>)>,
    ) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for (slot, spectrum) in updates {
            entries[slot.index()] = spectrum;
        }
    }
}

#[derive(Debug, Clone)]
struct LoadedImage {
    /// Grayscale image at its own size, as loaded.
    original: GrayImage,
    /// `original` resampled to the unified size.
    unified: GrayImage,
}

/// The four input slots and their cached spectra.
#[derive(Debug, Default)]
pub struct ImageBank {
    config: EngineConfig,
    slots: [Option<LoadedImage>; INPUT_SLOTS],
    adjustments: [BrightnessContrast; INPUT_SLOTS],
    dimensions: Option<Dimensions>,
    cache: Arc<SpectrumCache>,
}

impl ImageBank {
    /// An empty bank.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Engine settings.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared handle to the spectrum cache, for mix workers.
    #[must_use]
    pub fn cache(&self) -> Arc<SpectrumCache> {
        Arc::clone(&self.cache)
    }

    /// Snapshot of every slot's spectrum.
    #[must_use]
    pub fn spectra(&self) -> SpectrumSet {
        self.cache.snapshot()
    }

    /// The unified size of the loaded slots, if any are loaded.
    #[must_use]
    pub const fn unified_dimensions(&self) -> Option<Dimensions> {
        self.dimensions
    }

    /// Returns `true` if the slot holds an image.
    #[must_use]
    pub fn is_loaded(&self, slot: InputSlot) -> bool {
        self.slots[slot.index()].is_some()
    }

    /// Load a raw pixel buffer into a slot.
    ///
    /// The slot's adjustment is reset. If the unified size changes, every
    /// loaded slot is resampled and re-transformed; otherwise only this
    /// slot is.
    ///
    /// # Errors
    ///
    /// Propagates [`grayscale::load`] failures; the bank is left
    /// unchanged in that case.
    pub fn load(&mut self, slot: InputSlot, raw: RawPixels) -> Result<Dimensions, MixError> {
        let original = grayscale::load(raw)?;
        tracing::debug!(%slot, size = %Dimensions::of(&original), "image loaded");
        self.slots[slot.index()] = Some(LoadedImage {
            unified: original.clone(),
            original,
        });
        self.adjustments[slot.index()] = BrightnessContrast::NEUTRAL;
        self.reunify(Some(slot));
        // The slot just loaded, so a unified size exists.
        self.dimensions.ok_or(MixError::NoImages)
    }

    /// Remove a slot's image. The remaining slots are re-unified, so the
    /// common size may grow.
    pub fn clear(&mut self, slot: InputSlot) {
        if self.slots[slot.index()].take().is_none() {
            return;
        }
        self.adjustments[slot.index()] = BrightnessContrast::NEUTRAL;
        tracing::debug!(%slot, "slot cleared");
        self.cache.publish([(slot, None)]);
        self.reunify(None);
    }

    /// Resample to the common size and refresh spectra.
    ///
    /// `changed` names a slot whose content is new even if the common
    /// size is not.
    fn reunify(&mut self, changed: Option<InputSlot>) {
        let originals: [Option<GrayImage>; INPUT_SLOTS] = std::array::from_fn(|i| {
            self.slots[i].as_ref().map(|loaded| loaded.original.clone())
        });
        let (unified, dimensions) = unify_size(&originals, self.config.resize_filter);
        let resized = dimensions != self.dimensions;
        if resized {
            tracing::debug!(from = ?self.dimensions, to = ?dimensions, "unified size changed");
        }
        self.dimensions = dimensions;

        let mut updates = Vec::new();
        for (slot, image) in InputSlot::ALL.into_iter().zip(unified) {
            let Some(image) = image else { continue };
            if let Some(loaded) = self.slots[slot.index()].as_mut() {
                loaded.unified = image;
                if resized || changed == Some(slot) {
                    updates.push((slot, Some(Arc::new(spectrum::forward(&loaded.unified)))));
                }
            }
        }
        tracing::debug!(recomputed = updates.len(), "spectra refreshed");
        self.cache.publish(updates);
    }

    /// The unadjusted image of a slot at the unified size.
    #[must_use]
    pub fn image(&self, slot: InputSlot) -> Option<&GrayImage> {
        self.slots[slot.index()].as_ref().map(|loaded| &loaded.unified)
    }

    /// The slot's image with its brightness/contrast applied.
    #[must_use]
    pub fn displayed(&self, slot: InputSlot) -> Option<GrayImage> {
        self.image(slot)
            .map(|image| apply_brightness_contrast(image, self.adjustments[slot.index()]))
    }

    /// Current brightness/contrast of a slot.
    #[must_use]
    pub const fn adjustment(&self, slot: InputSlot) -> BrightnessContrast {
        self.adjustments[slot.index()]
    }

    /// Replace a slot's brightness/contrast.
    pub const fn set_adjustment(&mut self, slot: InputSlot, adjustment: BrightnessContrast) {
        self.adjustments[slot.index()] =
            BrightnessContrast::new(adjustment.brightness, adjustment.contrast);
    }

    /// Apply a drag delta to a slot's brightness/contrast.
    pub fn nudge(&mut self, slot: InputSlot, dx: f64, dy: f64) {
        self.adjustments[slot.index()].nudge(dx, dy);
    }

    /// Reset a slot's brightness/contrast to neutral.
    pub const fn reset_adjustment(&mut self, slot: InputSlot) {
        self.adjustments[slot.index()].reset();
    }

    /// Display image of one component of a slot's spectrum.
    #[must_use]
    pub fn visualize(&self, slot: InputSlot, kind: ComponentKind) -> Option<GrayImage> {
        let spectrum = self.cache.get(slot)?;
        let options = VisualizeOptions {
            gamma: self.config.visual_gamma,
        };
        Some(component::visualize(&component::component(&spectrum, kind), options))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gray(w: u32, h: u32, seed: u8) -> RawPixels {
        let data = (0..w * h)
            .map(|i| u8::try_from(i % 251).unwrap().wrapping_mul(seed))
            .collect();
        RawPixels::new(w, h, 1, data)
    }

    #[test]
    fn config_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.resize_filter, ResizeFilter::Triangle);
        assert!((config.visual_gamma - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn configured_filter_is_used_for_resizing() {
        let config = EngineConfig {
            resize_filter: ResizeFilter::Nearest,
            ..EngineConfig::default()
        };
        let mut bank = ImageBank::new(config);
        assert_eq!(bank.config(), &config);
        bank.load(InputSlot::One, gray(8, 8, 5)).unwrap();
        bank.load(InputSlot::Two, gray(4, 4, 1)).unwrap();
        let expected = crate::resize::resize_to(
            &grayscale::load(gray(8, 8, 5)).unwrap(),
            Dimensions::new(4, 4),
            bank.config().resize_filter,
        );
        assert_eq!(bank.image(InputSlot::One).unwrap(), &expected);
    }

    #[test]
    fn load_caches_spectrum() {
        let mut bank = ImageBank::default();
        let dims = bank.load(InputSlot::Two, gray(8, 6, 3)).unwrap();
        assert_eq!(dims, Dimensions::new(8, 6));
        let spectra = bank.spectra();
        assert!(spectra[0].is_none());
        assert_eq!(spectra[1].as_ref().unwrap().dimensions(), dims);
    }

    #[test]
    fn failed_load_leaves_slot_unchanged() {
        let mut bank = ImageBank::default();
        bank.load(InputSlot::One, gray(4, 4, 1)).unwrap();
        let before = bank.spectra();
        let err = bank
            .load(InputSlot::One, RawPixels::new(4, 4, 5, vec![0; 80]))
            .unwrap_err();
        assert_eq!(err, MixError::UnsupportedFormat { channels: 5 });
        assert!(Arc::ptr_eq(
            before[0].as_ref().unwrap(),
            bank.spectra()[0].as_ref().unwrap()
        ));
    }

    #[test]
    fn smaller_image_invalidates_every_slot() {
        let mut bank = ImageBank::default();
        bank.load(InputSlot::One, gray(10, 10, 1)).unwrap();
        bank.load(InputSlot::Two, gray(10, 10, 2)).unwrap();
        let before = bank.spectra();
        bank.load(InputSlot::Three, gray(6, 12, 3)).unwrap();
        let after = bank.spectra();
        assert_eq!(bank.unified_dimensions(), Some(Dimensions::new(6, 10)));
        for spectrum in after.iter().flatten() {
            assert_eq!(spectrum.dimensions(), Dimensions::new(6, 10));
        }
        assert!(!Arc::ptr_eq(before[0].as_ref().unwrap(), after[0].as_ref().unwrap()));
    }

    #[test]
    fn same_size_load_keeps_other_spectra() {
        let mut bank = ImageBank::default();
        bank.load(InputSlot::One, gray(8, 8, 1)).unwrap();
        let first = bank.spectra()[0].clone().unwrap();
        bank.load(InputSlot::Four, gray(8, 8, 7)).unwrap();
        assert!(Arc::ptr_eq(&first, bank.spectra()[0].as_ref().unwrap()));
    }

    #[test]
    fn clearing_smallest_slot_grows_size_back() {
        let mut bank = ImageBank::default();
        bank.load(InputSlot::One, gray(12, 12, 1)).unwrap();
        bank.load(InputSlot::Two, gray(5, 5, 2)).unwrap();
        assert_eq!(bank.unified_dimensions(), Some(Dimensions::new(5, 5)));
        assert!(bank.is_loaded(InputSlot::Two));
        bank.clear(InputSlot::Two);
        assert!(!bank.is_loaded(InputSlot::Two));
        assert!(bank.is_loaded(InputSlot::One));
        assert_eq!(bank.unified_dimensions(), Some(Dimensions::new(12, 12)));
        assert!(bank.spectra()[1].is_none());
        assert_eq!(bank.image(InputSlot::One).unwrap().dimensions(), (12, 12));
        bank.clear(InputSlot::One);
        assert_eq!(bank.unified_dimensions(), None);
        assert!(bank.spectra().iter().all(Option::is_none));
    }

    #[test]
    fn adjustment_does_not_touch_spectrum() {
        let mut bank = ImageBank::default();
        bank.load(InputSlot::One, gray(6, 6, 1)).unwrap();
        let before = bank.spectra()[0].clone().unwrap();
        bank.nudge(InputSlot::One, 40.0, 25.0);
        assert_ne!(bank.displayed(InputSlot::One).as_ref(), bank.image(InputSlot::One));
        assert!(Arc::ptr_eq(&before, bank.spectra()[0].as_ref().unwrap()));
        bank.reset_adjustment(InputSlot::One);
        assert_eq!(bank.displayed(InputSlot::One).as_ref(), bank.image(InputSlot::One));
    }

    #[test]
    fn visualize_empty_slot_is_none() {
        let bank = ImageBank::default();
        assert!(bank.visualize(InputSlot::Three, ComponentKind::Phase).is_none());
    }

    #[test]
    fn visualize_matches_dimensions() {
        let mut bank = ImageBank::default();
        bank.load(InputSlot::Three, gray(7, 5, 9)).unwrap();
        let image = bank.visualize(InputSlot::Three, ComponentKind::Magnitude).unwrap();
        assert_eq!(image.dimensions(), (7, 5));
    }

    #[test]
    fn readers_never_see_mixed_sizes() {
        let mut bank = ImageBank::default();
        bank.load(InputSlot::One, gray(16, 16, 1)).unwrap();
        bank.load(InputSlot::Two, gray(16, 16, 2)).unwrap();
        let cache = bank.cache();
        let reader = std::thread::spawn(move || {
            for _ in 0..200 {
                let snapshot = cache.snapshot();
                let mut sizes = snapshot.iter().flatten().map(|s| s.dimensions());
                if let Some(first) = sizes.next() {
                    assert!(sizes.all(|d| d == first));
                }
            }
        });
        for side in (8..16).rev() {
            bank.load(InputSlot::Three, gray(side, side, 3)).unwrap();
            bank.clear(InputSlot::Three);
        }
        reader.join().unwrap();
    }
}
