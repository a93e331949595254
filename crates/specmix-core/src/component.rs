//! Component views of a spectrum and their display mapping.
//!
//! A [`ComponentView`] is one real-valued reading of a
//! [`ComplexSpectrum`]: magnitude, phase, real part, or imaginary part.
//! Views are read-only derivations; the spectrum itself is never
//! modified.
//!
//! [`visualize`] turns a view into an 8-bit display image. That path is
//! lossy (log compression, normalization, gamma) and exists for display
//! only. Mixing always works on the raw coefficients.

use std::f64::consts::PI;
use std::fmt;

use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::spectrum::{ComplexSpectrum, min_max};
use crate::types::{Dimensions, GrayImage};

/// Which component of a complex coefficient to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Magnitude,
    Phase,
    Real,
    Imaginary,
}

impl ComponentKind {
    /// The family this component belongs to.
    #[must_use]
    pub const fn family(self) -> ComponentFamily {
        match self {
            Self::Magnitude | Self::Phase => ComponentFamily::MagnitudePhase,
            Self::Real | Self::Imaginary => ComponentFamily::RealImaginary,
        }
    }

    /// Read this component from one coefficient.
    #[must_use]
    pub fn of(self, value: Complex<f64>) -> f64 {
        match self {
            Self::Magnitude => value.norm(),
            Self::Phase => value.arg(),
            Self::Real => value.re,
            Self::Imaginary => value.im,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Magnitude => f.write_str("FT Magnitude"),
            Self::Phase => f.write_str("FT Phase"),
            Self::Real => f.write_str("FT Real"),
            Self::Imaginary => f.write_str("FT Imaginary"),
        }
    }
}

/// The two mutually exclusive pairs of components that can be mixed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentFamily {
    /// Polar form: mixed as `magnitude * exp(i * phase)`.
    #[default]
    MagnitudePhase,
    /// Cartesian form: mixed as `real + i * imaginary`.
    RealImaginary,
}

impl ComponentFamily {
    /// The selectable components of this family, primary first.
    #[must_use]
    pub const fn components(self) -> [ComponentKind; 2] {
        match self {
            Self::MagnitudePhase => [ComponentKind::Magnitude, ComponentKind::Phase],
            Self::RealImaginary => [ComponentKind::Real, ComponentKind::Imaginary],
        }
    }

    /// Primary component (magnitude or real part).
    #[must_use]
    pub const fn primary(self) -> ComponentKind {
        self.components()[0]
    }

    /// Secondary component (phase or imaginary part).
    #[must_use]
    pub const fn secondary(self) -> ComponentKind {
        self.components()[1]
    }

    /// Rebuild one coefficient from its primary and secondary parts.
    #[must_use]
    pub fn combine(self, primary: f64, secondary: f64) -> Complex<f64> {
        match self {
            Self::MagnitudePhase => Complex::from_polar(primary, secondary),
            Self::RealImaginary => Complex::new(primary, secondary),
        }
    }
}

impl fmt::Display for ComponentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MagnitudePhase => f.write_str("Magnitude / Phase"),
            Self::RealImaginary => f.write_str("Real / Imaginary"),
        }
    }
}

/// One real-valued component extracted from a spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentView {
    kind: ComponentKind,
    dimensions: Dimensions,
    values: Vec<f64>,
}

impl ComponentView {
    /// Which component these values represent.
    #[must_use]
    pub const fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Dimensions of the underlying spectrum.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Raw component values, row-major and centered.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Extract one component from every coefficient.
#[must_use]
pub fn component(spectrum: &ComplexSpectrum, kind: ComponentKind) -> ComponentView {
    ComponentView {
        kind,
        dimensions: spectrum.dimensions(),
        values: spectrum.as_slice().iter().map(|&c| kind.of(c)).collect(),
    }
}

/// Display mapping options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisualizeOptions {
    /// Gamma exponent applied to normalized real/imaginary views.
    /// Values below 1 lift faint detail.
    pub gamma: f64,
}

impl VisualizeOptions {
    /// Default gamma for real/imaginary views.
    pub const DEFAULT_GAMMA: f64 = 0.5;
}

impl Default for VisualizeOptions {
    fn default() -> Self {
        Self {
            gamma: Self::DEFAULT_GAMMA,
        }
    }
}

/// Map a component view to an 8-bit display image.
///
/// - Magnitude: `ln(1 + |v|)`, min-max normalized.
/// - Phase: linear from `(-pi, pi]` to `0..=255`.
/// - Real / Imaginary: `ln(1 + |v|)`, min-max normalized, then raised
///   to `options.gamma`.
///
/// A view with no dynamic range (every value equal) maps to black.
#[must_use]
pub fn visualize(view: &ComponentView, options: VisualizeOptions) -> GrayImage {
    let unit: Vec<f64> = match view.kind {
        ComponentKind::Phase => view
            .values
            .iter()
            .map(|&v| ((v + PI) / (2.0 * PI)).clamp(0.0, 1.0))
            .collect(),
        ComponentKind::Magnitude => normalize(view.values.iter().map(|v| v.abs().ln_1p())),
        ComponentKind::Real | ComponentKind::Imaginary => {
            let gamma = if options.gamma.is_finite() && options.gamma > 0.0 {
                options.gamma
            } else {
                1.0
            };
            normalize(view.values.iter().map(|v| v.abs().ln_1p()))
                .into_iter()
                .map(|v| v.powf(gamma))
                .collect()
        }
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let samples: Vec<u8> = unit
        .iter()
        .map(|&v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect();

    GrayImage::from_raw(view.dimensions.width, view.dimensions.height, samples)
        .unwrap_or_else(|| GrayImage::new(view.dimensions.width, view.dimensions.height))
}

/// Min-max normalize to `[0, 1]`. Constant input maps to zeros.
fn normalize(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let values: Vec<f64> = values.collect();
    let (min, max) = min_max(&values);
    let range = max - min;
    if range <= f64::EPSILON {
        return vec![0.0; values.len()];
    }
    values
        .iter()
        .map(|&v| if v.is_finite() { (v - min) / range } else { 0.0 })
        .collect()
}
