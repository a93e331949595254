//! Mix diagnostics: per-stage timing and counts.
//!
//! Every mix collects diagnostics alongside its output image. The job
//! controller logs them; the CLI prints them as a report or JSON.
//!
//! Duration measurements use [`std::time::Duration`] (platform-agnostic).
//! Timestamps come from a [`Clock`]; the default [`WebClock`] uses the
//! `web-time` crate, which maps to `performance.now()` on WASM and
//! `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::component::ComponentFamily;
use crate::region::RegionMode;
use crate::types::{Dimensions, InputSlot};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// Current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by `web_time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebClock;

impl Clock for WebClock {
    type Instant = web_time::Instant;

    fn now(&self) -> Self::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &Self::Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from a single mix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixDiagnostics {
    /// Spectrum dimensions.
    pub dimensions: Dimensions,
    /// Component family used for the mix.
    pub family: ComponentFamily,
    /// One entry per input slot, in slot order.
    pub slots: Vec<SlotDiagnostics>,
    /// Inverse transform stage.
    #[serde(with = "duration_serde")]
    pub inverse_duration: Duration,
    /// Total wall-clock duration of the mix (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Diagnostics for one input slot's mask-and-accumulate stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDiagnostics {
    /// Which slot.
    pub slot: InputSlot,
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Whether the slot held a spectrum.
    pub loaded: bool,
    /// Weight applied to the primary component.
    pub primary_weight: f64,
    /// Weight applied to the secondary component.
    pub secondary_weight: f64,
    /// Region mask mode.
    pub mask: RegionMode,
    /// Coefficients zeroed by the mask.
    pub masked_coefficients: usize,
}

impl MixDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Mix Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Spectrum: {} ({} coefficients)  |  Family: {}",
            self.dimensions,
            self.dimensions.pixel_count(),
            self.family,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let pct = |ms: f64| {
            if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            }
        };

        for slot in &self.slots {
            let ms = duration_ms(slot.duration);
            let details = if slot.loaded {
                format!(
                    "w=({:.2}, {:.2}) mask={:?} zeroed={}",
                    slot.primary_weight, slot.secondary_weight, slot.mask, slot.masked_coefficients,
                )
            } else {
                "empty".to_string()
            };
            let name = slot.slot.to_string();
            lines.push(format!("{name:<24} {ms:>8.3}ms {:>9.1}%  {details}", pct(ms)));
        }

        let ms = duration_ms(self.inverse_duration);
        lines.push(format!("{:<24} {ms:>8.3}ms {:>9.1}%", "Inverse FFT", pct(ms)));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
const fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
