//! specmix: mix the Fourier components of up to four images.
//!
//! Loads the input images into an [`ImageBank`], builds a [`MixSpec`]
//! from the command line (or takes one verbatim as JSON), runs it through
//! a [`JobController`] and writes the mixed image. Per-stage diagnostics
//! are printed as a report or as JSON.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin specmix -- \
//!     -i face.png -i texture.jpg \
//!     --mix 1:magnitude=1 --mix 2:phase=1 \
//!     --mask 1:inner:25% \
//!     --output mixed.png
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use image::DynamicImage;
use specmix_core::{
    BrightnessContrast, ComponentFamily, ComponentKind, EngineConfig, ImageBank, InputSlot,
    JobController, JobEvent, MixSpec, OutputScaling, OutputSlot, RawPixels, RegionExtent,
    RegionMaskSpec, ResizeFilter, SlotMix,
};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Fourier-domain image mixer.
///
/// Each input occupies one slot (in the order given). Each `--mix` term
/// takes one component of one slot at a weight; giving both components of
/// the active family for the same slot weights them independently.
#[derive(Parser)]
#[command(name = "specmix", version)]
struct Cli {
    /// Input images (PNG, JPEG, BMP, WebP), up to four, filling slots 1-4.
    #[arg(short, long = "input", required = true, num_args = 1)]
    inputs: Vec<PathBuf>,

    /// Component family to mix.
    #[arg(long, value_enum, default_value_t = Family::MagnitudePhase)]
    family: Family,

    /// Mix term `SLOT:COMPONENT=WEIGHT`, e.g. `1:magnitude=0.8`.
    ///
    /// COMPONENT is one of magnitude, phase, real, imaginary; WEIGHT is in
    /// 0..=1. Slots without a term contribute nothing.
    #[arg(short = 'm', long = "mix", value_parser = parse_mix_term)]
    terms: Vec<MixTerm>,

    /// Region mask `SLOT:inner|outer:EXTENT`.
    ///
    /// EXTENT is a fraction of each axis (`0.3` or `30%`) or a square side
    /// in coefficients (`64px`).
    #[arg(long = "mask", value_parser = parse_mask_term)]
    masks: Vec<MaskTerm>,

    /// Output slot the result is published to.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    output_slot: u8,

    /// How the inverse transform is mapped to 8-bit samples.
    #[arg(long, value_enum, default_value_t = Scaling::Clip)]
    scaling: Scaling,

    /// Resampling filter used to bring inputs to a common size.
    #[arg(long, value_enum, default_value_t = Filter::Triangle)]
    resize_filter: Filter,

    /// Gamma for real/imaginary visualizations.
    #[arg(long, default_value_t = EngineConfig::DEFAULT_VISUAL_GAMMA)]
    gamma: f64,

    /// Brightness/contrast `SLOT:BRIGHTNESS:CONTRAST` for the displayed
    /// images written to `--visualize-dir`. Does not affect the mix.
    #[arg(long = "adjust", value_parser = parse_adjust_term)]
    adjustments: Vec<AdjustTerm>,

    /// Full mix spec as a JSON string.
    ///
    /// When provided, `--family`, `--mix`, `--mask`, `--output-slot` and
    /// `--scaling` are ignored. The JSON must be a valid `MixSpec`
    /// serialization.
    #[arg(long)]
    spec_json: Option<String>,

    /// Write the mixed image here (format from the extension).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write each slot's displayed image and component visualizations
    /// into this directory.
    #[arg(long)]
    visualize_dir: Option<PathBuf>,

    /// Output diagnostics (and failures) as JSON instead of a
    /// human-readable report.
    #[arg(long)]
    json: bool,
}

/// Component family selection.
#[derive(Clone, Copy, ValueEnum)]
enum Family {
    /// Magnitude and phase.
    MagnitudePhase,
    /// Real and imaginary parts.
    RealImaginary,
}

/// Output scaling selection.
#[derive(Clone, Copy, ValueEnum)]
enum Scaling {
    /// Round and clip to 0..=255.
    Clip,
    /// Stretch the real part to the full 0..=255 range.
    Normalize,
}

/// Resize filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

#[derive(Clone, Debug)]
struct MixTerm {
    slot: InputSlot,
    component: ComponentKind,
    weight: f64,
}

#[derive(Clone, Debug)]
struct MaskTerm {
    slot: InputSlot,
    mask: RegionMaskSpec,
}

#[derive(Clone, Debug)]
struct AdjustTerm {
    slot: InputSlot,
    adjustment: BrightnessContrast,
}

fn parse_slot(s: &str) -> Result<InputSlot, String> {
    s.trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(InputSlot::from_index)
        .ok_or_else(|| format!("slot must be 1-4, got {s:?}"))
}

fn parse_number(s: &str, what: &str) -> Result<f64, String> {
    s.trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid {what} {s:?}: {e}"))
}

fn parse_mix_term(s: &str) -> Result<MixTerm, String> {
    let (slot, rest) = s
        .split_once(':')
        .ok_or_else(|| format!("expected SLOT:COMPONENT=WEIGHT, got {s:?}"))?;
    let (component, weight) = rest
        .split_once('=')
        .ok_or_else(|| format!("expected SLOT:COMPONENT=WEIGHT, got {s:?}"))?;
    let component = match component.trim().to_ascii_lowercase().as_str() {
        "magnitude" | "mag" => ComponentKind::Magnitude,
        "phase" => ComponentKind::Phase,
        "real" | "re" => ComponentKind::Real,
        "imaginary" | "imag" | "im" => ComponentKind::Imaginary,
        other => return Err(format!("unknown component {other:?}")),
    };
    Ok(MixTerm {
        slot: parse_slot(slot)?,
        component,
        weight: parse_number(weight, "weight")?,
    })
}

fn parse_extent(s: &str) -> Result<RegionExtent, String> {
    let s = s.trim();
    if let Some(px) = s.strip_suffix("px") {
        return px
            .trim()
            .parse()
            .map(RegionExtent::Pixels)
            .map_err(|e| format!("invalid pixel extent {s:?}: {e}"));
    }
    if let Some(percent) = s.strip_suffix('%') {
        return parse_number(percent, "percentage").map(|p| RegionExtent::Fraction(p / 100.0));
    }
    parse_number(s, "fraction").map(RegionExtent::Fraction)
}

fn parse_mask_term(s: &str) -> Result<MaskTerm, String> {
    let mut parts = s.splitn(3, ':');
    let (Some(slot), Some(mode), Some(extent)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected SLOT:inner|outer:EXTENT, got {s:?}"));
    };
    let extent = parse_extent(extent)?;
    let mask = match mode.trim().to_ascii_lowercase().as_str() {
        "inner" | "low" => RegionMaskSpec::inner(extent),
        "outer" | "high" => RegionMaskSpec::outer(extent),
        "none" => RegionMaskSpec::NONE,
        other => return Err(format!("unknown mask mode {other:?}")),
    };
    Ok(MaskTerm {
        slot: parse_slot(slot)?,
        mask,
    })
}

fn parse_adjust_term(s: &str) -> Result<AdjustTerm, String> {
    let mut parts = s.splitn(3, ':');
    let (Some(slot), Some(brightness), Some(contrast)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected SLOT:BRIGHTNESS:CONTRAST, got {s:?}"));
    };
    Ok(AdjustTerm {
        slot: parse_slot(slot)?,
        adjustment: BrightnessContrast::new(
            parse_number(brightness, "brightness")?,
            parse_number(contrast, "contrast")?,
        ),
    })
}

/// Build the contribution of one slot from its `--mix` terms.
fn slot_mix(
    family: ComponentFamily,
    slot: InputSlot,
    terms: &[&MixTerm],
) -> Result<SlotMix, String> {
    match terms {
        [] => Ok(SlotMix::SILENT),
        [term] => Ok(SlotMix::shared(term.component, term.weight)),
        [a, b] if a.component != b.component => {
            let (primary, secondary) = if a.component == family.primary() {
                (a, b)
            } else {
                (b, a)
            };
            if primary.component != family.primary() || secondary.component != family.secondary() {
                return Err(format!(
                    "{slot}: {} and {} are not the two components of {family}",
                    a.component, b.component
                ));
            }
            Ok(SlotMix::split(primary.weight, secondary.weight))
        }
        _ => Err(format!("{slot}: at most one term per component")),
    }
}

/// Build a [`MixSpec`] from CLI arguments.
///
/// If `--spec-json` is provided, the JSON is parsed directly and the
/// individual mix flags are ignored.
fn spec_from_cli(cli: &Cli) -> Result<MixSpec, String> {
    if let Some(ref json) = cli.spec_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --spec-json: {e}"));
    }

    let family = match cli.family {
        Family::MagnitudePhase => ComponentFamily::MagnitudePhase,
        Family::RealImaginary => ComponentFamily::RealImaginary,
    };
    let output = if cli.output_slot == 2 {
        OutputSlot::Two
    } else {
        OutputSlot::One
    };
    let scaling = match cli.scaling {
        Scaling::Clip => OutputScaling::Clip,
        Scaling::Normalize => OutputScaling::Normalize,
    };

    let mut spec = MixSpec::new(family, output).with_scaling(scaling);
    for slot in InputSlot::ALL {
        let terms: Vec<&MixTerm> = cli.terms.iter().filter(|t| t.slot == slot).collect();
        let mut mix = slot_mix(family, slot, &terms)?;
        if let Some(term) = cli.masks.iter().rev().find(|m| m.slot == slot) {
            mix = mix.with_mask(term.mask);
        }
        spec = spec.with_slot(slot, mix);
    }
    Ok(spec)
}

fn engine_config(cli: &Cli) -> EngineConfig {
    EngineConfig {
        resize_filter: match cli.resize_filter {
            Filter::Nearest => ResizeFilter::Nearest,
            Filter::Triangle => ResizeFilter::Triangle,
            Filter::CatmullRom => ResizeFilter::CatmullRom,
            Filter::Gaussian => ResizeFilter::Gaussian,
            Filter::Lanczos3 => ResizeFilter::Lanczos3,
        },
        visual_gamma: cli.gamma,
    }
}

/// Hand the decoded pixels over with their native channel layout.
fn raw_pixels(image: DynamicImage) -> RawPixels {
    let (width, height) = (image.width(), image.height());
    match image {
        DynamicImage::ImageLuma8(gray) => RawPixels::new(width, height, 1, gray.into_raw()),
        DynamicImage::ImageLumaA8(gray) => RawPixels::new(width, height, 2, gray.into_raw()),
        DynamicImage::ImageRgb8(rgb) => RawPixels::new(width, height, 3, rgb.into_raw()),
        other => RawPixels::new(width, height, 4, other.to_rgba8().into_raw()),
    }
}

fn load_inputs(bank: &mut ImageBank, inputs: &[PathBuf]) -> Result<(), String> {
    if inputs.len() > InputSlot::ALL.len() {
        return Err(format!("at most 4 inputs, got {}", inputs.len()));
    }
    for (slot, path) in InputSlot::ALL.into_iter().zip(inputs) {
        let image =
            image::open(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        let size = bank
            .load(slot, raw_pixels(image))
            .map_err(|e| format!("Error loading {}: {e}", path.display()))?;
        eprintln!("{slot}: {} (unified size {size})", path.display());
    }
    Ok(())
}

fn kind_slug(kind: ComponentKind) -> &'static str {
    match kind {
        ComponentKind::Magnitude => "magnitude",
        ComponentKind::Phase => "phase",
        ComponentKind::Real => "real",
        ComponentKind::Imaginary => "imaginary",
    }
}

fn write_visualizations(
    bank: &ImageBank,
    family: ComponentFamily,
    dir: &Path,
) -> Result<(), String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("Error creating {}: {e}", dir.display()))?;
    for slot in InputSlot::ALL {
        let n = slot.index() + 1;
        if let Some(displayed) = bank.displayed(slot) {
            let path = dir.join(format!("input{n}-display.png"));
            displayed
                .save(&path)
                .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        }
        for kind in family.components() {
            if let Some(view) = bank.visualize(slot, kind) {
                let path = dir.join(format!("input{n}-{}.png", kind_slug(kind)));
                view.save(&path)
                    .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
            }
        }
    }
    eprintln!("Visualizations written to {}", dir.display());
    Ok(())
}

fn run(cli: &Cli) -> Result<(), String> {
    let spec = spec_from_cli(cli)?;
    let mut bank = ImageBank::new(engine_config(cli));
    load_inputs(&mut bank, &cli.inputs)?;
    for term in &cli.adjustments {
        bank.set_adjustment(term.slot, term.adjustment);
    }

    if let Some(ref dir) = cli.visualize_dir {
        write_visualizations(&bank, spec.family, dir)?;
    }

    let (jobs, events) = JobController::new();
    let handle = jobs
        .submit(spec, bank.spectra())
        .map_err(|e| format!("Error starting mix: {e}"))?;

    let outcome = loop {
        let Ok(event) = events.recv() else {
            break Err("mix worker stopped without reporting".to_string());
        };
        match event {
            JobEvent::Progress { fraction, .. } => {
                tracing::debug!(progress = fraction, "mixing");
            }
            JobEvent::Completed { image, .. } => break Ok(image),
            JobEvent::Cancelled { .. } => break Err("mix cancelled".to_string()),
            JobEvent::Failed { error, .. } => {
                if cli.json
                    && let Ok(json) = serde_json::to_string_pretty(&error)
                {
                    println!("{json}");
                }
                break Err(format!("Mix error: {error}"));
            }
        }
    };
    handle
        .join()
        .map_err(|_| "mix worker panicked".to_string())?;
    let image = outcome?;

    if let Some(diagnostics) = jobs.diagnostics(spec.output) {
        if cli.json {
            let json = serde_json::to_string_pretty(&diagnostics)
                .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
            println!("{json}");
        } else {
            println!("{}", diagnostics.report());
        }
    }

    if let Some(ref path) = cli.output {
        image
            .save(path)
            .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        eprintln!("{} written to {}", spec.output, path.display());
    }
    Ok(())
}

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}
