//! Image conditioning: deterministic clean-up of a page raster before recognition.
//!
//! ## Stage order
//!
//! ```text
//! grayscale ──▶ rescale ──▶ denoise ──▶ contrast ──▶ binarize ──▶ deskew ──▶ morphology
//! (always)     (scale≠1)    (toggle)    (CLAHE)      (adaptive)   (Hough)    (open+close)
//! ```
//!
//! The order is fixed; [`ConditioningConfig`] only switches stages on or off
//! and tunes their parameters. Each stage is a plain function over
//! immutable images, so the same config applied to the same page always
//! yields the same pixels.
//!
//! A stage that meets degenerate input (flat image, image smaller than its
//! kernel, empty raster) hands its input through unchanged and records a
//! [`SkipReason`]. [`condition`] never fails for a well-formed image.

pub mod assess;
pub mod filters;
pub mod skew;

use crate::page::PageImage;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub use assess::{assess_image_quality, ImageQuality};
pub use skew::{SkewEstimator, SkewOptions};

// ── Config ───────────────────────────────────────────────────────────────────

/// Noise filter used by the denoise stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenoiseMethod {
    Gaussian,
    Median,
    /// Edge-preserving; keeps glyph outlines sharp. (default)
    #[default]
    Bilateral,
}

/// Which conditioning stages run, and with what parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditioningConfig {
    // ── Toggles ──
    pub denoise: bool,
    pub enhance_contrast: bool,
    pub adaptive_binarize: bool,
    pub deskew: bool,
    pub morphological_cleanup: bool,

    /// Resample factor applied right after grayscale. 1.0 leaves the raster
    /// as rendered; values above 1 emulate a higher rendering DPI.
    pub scale: f32,

    // ── Denoise ──
    pub denoise_method: DenoiseMethod,
    /// Kernel radius in pixels. Default: 2.
    pub denoise_radius: u32,
    /// Bilateral intensity sigma; lower keeps edges sharper. Default: 30.
    pub edge_preservation: f32,

    // ── Contrast ──
    /// CLAHE clip limit, as a multiple of the mean histogram bin. Default: 2.0.
    pub clahe_clip_limit: f32,
    /// CLAHE tiles per side. Default: 8.
    pub clahe_tile_grid: u32,

    // ── Binarize ──
    /// Neighbourhood radius for the local mean. Default: 15.
    pub binarize_block_radius: u32,
    /// Subtracted from the local mean before comparing. Default: 10.
    pub binarize_offset: i32,

    // ── Deskew ──
    /// Largest skew corrected, in degrees. Default: 45.
    pub max_skew_angle: f32,
    /// Skews smaller than this are left alone. Default: 0.5.
    pub min_skew_correction: f32,

    // ── Morphology ──
    /// Square structuring-element radius. Default: 1.
    pub morph_radius: u8,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            denoise: true,
            enhance_contrast: true,
            adaptive_binarize: true,
            deskew: true,
            morphological_cleanup: false,
            scale: 1.0,
            denoise_method: DenoiseMethod::default(),
            denoise_radius: 2,
            edge_preservation: 30.0,
            clahe_clip_limit: 2.0,
            clahe_tile_grid: 8,
            binarize_block_radius: 15,
            binarize_offset: 10,
            max_skew_angle: 45.0,
            min_skew_correction: 0.5,
            morph_radius: 1,
        }
    }
}

impl ConditioningConfig {
    /// Every stage off: output is the grayscale input.
    pub fn none() -> Self {
        Self {
            denoise: false,
            enhance_contrast: false,
            adaptive_binarize: false,
            deskew: false,
            morphological_cleanup: false,
            ..Self::default()
        }
    }

    /// Every stage on.
    pub fn full() -> Self {
        Self {
            morphological_cleanup: true,
            ..Self::default()
        }
    }

    /// Names of the enabled toggles, in stage order.
    pub fn enabled_stages(&self) -> Vec<Stage> {
        STAGES
            .iter()
            .map(|(stage, _)| *stage)
            .filter(|stage| stage.enabled_in(self))
            .collect()
    }
}

// ── Stages ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Rescale,
    Denoise,
    Contrast,
    Binarize,
    Deskew,
    Morphology,
}

impl Stage {
    fn enabled_in(self, cfg: &ConditioningConfig) -> bool {
        match self {
            Stage::Rescale => (cfg.scale - 1.0).abs() > f32::EPSILON,
            Stage::Denoise => cfg.denoise,
            Stage::Contrast => cfg.enhance_contrast,
            Stage::Binarize => cfg.adaptive_binarize,
            Stage::Deskew => cfg.deskew,
            Stage::Morphology => cfg.morphological_cleanup,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Rescale => "rescale",
            Stage::Denoise => "denoise",
            Stage::Contrast => "contrast",
            Stage::Binarize => "binarize",
            Stage::Deskew => "deskew",
            Stage::Morphology => "morphology",
        };
        f.write_str(name)
    }
}

/// Why an enabled stage passed its input through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmptyImage,
    /// Image is smaller than the stage's kernel.
    ImageSmallerThanKernel { width: u32, height: u32, kernel: u32 },
    /// Every pixel has the same value.
    ZeroVariance,
    /// Scale factor is not a positive finite number.
    InvalidScale(f32),
    /// Detected skew is below the correction threshold.
    NegligibleSkew(f32),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyImage => write!(f, "empty image"),
            SkipReason::ImageSmallerThanKernel {
                width,
                height,
                kernel,
            } => write!(f, "{width}x{height} image smaller than {kernel}px kernel"),
            SkipReason::ZeroVariance => write!(f, "zero-variance image"),
            SkipReason::InvalidScale(s) => write!(f, "invalid scale {s}"),
            SkipReason::NegligibleSkew(a) => write!(f, "skew {a:.2}° below threshold"),
        }
    }
}

type StageFn = fn(&GrayImage, &ConditioningConfig) -> Result<GrayImage, SkipReason>;

const STAGES: &[(Stage, StageFn)] = &[
    (Stage::Rescale, rescale_stage),
    (Stage::Denoise, denoise_stage),
    (Stage::Contrast, contrast_stage),
    (Stage::Binarize, binarize_stage),
    (Stage::Deskew, deskew_stage),
    (Stage::Morphology, morphology_stage),
];

/// What [`condition_with_report`] did to a page.
#[derive(Debug, Clone)]
pub struct ConditioningReport {
    pub image: PageImage,
    pub applied: Vec<Stage>,
    pub skipped: Vec<(Stage, SkipReason)>,
}

/// Condition one page image.
pub fn condition(image: &PageImage, config: &ConditioningConfig) -> PageImage {
    condition_with_report(image, config).image
}

/// Condition one page image and report which stages ran or were skipped.
pub fn condition_with_report(image: &PageImage, config: &ConditioningConfig) -> ConditioningReport {
    let mut current = image.to_gray();
    let mut applied = Vec::new();
    let mut skipped = Vec::new();

    for (stage, run) in STAGES {
        if !stage.enabled_in(config) {
            continue;
        }
        match run(&current, config) {
            Ok(next) => {
                current = next;
                applied.push(*stage);
            }
            Err(reason) => skipped.push((*stage, reason)),
        }
    }

    let mut conditioned = PageImage::from_gray(current);
    if let Some(dpi) = image.dpi() {
        let dpi = if applied.contains(&Stage::Rescale) {
            (dpi as f32 * config.scale).round().max(1.0) as u32
        } else {
            dpi
        };
        conditioned = conditioned.with_dpi(dpi);
    }

    ConditioningReport {
        image: conditioned,
        applied,
        skipped,
    }
}

// ── Stage implementations ────────────────────────────────────────────────────

fn require_kernel(img: &GrayImage, radius: u32) -> Result<(), SkipReason> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(SkipReason::EmptyImage);
    }
    let kernel = 2 * radius + 1;
    if w < kernel || h < kernel {
        return Err(SkipReason::ImageSmallerThanKernel {
            width: w,
            height: h,
            kernel,
        });
    }
    Ok(())
}

fn require_variance(img: &GrayImage) -> Result<(), SkipReason> {
    match filters::intensity_range(img) {
        None => Err(SkipReason::EmptyImage),
        Some((lo, hi)) if lo == hi => Err(SkipReason::ZeroVariance),
        Some(_) => Ok(()),
    }
}

fn rescale_stage(img: &GrayImage, cfg: &ConditioningConfig) -> Result<GrayImage, SkipReason> {
    if img.width() == 0 || img.height() == 0 {
        return Err(SkipReason::EmptyImage);
    }
    if !cfg.scale.is_finite() || cfg.scale <= 0.0 {
        return Err(SkipReason::InvalidScale(cfg.scale));
    }
    Ok(filters::rescale(img, cfg.scale))
}

fn denoise_stage(img: &GrayImage, cfg: &ConditioningConfig) -> Result<GrayImage, SkipReason> {
    let radius = cfg.denoise_radius.max(1);
    require_kernel(img, radius)?;
    Ok(match cfg.denoise_method {
        DenoiseMethod::Gaussian => filters::gaussian(img, radius),
        DenoiseMethod::Median => filters::median(img, radius),
        DenoiseMethod::Bilateral => filters::bilateral(img, radius, cfg.edge_preservation),
    })
}

fn contrast_stage(img: &GrayImage, cfg: &ConditioningConfig) -> Result<GrayImage, SkipReason> {
    require_variance(img)?;
    Ok(filters::clahe(img, cfg.clahe_clip_limit, cfg.clahe_tile_grid))
}

fn binarize_stage(img: &GrayImage, cfg: &ConditioningConfig) -> Result<GrayImage, SkipReason> {
    require_kernel(img, cfg.binarize_block_radius.max(1))?;
    Ok(filters::adaptive_threshold(
        img,
        cfg.binarize_block_radius.max(1),
        cfg.binarize_offset,
    ))
}

fn deskew_stage(img: &GrayImage, cfg: &ConditioningConfig) -> Result<GrayImage, SkipReason> {
    require_variance(img)?;
    let angle = SkewEstimator::with_max_angle(cfg.max_skew_angle).estimate_angle(img);
    if angle.abs() < cfg.min_skew_correction.max(f32::EPSILON) {
        return Err(SkipReason::NegligibleSkew(angle));
    }
    debug!(angle, "Correcting skew");
    Ok(skew::rotate_expanded(img, angle, skew::dominant_intensity(img)))
}

fn morphology_stage(img: &GrayImage, cfg: &ConditioningConfig) -> Result<GrayImage, SkipReason> {
    let radius = cfg.morph_radius.max(1);
    require_kernel(img, radius as u32)?;
    let binary = if filters::is_binary(img) {
        img.clone()
    } else {
        filters::otsu_binarize(img)
    };
    Ok(filters::open_close_ink(&binary, radius))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Luma, Rgb, RgbImage};

    fn noisy_page() -> PageImage {
        let img = GrayImage::from_fn(64, 48, |x, y| {
            let base = if (y / 8) % 2 == 0 && x > 8 && x < 56 { 60 } else { 200 };
            Luma([base + ((x * 7 + y * 13) % 11) as u8])
        });
        PageImage::from_gray(img)
    }

    #[test]
    fn all_stages_disabled_is_grayscale_identity() {
        let rgb = RgbImage::from_fn(16, 9, |x, y| Rgb([(x * 10) as u8, (y * 20) as u8, 90]));
        let page = PageImage::from_dynamic(DynamicImage::ImageRgb8(rgb));
        let out = condition(&page, &ConditioningConfig::none());
        assert_eq!(out.to_gray(), page.to_gray());
    }

    #[test]
    fn conditioning_is_deterministic() {
        let page = noisy_page();
        let cfg = ConditioningConfig::full();
        let a = condition(&page, &cfg);
        let b = condition(&page, &cfg);
        assert_eq!(a.to_gray(), b.to_gray());
    }

    #[test]
    fn input_page_is_not_mutated() {
        let page = noisy_page();
        let before = page.to_gray();
        let _ = condition(&page, &ConditioningConfig::full());
        assert_eq!(page.to_gray(), before);
    }

    #[test]
    fn binarize_produces_two_levels() {
        let cfg = ConditioningConfig {
            binarize_block_radius: 7,
            ..ConditioningConfig::none()
        };
        let cfg = ConditioningConfig {
            adaptive_binarize: true,
            ..cfg
        };
        let out = condition(&noisy_page(), &cfg);
        assert!(filters::is_binary(&out.to_gray()));
    }

    #[test]
    fn flat_image_skips_contrast_and_deskew() {
        let page = PageImage::from_gray(GrayImage::from_pixel(40, 40, Luma([128])));
        let cfg = ConditioningConfig {
            enhance_contrast: true,
            deskew: true,
            ..ConditioningConfig::none()
        };
        let report = condition_with_report(&page, &cfg);
        assert!(report.applied.is_empty());
        assert_eq!(
            report.skipped,
            vec![
                (Stage::Contrast, SkipReason::ZeroVariance),
                (Stage::Deskew, SkipReason::ZeroVariance),
            ]
        );
        assert_eq!(report.image.to_gray(), page.to_gray());
    }

    #[test]
    fn kernel_larger_than_image_is_skipped() {
        let page = PageImage::from_gray(GrayImage::from_fn(6, 6, |x, _| Luma([(x * 40) as u8])));
        let cfg = ConditioningConfig {
            denoise: true,
            denoise_radius: 5,
            ..ConditioningConfig::none()
        };
        let report = condition_with_report(&page, &cfg);
        assert!(matches!(
            report.skipped.as_slice(),
            [(Stage::Denoise, SkipReason::ImageSmallerThanKernel { kernel: 11, .. })]
        ));
        assert_eq!(report.image.to_gray(), page.to_gray());
    }

    #[test]
    fn empty_image_does_not_panic() {
        let page = PageImage::from_gray(GrayImage::new(0, 0));
        let out = condition(&page, &ConditioningConfig::full());
        assert!(out.is_empty());
    }

    #[test]
    fn rescale_runs_only_when_scale_differs() {
        let cfg = ConditioningConfig {
            scale: 1.5,
            ..ConditioningConfig::none()
        };
        assert_eq!(cfg.enabled_stages(), vec![Stage::Rescale]);
        let out = condition(&noisy_page(), &cfg);
        assert_eq!((out.width(), out.height()), (96, 72));
        assert!(ConditioningConfig::none().enabled_stages().is_empty());
    }

    #[test]
    fn rescale_scales_the_resolution_hint() {
        let page = noisy_page().with_dpi(300);
        let upsampled = ConditioningConfig {
            scale: 1.5,
            ..ConditioningConfig::none()
        };
        assert_eq!(condition(&page, &upsampled).dpi(), Some(450));
        assert_eq!(condition(&page, &ConditioningConfig::full()).dpi(), Some(300));
        assert_eq!(condition(&noisy_page(), &upsampled).dpi(), None);
    }

    #[test]
    fn morphology_binarizes_grey_input_first() {
        let cfg = ConditioningConfig {
            morphological_cleanup: true,
            ..ConditioningConfig::none()
        };
        let out = condition(&noisy_page(), &cfg);
        assert!(filters::is_binary(&out.to_gray()));
    }

    #[test]
    fn default_config_roundtrips_through_json() {
        let cfg = ConditioningConfig::default();
        let json = serde_json::to_string(&cfg).expect("serialise");
        let partial: ConditioningConfig =
            serde_json::from_str(r#"{"deskew": false}"#).expect("partial");
        assert!(!partial.deskew);
        assert!(partial.denoise);
        assert!(json.contains("\"denoise_method\":\"bilateral\""));
    }
}
