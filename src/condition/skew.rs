//! Text-line skew detection and correction.
//!
//! Detection runs Canny edges through a Hough line transform and takes the
//! median angle of the near-horizontal lines. imageproc reports each line
//! by the angle of its normal, so a horizontal line sits at 90° and a skew
//! of `s` degrees shows up as `90 + s`.
//!
//! Angles follow image coordinates: positive means the baseline descends
//! to the right. Correction rotates by the negated angle onto an expanded
//! canvas so no page content is cropped.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use tracing::debug;

/// Lines further than this from horizontal are treated as vertical strokes.
const NEAR_HORIZONTAL_BAND: f32 = 60.0;

/// Options for [`SkewEstimator`].
#[derive(Debug, Clone, PartialEq)]
pub struct SkewOptions {
    /// Largest skew considered plausible, in degrees. Default: 45.
    pub max_angle: f32,
    /// Fewer candidate lines than this means "no reliable angle". Default: 3.
    pub min_line_candidates: usize,
    /// Canny hysteresis thresholds. Default: 50 / 150.
    pub canny_low: f32,
    pub canny_high: f32,
    /// Hough votes required, as a fraction of the analysed image width. Default: 0.25.
    pub vote_fraction: f32,
    /// Lower bound on the Hough vote threshold. Default: 30.
    pub min_votes: u32,
    /// Non-maximum suppression radius in Hough space. Default: 8.
    pub suppression_radius: u32,
    /// Images wider than this are downscaled before analysis. Default: 1200.
    pub analysis_width: u32,
}

impl Default for SkewOptions {
    fn default() -> Self {
        Self {
            max_angle: 45.0,
            min_line_candidates: 3,
            canny_low: 50.0,
            canny_high: 150.0,
            vote_fraction: 0.25,
            min_votes: 30,
            suppression_radius: 8,
            analysis_width: 1200,
        }
    }
}

/// Estimates the dominant text-line angle of a page.
#[derive(Debug, Clone, Default)]
pub struct SkewEstimator {
    options: SkewOptions,
}

impl SkewEstimator {
    pub fn new(options: SkewOptions) -> Self {
        Self { options }
    }

    /// Estimator with default options and the given angle limit.
    pub fn with_max_angle(max_angle: f32) -> Self {
        Self::new(SkewOptions {
            max_angle: max_angle.abs(),
            ..SkewOptions::default()
        })
    }

    pub fn options(&self) -> &SkewOptions {
        &self.options
    }

    /// Skew of the page in degrees, or `0.0` when no reliable angle exists.
    pub fn estimate_angle(&self, img: &GrayImage) -> f32 {
        let (w, h) = img.dimensions();
        if w < 8 || h < 8 {
            return 0.0;
        }

        let analysed = if w > self.options.analysis_width {
            let scale = self.options.analysis_width as f32 / w as f32;
            let nh = ((h as f32 * scale).round() as u32).max(1);
            imageops::resize(img, self.options.analysis_width, nh, FilterType::Triangle)
        } else {
            img.clone()
        };

        let blurred = gaussian_blur_f32(&analysed, 1.0);
        let edges = canny(&blurred, self.options.canny_low, self.options.canny_high);

        let vote_threshold = ((analysed.width() as f32 * self.options.vote_fraction) as u32)
            .max(self.options.min_votes);
        let lines = detect_lines(
            &edges,
            LineDetectionOptions {
                vote_threshold,
                suppression_radius: self.options.suppression_radius,
            },
        );

        let band = self.options.max_angle.max(NEAR_HORIZONTAL_BAND);
        let mut candidates = near_horizontal_angles(&lines, band);
        debug!(
            lines = lines.len(),
            candidates = candidates.len(),
            vote_threshold,
            "Hough lines detected"
        );

        if candidates.len() < self.options.min_line_candidates {
            return 0.0;
        }

        // Out-of-range candidates take part in the median so that a few
        // stray lines cannot outvote a page skewed past the limit.
        let angle = median(&mut candidates);
        if angle.abs() > self.options.max_angle {
            debug!(angle, max = self.options.max_angle, "Skew beyond limit, ignored");
            return 0.0;
        }
        angle
    }
}

/// Skew angles of lines within `band` degrees of horizontal.
fn near_horizontal_angles(lines: &[PolarLine], band: f32) -> Vec<f32> {
    lines
        .iter()
        .map(|l| l.angle_in_degrees as f32 - 90.0)
        .filter(|a| a.abs() <= band)
        .collect()
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Rotate `img` by `-angle_deg` onto a canvas large enough to hold the
/// whole rotated page. Uncovered pixels take `fill`.
pub fn rotate_expanded(img: &GrayImage, angle_deg: f32, fill: u8) -> GrayImage {
    let (w, h) = img.dimensions();
    let theta = (-angle_deg).to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());

    let nw = ((w as f32 * cos + h as f32 * sin).ceil() as u32).max(1);
    let nh = ((w as f32 * sin + h as f32 * cos).ceil() as u32).max(1);

    let projection = Projection::translate(nw as f32 / 2.0, nh as f32 / 2.0)
        * Projection::rotate(theta)
        * Projection::translate(-(w as f32) / 2.0, -(h as f32) / 2.0);

    let mut out = GrayImage::from_pixel(nw, nh, Luma([fill]));
    warp_into(img, &projection, Interpolation::Bilinear, Luma([fill]), &mut out);
    out
}

/// Most frequent sample value; the page background for typical scans.
pub fn dominant_intensity(img: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for p in img.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    hist.iter()
        .enumerate()
        .max_by_key(|&(value, count)| (*count, std::cmp::Reverse(value)))
        .map(|(value, _)| value as u8)
        .unwrap_or(255)
}
