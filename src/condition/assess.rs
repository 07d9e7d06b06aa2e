//! Raster quality assessment, independent of any recognition result.
//!
//! ```text
//! score = 0.4·sharpness + 0.3·contrast + 0.2·brightness + 0.1·(1 − noise)
//! ```
//!
//! | metric | measure | normalisation |
//! |--------|---------|---------------|
//! | sharpness | variance of the Laplacian | `/ 1000`, capped at 1 |
//! | contrast | standard deviation of intensity | `× 4 / 255`, capped at 1 |
//! | brightness | distance of the mean from mid-grey | `1 − 2·|mean/255 − 0.5|` |
//! | noise | mean absolute residual after a 5×5 median | `/ 50`, capped at 1 |

use image::GrayImage;
use imageproc::filter::{laplacian_filter, median_filter};
use serde::{Deserialize, Serialize};

/// Quality of one page raster, every field in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageQuality {
    pub sharpness: f32,
    pub contrast: f32,
    pub brightness: f32,
    /// Higher is noisier.
    pub noise: f32,
    /// Weighted combination of the four metrics.
    pub score: f32,
}

/// Assess how suitable a raster is for recognition.
///
/// An empty image scores zero on every metric.
pub fn assess_image_quality(img: &GrayImage) -> ImageQuality {
    let pixel_count = img.width() as f64 * img.height() as f64;
    if pixel_count == 0.0 {
        return ImageQuality::default();
    }

    let (mean, std_dev) = mean_and_std(img.pixels().map(|p| p.0[0] as f64));

    let laplacian = laplacian_filter(img);
    let (_, lap_std) = mean_and_std(laplacian.pixels().map(|p| p.0[0] as f64));
    let sharpness = unit(lap_std * lap_std / 1000.0);

    let contrast = unit(std_dev / 255.0 * 4.0);
    let brightness = unit(1.0 - (mean / 255.0 - 0.5).abs() * 2.0);

    let smoothed = median_filter(img, 2, 2);
    let residual: f64 = img
        .pixels()
        .zip(smoothed.pixels())
        .map(|(a, b)| a.0[0].abs_diff(b.0[0]) as f64)
        .sum::<f64>()
        / pixel_count;
    let noise = unit(residual / 50.0);

    let score = unit(
        sharpness as f64 * 0.4
            + contrast as f64 * 0.3
            + brightness as f64 * 0.2
            + (1.0 - noise as f64) * 0.1,
    );

    ImageQuality {
        sharpness,
        contrast,
        brightness,
        noise,
        score,
    }
}

fn mean_and_std(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (mut n, mut sum, mut sum_sq) = (0f64, 0f64, 0f64);
    for v in values {
        n += 1.0;
        sum += v;
        sum_sq += v * v;
    }
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

fn unit(v: f64) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0) as f32
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn text_like() -> GrayImage {
        GrayImage::from_fn(80, 60, |x, y| {
            let ink = (y / 6) % 2 == 0 && (x / 3) % 3 != 0 && x > 4 && x < 76;
            Luma([if ink { 20 } else { 235 }])
        })
    }

    #[test]
    fn empty_image_scores_zero() {
        assert_eq!(assess_image_quality(&GrayImage::new(0, 0)), ImageQuality::default());
    }

    #[test]
    fn white_page_has_no_sharpness_or_contrast() {
        let q = assess_image_quality(&GrayImage::from_pixel(40, 40, Luma([255])));
        assert_eq!(q.sharpness, 0.0);
        assert_eq!(q.contrast, 0.0);
        assert_eq!(q.brightness, 0.0);
        assert_eq!(q.noise, 0.0);
        assert!((q.score - 0.1).abs() < 1e-6);
    }

    #[test]
    fn mid_grey_page_is_well_exposed() {
        let q = assess_image_quality(&GrayImage::from_pixel(40, 40, Luma([128])));
        assert!(q.brightness > 0.99);
        assert!((q.score - 0.3).abs() < 0.01);
    }

    #[test]
    fn crisp_text_beats_blurred_text() {
        let crisp = text_like();
        let blurred = imageproc::filter::gaussian_blur_f32(&crisp, 3.0);
        let a = assess_image_quality(&crisp);
        let b = assess_image_quality(&blurred);
        assert!(a.sharpness > b.sharpness);
        assert!(a.score > b.score);
    }

    #[test]
    fn salt_noise_is_detected() {
        let clean = GrayImage::from_pixel(40, 40, Luma([200]));
        let noisy = GrayImage::from_fn(40, 40, |x, y| {
            Luma([if (x * 7 + y * 13) % 5 == 0 { 0 } else { 200 }])
        });
        assert!(assess_image_quality(&noisy).noise > assess_image_quality(&clean).noise);
    }

    #[test]
    fn metrics_stay_in_unit_range() {
        let q = assess_image_quality(&text_like());
        for v in [q.sharpness, q.contrast, q.brightness, q.noise, q.score] {
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
