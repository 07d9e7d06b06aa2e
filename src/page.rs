//! Immutable page raster shared between pipeline stages.

use image::{DynamicImage, GrayImage};
use std::fmt;
use std::sync::Arc;

/// One rasterised page.
///
/// Cloning is cheap (reference counted). Stages never mutate a `PageImage`;
/// they build a new one, so the original raster stays available for every
/// retry attempt.
///
/// The optional resolution travels with the pixels: a stage that resamples
/// the raster scales it, so engines always see the effective DPI.
#[derive(Clone)]
pub struct PageImage {
    pixels: Arc<DynamicImage>,
    dpi: Option<u32>,
}

impl PageImage {
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self {
            pixels: Arc::new(image),
            dpi: None,
        }
    }

    pub fn from_gray(image: GrayImage) -> Self {
        Self::from_dynamic(DynamicImage::ImageLuma8(image))
    }

    /// Attach the resolution the raster was rendered at.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = (dpi > 0).then_some(dpi);
        self
    }

    /// Effective resolution, if known.
    pub fn dpi(&self) -> Option<u32> {
        self.dpi
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Whether the raster has no pixels at all.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Whether the raster is already single-channel 8-bit.
    pub fn is_gray(&self) -> bool {
        matches!(*self.pixels, DynamicImage::ImageLuma8(_))
    }

    /// Single-channel copy of the raster (luma for colour input).
    pub fn to_gray(&self) -> GrayImage {
        match &*self.pixels {
            DynamicImage::ImageLuma8(g) => g.clone(),
            other => other.to_luma8(),
        }
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.pixels
    }
}

impl From<DynamicImage> for PageImage {
    fn from(image: DynamicImage) -> Self {
        Self::from_dynamic(image)
    }
}

impl From<GrayImage> for PageImage {
    fn from(image: GrayImage) -> Self {
        Self::from_gray(image)
    }
}

impl fmt::Debug for PageImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("color", &self.pixels.color())
            .field("dpi", &self.dpi)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn gray_passthrough_is_identical() {
        let g = GrayImage::from_pixel(4, 3, Luma([77]));
        let page = PageImage::from_gray(g.clone());
        assert!(page.is_gray());
        assert_eq!(page.to_gray(), g);
    }

    #[test]
    fn colour_input_converts_to_luma() {
        let rgb = RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]));
        let page = PageImage::from_dynamic(DynamicImage::ImageRgb8(rgb));
        assert!(!page.is_gray());
        let g = page.to_gray();
        assert_eq!(g.dimensions(), (2, 2));
        assert_eq!(g.get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn clones_share_pixels() {
        let page = PageImage::from_gray(GrayImage::new(10, 10));
        let other = page.clone();
        assert!(std::ptr::eq(page.as_dynamic(), other.as_dynamic()));
        assert!(!page.is_empty());
    }

    #[test]
    fn dpi_is_optional_and_never_zero() {
        let page = PageImage::from_gray(GrayImage::new(4, 4));
        assert_eq!(page.dpi(), None);
        assert_eq!(page.clone().with_dpi(300).dpi(), Some(300));
        assert_eq!(page.with_dpi(0).dpi(), None);
    }
}
