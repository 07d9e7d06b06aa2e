//! PDF rasterisation: render every page to a [`PageImage`] via pdfium.
//!
//! pdfium is a blocking C++ library; [`Rasterizer::rasterize`] is a blocking
//! call and the orchestrator runs it inside `tokio::task::spawn_blocking`.
//!
//! Pages are rendered at `dpi / 72` scale, with `max_rendered_pixels`
//! capping either dimension so a poster-sized page cannot exhaust memory.

use crate::error::ScanError;
use crate::page::PageImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Converts a PDF into one raster per page.
pub trait Rasterizer: Send + Sync {
    /// Render all pages in document order.
    ///
    /// Fails with [`ScanError::SourceUnreadable`] when the PDF cannot be
    /// opened or a page cannot be rendered.
    fn rasterize(&self, pdf: &Path, dpi: u32) -> Result<Vec<PageImage>, ScanError>;
}

/// [`Rasterizer`] backed by pdfium-render.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_rendered_pixels: u32,
    password: Option<String>,
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self {
            max_rendered_pixels: 7200,
            password: None,
        }
    }
}

impl PdfiumRasterizer {
    pub fn new(max_rendered_pixels: u32) -> Self {
        Self {
            max_rendered_pixels: max_rendered_pixels.max(100),
            password: None,
        }
    }

    /// User password for encrypted documents.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf: &Path, dpi: u32) -> Result<Vec<PageImage>, ScanError> {
        let source = pdf.display().to_string();
        let pdfium = Pdfium::default();

        let document = pdfium
            .load_pdf_from_file(pdf, self.password.as_deref())
            .map_err(|e| ScanError::unreadable(&source, format!("{:?}", e)))?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let scale = dpi as f32 / 72.0;
        let max = self.max_rendered_pixels as i32;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .set_maximum_width(max)
            .set_maximum_height(max);

        let mut images = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                ScanError::unreadable(&source, format!("page {} failed to render: {:?}", idx + 1, e))
            })?;

            let image = bitmap.as_image();
            // The pixel cap can shrink a page below the requested DPI.
            let effective_dpi = effective_dpi(image.width(), page.width().value, dpi);
            debug!(
                "Rendered page {} → {}x{} px at {} DPI",
                idx + 1,
                image.width(),
                image.height(),
                effective_dpi
            );
            images.push(PageImage::from_dynamic(image).with_dpi(effective_dpi));
        }

        Ok(images)
    }
}

/// Resolution actually rendered, from pixel width over page width in points.
fn effective_dpi(pixel_width: u32, page_width_points: f32, requested: u32) -> u32 {
    if !page_width_points.is_finite() || page_width_points <= 0.0 || pixel_width == 0 {
        return requested;
    }
    (pixel_width as f32 * 72.0 / page_width_points).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_dpi_follows_rendered_width() {
        // US Letter is 612pt wide.
        assert_eq!(effective_dpi(2550, 612.0, 300), 300);
        assert_eq!(effective_dpi(2000, 612.0, 300), 235);
    }

    #[test]
    fn effective_dpi_falls_back_to_request() {
        assert_eq!(effective_dpi(2550, 0.0, 300), 300);
        assert_eq!(effective_dpi(0, 612.0, 300), 300);
        assert_eq!(effective_dpi(10, f32::NAN, 150), 150);
    }
}
