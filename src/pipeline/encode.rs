//! Image encoding: [`PageImage`] → PNG bytes for engines that read files or pipes.
//!
//! PNG is lossless, so binarised pages reach the engine exactly as the
//! conditioner produced them.

use crate::page::PageImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a page as PNG.
pub fn encode_png(page: &PageImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    page.as_dynamic()
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} page → {} bytes PNG",
        page.width(),
        page.height(),
        buf.len()
    );
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn encode_small_image() {
        let page = PageImage::from_gray(GrayImage::from_pixel(10, 10, Luma([0])));
        let png = encode_png(&page).expect("encode should succeed");
        assert_eq!(&png[1..4], b"PNG");
        let decoded = image::load_from_memory(&png).expect("valid png");
        assert_eq!(decoded.width(), 10);
    }
}
