//! Single-image filters used by the conditioning stages.
//!
//! Every function here takes a grayscale image and returns a new one. None
//! of them validate their input: the stage wrappers in [`super`] check for
//! degenerate images before calling in.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::{bilateral_filter, gaussian_blur_f32, median_filter};
use imageproc::morphology;

// ── Denoise ──────────────────────────────────────────────────────────────────

/// Gaussian blur with a sigma derived from the kernel radius.
pub fn gaussian(img: &GrayImage, radius: u32) -> GrayImage {
    let sigma = (radius as f32 / 2.0).max(0.5);
    gaussian_blur_f32(img, sigma)
}

/// Median filter over a `(2r+1)²` window.
pub fn median(img: &GrayImage, radius: u32) -> GrayImage {
    median_filter(img, radius, radius)
}

/// Edge-preserving bilateral filter over a `(2r+1)²` window.
///
/// `sigma_color` is the edge-preservation strength: small values keep edges
/// crisp, large values approach a plain Gaussian blur.
pub fn bilateral(img: &GrayImage, radius: u32, sigma_color: f32) -> GrayImage {
    let sigma_space = (radius as f32 / 2.0).max(0.5);
    bilateral_filter(img, 2 * radius + 1, sigma_color.max(1.0), sigma_space)
}

// ── Contrast ─────────────────────────────────────────────────────────────────

/// Contrast-limited adaptive histogram equalisation.
///
/// The image is split into a `grid × grid` array of tiles (fewer when the
/// image is smaller than the grid). Each tile gets its own equalisation
/// table, with histogram bins clipped at `clip_limit × mean bin height` and
/// the clipped excess spread evenly over all bins. Output pixels are
/// bilinearly interpolated between the four nearest tile tables so tile
/// borders do not show.
pub fn clahe(img: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    let grid = grid.max(1);

    let tile_w = w.div_ceil(grid.min(w)).max(1);
    let tile_h = h.div_ceil(grid.min(h)).max(1);
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    let mut luts: Vec<[u8; 256]> = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            luts.push(tile_lut(img, x0, y0, x1, y1, clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let (ty0, ty1, ay) = neighbours(y, tile_h, tiles_y);
        for x in 0..w {
            let (tx0, tx1, ax) = neighbours(x, tile_w, tiles_x);
            let v = img.get_pixel(x, y).0[0] as usize;
            let top = lut_at(tx0, ty0)[v] as f32 * (1.0 - ax) + lut_at(tx1, ty0)[v] as f32 * ax;
            let bottom = lut_at(tx0, ty1)[v] as f32 * (1.0 - ax) + lut_at(tx1, ty1)[v] as f32 * ax;
            let value = top * (1.0 - ay) + bottom * ay;
            out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Equalisation table for one tile.
fn tile_lut(img: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[img.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    let area = ((x1 - x0) * (y1 - y0)).max(1);

    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }
        let share = excess / 256;
        let remainder = (excess % 256) as usize;
        for (i, bin) in hist.iter_mut().enumerate() {
            *bin += share + u32::from(i < remainder);
        }
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (value, count) in hist.iter().enumerate() {
        cdf += count;
        lut[value] = ((cdf as f32 * 255.0) / area as f32).round().min(255.0) as u8;
    }
    lut
}

/// Tile indices either side of `pos` plus the interpolation weight of the second.
fn neighbours(pos: u32, tile: u32, tiles: u32) -> (u32, u32, f32) {
    let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
    if f <= 0.0 {
        return (0, 0, 0.0);
    }
    let i0 = (f.floor() as u32).min(tiles - 1);
    let i1 = (i0 + 1).min(tiles - 1);
    let a = if i1 == i0 { 0.0 } else { f - i0 as f32 };
    (i0, i1, a.clamp(0.0, 1.0))
}

// ── Binarisation ─────────────────────────────────────────────────────────────

/// Local-mean adaptive threshold.
///
/// A pixel becomes ink (0) when it is darker than the mean of its
/// `(2r+1)²` neighbourhood minus `offset`; everything else becomes paper
/// (255). Means come from a summed-area table so cost is independent of
/// the block size.
pub fn adaptive_threshold(img: &GrayImage, block_radius: u32, offset: i32) -> GrayImage {
    let (w, h) = img.dimensions();
    let integral = integral_image(img);

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mean = region_mean(&integral, w, h, x, y, block_radius);
            let threshold = (mean.round() as i32 - offset).clamp(0, 255);
            let v = img.get_pixel(x, y).0[0] as i32;
            out.put_pixel(x, y, Luma([if v < threshold { 0 } else { 255 }]));
        }
    }
    out
}

/// Summed-area table with a zero first row and column, stride `w + 1`.
fn integral_image(img: &GrayImage) -> Vec<u64> {
    let (w, h) = img.dimensions();
    let stride = (w + 1) as usize;
    let mut table = vec![0u64; stride * (h + 1) as usize];

    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += img.get_pixel(x, y).0[0] as u64;
            let idx = (y + 1) as usize * stride + (x + 1) as usize;
            let above = y as usize * stride + (x + 1) as usize;
            table[idx] = row_sum + table[above];
        }
    }
    table
}

fn region_mean(integral: &[u64], w: u32, h: u32, cx: u32, cy: u32, radius: u32) -> f64 {
    let stride = (w + 1) as usize;
    let x1 = cx.saturating_sub(radius) as usize;
    let y1 = cy.saturating_sub(radius) as usize;
    let x2 = (cx as usize + radius as usize + 1).min(w as usize);
    let y2 = (cy as usize + radius as usize + 1).min(h as usize);

    let area = ((x2 - x1) * (y2 - y1)) as f64;
    if area == 0.0 {
        return 128.0;
    }
    let sum = integral[y2 * stride + x2] as f64 - integral[y1 * stride + x2] as f64
        - integral[y2 * stride + x1] as f64
        + integral[y1 * stride + x1] as f64;
    sum / area
}

/// Global Otsu binarisation (ink 0, paper 255).
pub fn otsu_binarize(img: &GrayImage) -> GrayImage {
    let level = imageproc::contrast::otsu_level(img);
    let mut out = img.clone();
    for p in out.pixels_mut() {
        p.0[0] = if p.0[0] > level { 255 } else { 0 };
    }
    out
}

/// Whether every pixel is either 0 or 255.
pub fn is_binary(img: &GrayImage) -> bool {
    img.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255)
}

// ── Morphology ───────────────────────────────────────────────────────────────

/// Opening then closing of the dark ink layer with a square element.
///
/// imageproc treats bright pixels as foreground, so the image is inverted
/// around the operations. Opening removes specks smaller than the element;
/// closing bridges gaps of the same size inside strokes.
pub fn open_close_ink(binary: &GrayImage, radius: u8) -> GrayImage {
    let mut ink = binary.clone();
    imageops::invert(&mut ink);
    let opened = morphology::open(&ink, Norm::LInf, radius);
    let mut closed = morphology::close(&opened, Norm::LInf, radius);
    imageops::invert(&mut closed);
    closed
}

// ── Geometry ─────────────────────────────────────────────────────────────────

/// Resample by `scale` (Catmull-Rom), never below 1×1.
pub fn rescale(img: &GrayImage, scale: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let nw = ((w as f32 * scale).round() as u32).max(1);
    let nh = ((h as f32 * scale).round() as u32).max(1);
    imageops::resize(img, nw, nh, FilterType::CatmullRom)
}

/// Smallest and largest sample value, `None` for an empty image.
pub fn intensity_range(img: &GrayImage) -> Option<(u8, u8)> {
    let mut iter = img.pixels().map(|p| p.0[0]);
    let first = iter.next()?;
    Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| Luma([(x * 255 / (w - 1).max(1)) as u8]))
    }

    #[test]
    fn bilateral_keeps_flat_image_flat() {
        let img = GrayImage::from_pixel(12, 12, Luma([140]));
        let out = bilateral(&img, 2, 30.0);
        assert!(out.pixels().all(|p| p.0[0] == 140));
    }

    #[test]
    fn bilateral_preserves_strong_edge() {
        let img = GrayImage::from_fn(20, 10, |x, _| Luma([if x < 10 { 0 } else { 255 }]));
        let out = bilateral(&img, 2, 20.0);
        assert!(out.get_pixel(9, 5).0[0] < 10, "dark side bled");
        assert!(out.get_pixel(10, 5).0[0] > 245, "bright side bled");
    }

    #[test]
    fn median_removes_salt_noise() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([200]));
        img.put_pixel(4, 4, Luma([0]));
        let out = median(&img, 1);
        assert_eq!(out.get_pixel(4, 4).0[0], 200);
    }

    #[test]
    fn clahe_stretches_low_contrast_tile() {
        let img = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x % 20) as u8]));
        let out = clahe(&img, 2.0, 8);
        let (lo, hi) = intensity_range(&out).expect("non-empty");
        assert!(hi - lo > 19, "contrast not increased: {lo}..{hi}");
    }

    #[test]
    fn clahe_handles_image_smaller_than_grid() {
        let img = gradient(5, 3);
        let out = clahe(&img, 2.0, 8);
        assert_eq!(out.dimensions(), (5, 3));
    }

    #[test]
    fn adaptive_threshold_marks_dark_text_as_ink() {
        let mut img = GrayImage::from_pixel(40, 40, Luma([210]));
        for x in 10..30 {
            img.put_pixel(x, 20, Luma([40]));
        }
        let out = adaptive_threshold(&img, 7, 10);
        assert_eq!(out.get_pixel(15, 20).0[0], 0);
        assert_eq!(out.get_pixel(15, 5).0[0], 255);
        assert!(is_binary(&out));
    }

    #[test]
    fn otsu_splits_two_levels() {
        let img = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 30 } else { 220 }]));
        let out = otsu_binarize(&img);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(9, 0).0[0], 255);
    }

    #[test]
    fn open_close_removes_isolated_speck() {
        let mut img = GrayImage::from_pixel(20, 20, Luma([255]));
        img.put_pixel(3, 3, Luma([0]));
        for y in 8..14 {
            for x in 8..14 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let out = open_close_ink(&img, 1);
        assert_eq!(out.get_pixel(3, 3).0[0], 255, "speck survived");
        assert_eq!(out.get_pixel(10, 10).0[0], 0, "solid ink removed");
    }

    #[test]
    fn rescale_doubles_dimensions() {
        let out = rescale(&gradient(10, 6), 2.0);
        assert_eq!(out.dimensions(), (20, 12));
    }

    #[test]
    fn intensity_range_of_empty_image() {
        assert_eq!(intensity_range(&GrayImage::new(0, 0)), None);
    }
}
