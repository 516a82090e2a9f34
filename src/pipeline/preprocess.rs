//! Pixel-transform chain applied to every page before OCR.
//!
//! ```text
//! pad ──▶ grayscale ──▶ contrast ×1.5 ──▶ 3×3 box blur ──▶ binarize
//! ```
//!
//! Every step is a pure function from one buffer to a new one, so the chain
//! can run on any number of workers at once and the same input always yields
//! byte-identical output.
//!
//! The binarisation step is a fixed mid-grey cut (the nearest-colour rule of
//! a 1-bit palette), not a locally adaptive threshold. Tesseract runs its own
//! Otsu pass afterwards; this step mostly removes the light-grey speckle the
//! blur leaves behind on scanned typewriter pages.

use image::{imageops, DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::filter::box_filter;

/// Grey levels strictly above this become white; the rest black.
const BINARY_CUT: u8 = 127;

/// Pad `img` with white, anchored top-left, to at least `min_w × min_h`.
///
/// Images already at least that large in both axes are returned unchanged.
/// OCR engines reject or badly misread tiny inputs such as cropped page
/// numbers, so this always runs first.
pub fn ensure_minimum_dimensions(img: DynamicImage, min_w: u32, min_h: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    if w >= min_w && h >= min_h {
        return img;
    }

    let mut canvas = RgbaImage::from_pixel(w.max(min_w), h.max(min_h), Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut canvas, &img.to_rgba8(), 0, 0);
    DynamicImage::ImageRgba8(canvas)
}

/// Reduce to single-channel luminance.
pub fn grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Multiply every sample by `gain`, truncating toward zero and clipping to
/// 255. No offset.
pub fn rescale_contrast(img: &GrayImage, gain: f32) -> GrayImage {
    let table: [u8; 256] =
        std::array::from_fn(|i| (i as f32 * gain).clamp(0.0, 255.0).trunc() as u8);
    let mut out = img.clone();
    for Luma([v]) in out.pixels_mut() {
        *v = table[*v as usize];
    }
    out
}

/// 3×3 mean filter; border pixels see the image edge repeated.
pub fn denoise(img: &GrayImage) -> GrayImage {
    box_filter(img, 1, 1)
}

/// Reduce to pure black (0) / white (255).
pub fn binarize(img: &GrayImage) -> GrayImage {
    threshold(img, BINARY_CUT, ThresholdType::Binary)
}

/// Run the full chain (excluding padding) in its fixed order.
pub fn preprocess(img: &DynamicImage, contrast_gain: f32) -> GrayImage {
    let gray = grayscale(img);
    let contrasted = rescale_contrast(&gray, contrast_gain);
    let denoised = denoise(&contrasted);
    binarize(&denoised)
}
