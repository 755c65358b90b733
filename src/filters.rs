// ============================================================================
// IMAGE FILTERS — pure full-image routines
// ============================================================================
//
// Every filter is a pure `RgbaImage -> RgbaImage` function: no document
// state, no history. Callers route the result through
// `Document::apply_edit` (directly or via the background pipeline) to make
// it undoable.

use image::{RgbaImage, imageops};
use rayon::prelude::*;

/// Linear brightness shift plus GIMP-style contrast.
///
/// `brightness` is -100..=100 (percent of full range), `contrast` is
/// -127..=127. Alpha is untouched.
pub fn brightness_contrast(image: &RgbaImage, brightness: f32, contrast: f32) -> RgbaImage {
    let shift = brightness * 2.55;
    let contrast = contrast.clamp(-127.0, 127.0);
    let factor = 131.0 * (contrast + 127.0) / (127.0 * (131.0 - contrast));

    map_rgb(image, |c| {
        let v = c as f32 + shift;
        (v - 127.5) * factor + 127.5
    })
}

/// Rec. 601 luma desaturation. Alpha is untouched.
pub fn grayscale(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    par_rows(&mut out, |px| {
        let luma = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
        let l = luma.round().clamp(0.0, 255.0) as u8;
        px[0] = l;
        px[1] = l;
        px[2] = l;
    });
    out
}

/// Invert RGB, keep alpha.
pub fn invert(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    par_rows(&mut out, |px| {
        px[0] = 255 - px[0];
        px[1] = 255 - px[1];
        px[2] = 255 - px[2];
    });
    out
}

/// Classic sepia tone matrix. Alpha is untouched.
pub fn sepia(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    par_rows(&mut out, |px| {
        let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
        px[0] = (0.393 * r + 0.769 * g + 0.189 * b).round().min(255.0) as u8;
        px[1] = (0.349 * r + 0.686 * g + 0.168 * b).round().min(255.0) as u8;
        px[2] = (0.272 * r + 0.534 * g + 0.131 * b).round().min(255.0) as u8;
    });
    out
}

/// Gaussian blur; `sigma` controls the radius/strength.
pub fn gaussian_blur(image: &RgbaImage, sigma: f32) -> RgbaImage {
    if sigma <= 0.0 {
        return image.clone();
    }
    imageops::blur(image, sigma)
}

/// Apply `f` to each RGB channel value, clamping the result to a byte.
fn map_rgb(image: &RgbaImage, f: impl Fn(u8) -> f32 + Sync) -> RgbaImage {
    let mut out = image.clone();
    par_rows(&mut out, |px| {
        px[0] = f(px[0]).round().clamp(0.0, 255.0) as u8;
        px[1] = f(px[1]).round().clamp(0.0, 255.0) as u8;
        px[2] = f(px[2]).round().clamp(0.0, 255.0) as u8;
    });
    out
}

/// Run a per-pixel mutation over the image, one rayon task per row.
/// The closure receives each pixel as its 4 RGBA bytes.
fn par_rows(image: &mut RgbaImage, f: impl Fn(&mut [u8]) + Sync) {
    let width = image.width() as usize;
    let raw: &mut [u8] = &mut *image;
    raw.par_chunks_exact_mut(width * 4).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            f(px);
        }
    });
}
