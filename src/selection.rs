//! Selection geometry.
//!
//! A selection is a shape in canvas space; every shape rasterizes to a
//! single-channel coverage mask (255 = selected) so downstream consumers
//! never branch on the shape kind. Freehand outlines are closed polygons
//! filled with the scanline even-odd rule, sampled at pixel centers.

use image::{GrayImage, Luma, RgbaImage, imageops};
use std::collections::VecDeque;

/// Shape of a selection.
#[derive(Clone, Debug)]
pub enum SelectionShape {
    /// Inclusive pixel rectangle.
    Rectangle { min_x: u32, min_y: u32, max_x: u32, max_y: u32 },
    Ellipse { cx: f32, cy: f32, rx: f32, ry: f32 },
    /// Closed freehand outline; the last point connects back to the first.
    Polygon { points: Vec<(f32, f32)> },
    /// Arbitrary coverage mask (e.g. from the magic wand).
    Mask { mask: GrayImage },
}

impl SelectionShape {
    /// Returns 255 if the pixel (x, y) is inside the shape, 0 otherwise.
    /// Mask shapes return the stored coverage value.
    pub fn contains(&self, x: u32, y: u32) -> u8 {
        match self {
            SelectionShape::Rectangle { min_x, min_y, max_x, max_y } => {
                if x >= *min_x && x <= *max_x && y >= *min_y && y <= *max_y {
                    255
                } else {
                    0
                }
            }
            SelectionShape::Ellipse { cx, cy, rx, ry } => {
                if *rx <= 0.0 || *ry <= 0.0 {
                    return 0;
                }
                let dx = (x as f32 - cx) / rx;
                let dy = (y as f32 - cy) / ry;
                if dx * dx + dy * dy <= 1.0 { 255 } else { 0 }
            }
            SelectionShape::Polygon { points } => {
                if point_in_polygon(points, x as f32 + 0.5, y as f32 + 0.5) {
                    255
                } else {
                    0
                }
            }
            SelectionShape::Mask { mask } => {
                if x < mask.width() && y < mask.height() {
                    mask.get_pixel(x, y)[0]
                } else {
                    0
                }
            }
        }
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)` in pixel coordinates,
    /// clamped to the canvas.
    pub fn bounds(&self, canvas_w: u32, canvas_h: u32) -> (u32, u32, u32, u32) {
        let last_x = canvas_w.saturating_sub(1);
        let last_y = canvas_h.saturating_sub(1);
        match self {
            SelectionShape::Rectangle { min_x, min_y, max_x, max_y } => {
                (*min_x, *min_y, (*max_x).min(last_x), (*max_y).min(last_y))
            }
            SelectionShape::Ellipse { cx, cy, rx, ry } => (
                ((cx - rx).max(0.0).floor()) as u32,
                ((cy - ry).max(0.0).floor()) as u32,
                (((cx + rx).ceil()).max(0.0) as u32).min(last_x),
                (((cy + ry).ceil()).max(0.0) as u32).min(last_y),
            ),
            SelectionShape::Polygon { points } => {
                let mut min_x = f32::MAX;
                let mut min_y = f32::MAX;
                let mut max_x = f32::MIN;
                let mut max_y = f32::MIN;
                for &(x, y) in points {
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
                if points.is_empty() {
                    return (0, 0, 0, 0);
                }
                (
                    (min_x.max(0.0).floor()) as u32,
                    (min_y.max(0.0).floor()) as u32,
                    ((max_x.ceil()).max(0.0) as u32).min(last_x),
                    ((max_y.ceil()).max(0.0) as u32).min(last_y),
                )
            }
            SelectionShape::Mask { mask } => (
                0,
                0,
                mask.width().saturating_sub(1).min(last_x),
                mask.height().saturating_sub(1).min(last_y),
            ),
        }
    }

    /// Rasterize to a `width × height` coverage mask.
    pub fn rasterize_to_mask(&self, width: u32, height: u32) -> GrayImage {
        match self {
            SelectionShape::Polygon { points } => fill_polygon(points, width, height),
            SelectionShape::Mask { mask } => {
                if mask.dimensions() == (width, height) {
                    return mask.clone();
                }
                // Copy the overlapping region; the rest stays unselected.
                let mut out = GrayImage::new(width, height);
                for y in 0..height.min(mask.height()) {
                    for x in 0..width.min(mask.width()) {
                        out.put_pixel(x, y, *mask.get_pixel(x, y));
                    }
                }
                out
            }
            _ => GrayImage::from_fn(width, height, |x, y| Luma([self.contains(x, y)])),
        }
    }
}

/// Even-odd crossing test against the closed polygon, at an arbitrary
/// sample point.
fn point_in_polygon(points: &[(f32, f32)], px: f32, py: f32) -> bool {
    if points.len() < 3 {
        return false;
    }
    let mut inside = false;
    let n = points.len();
    for i in 0..n {
        let (x0, y0) = points[i];
        let (x1, y1) = points[(i + 1) % n];
        // Half-open span rule so a vertex on the ray is counted once.
        if (y0 <= py && y1 > py) || (y1 <= py && y0 > py) {
            let t = (py - y0) / (y1 - y0);
            if px < x0 + t * (x1 - x0) {
                inside = !inside;
            }
        }
    }
    inside
}

/// Scanline even-odd fill. Each scanline collects the x-crossings of the
/// outline at the row's center and fills between alternating pairs; a pixel
/// is covered when its center falls inside a span.
fn fill_polygon(points: &[(f32, f32)], width: u32, height: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    if points.len() < 3 {
        return mask;
    }
    let n = points.len();
    let mut crossings: Vec<f32> = Vec::with_capacity(n);

    for y in 0..height {
        let sy = y as f32 + 0.5;
        crossings.clear();
        for i in 0..n {
            let (x0, y0) = points[i];
            let (x1, y1) = points[(i + 1) % n];
            if (y0 <= sy && y1 > sy) || (y1 <= sy && y0 > sy) {
                let t = (sy - y0) / (y1 - y0);
                crossings.push(x0 + t * (x1 - x0));
            }
        }
        crossings.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        for pair in crossings.chunks_exact(2) {
            let (start, end) = (pair[0], pair[1]);
            let mut x = (start - 0.5).ceil().max(0.0) as u32;
            while x < width && (x as f32 + 0.5) < end {
                mask.put_pixel(x, y, Luma([255]));
                x += 1;
            }
        }
    }
    mask
}

/// Magic-wand mask: flood fill outward from the seed pixel, selecting every
/// 4-connected pixel whose RGB channels are each within `tolerance` of the
/// seed color.
pub fn magic_wand_mask(image: &RgbaImage, seed_x: u32, seed_y: u32, tolerance: u8) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut mask = GrayImage::new(width, height);
    if seed_x >= width || seed_y >= height {
        return mask;
    }

    let seed = *image.get_pixel(seed_x, seed_y);
    let within = |x: u32, y: u32| -> bool {
        let px = image.get_pixel(x, y);
        px[0].abs_diff(seed[0]) <= tolerance
            && px[1].abs_diff(seed[1]) <= tolerance
            && px[2].abs_diff(seed[2]) <= tolerance
    };

    let mut queue = VecDeque::new();
    queue.push_back((seed_x, seed_y));
    mask.put_pixel(seed_x, seed_y, Luma([255]));

    while let Some((x, y)) = queue.pop_front() {
        let visit = |nx: u32, ny: u32, mask: &mut GrayImage, queue: &mut VecDeque<(u32, u32)>| {
            if mask.get_pixel(nx, ny)[0] == 0 && within(nx, ny) {
                mask.put_pixel(nx, ny, Luma([255]));
                queue.push_back((nx, ny));
            }
        };
        if x > 0 {
            visit(x - 1, y, &mut mask, &mut queue);
        }
        if x + 1 < width {
            visit(x + 1, y, &mut mask, &mut queue);
        }
        if y > 0 {
            visit(x, y - 1, &mut mask, &mut queue);
        }
        if y + 1 < height {
            visit(x, y + 1, &mut mask, &mut queue);
        }
    }
    mask
}

/// Soften mask edges with a Gaussian blur of the given radius.
pub fn feather_mask(mask: &GrayImage, radius: f32) -> GrayImage {
    if radius <= 0.0 {
        return mask.clone();
    }
    imageops::blur(mask, radius)
}
