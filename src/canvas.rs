use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;

// ============================================================================
// GEOMETRY
// ============================================================================

/// Axis-aligned pixel rectangle in canvas coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Bounds {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Full extent of a `width × height` canvas.
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, w: width, h: height }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Clamp to a `width × height` canvas. A rectangle starting outside the
    /// canvas collapses to empty.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            w: self.w.min(width - x),
            h: self.h.min(height - y),
        }
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = (self.x + self.w).max(other.x + other.w);
        let y1 = (self.y + self.h).max(other.y + other.h);
        Bounds { x: x0, y: y0, w: x1 - x0, h: y1 - y0 }
    }
}

// ============================================================================
// BLEND MODES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Additive,
    Subtract,
    Difference,
    Darken,
    Lighten,
}

impl BlendMode {
    /// Returns all blend modes for UI display.
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Additive,
            BlendMode::Subtract,
            BlendMode::Difference,
            BlendMode::Darken,
            BlendMode::Lighten,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::Additive => "Additive",
            BlendMode::Subtract => "Subtract",
            BlendMode::Difference => "Difference",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
        }
    }

    /// Convert to a stable u8 for binary interchange.
    pub fn to_u8(&self) -> u8 {
        match self {
            BlendMode::Normal => 0,
            BlendMode::Multiply => 1,
            BlendMode::Screen => 2,
            BlendMode::Overlay => 3,
            BlendMode::Additive => 4,
            BlendMode::Subtract => 5,
            BlendMode::Difference => 6,
            BlendMode::Darken => 7,
            BlendMode::Lighten => 8,
        }
    }

    /// Reconstruct from a u8 (defaults to Normal for unknown values).
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => BlendMode::Multiply,
            2 => BlendMode::Screen,
            3 => BlendMode::Overlay,
            4 => BlendMode::Additive,
            5 => BlendMode::Subtract,
            6 => BlendMode::Difference,
            7 => BlendMode::Darken,
            8 => BlendMode::Lighten,
            _ => BlendMode::Normal,
        }
    }
}

// ============================================================================
// LAYER
// ============================================================================

/// Layer opacity is an integer percentage; values above 100 are clamped on
/// use rather than rejected.
pub const MAX_OPACITY: u8 = 100;

#[derive(Debug)]
pub struct Layer {
    pub name: String,
    pub visible: bool,
    /// 0..=100 percent.
    pub opacity: u8,
    pub blend_mode: BlendMode,
    pub pixels: RgbaImage,
    /// Bumped on every pixel mutation. Background jobs capture the value at
    /// snapshot time; a mismatch at commit time means the result is stale.
    pub generation: u64,
}

impl Layer {
    /// New fully-transparent layer.
    pub fn new(name: String, width: u32, height: u32) -> Self {
        Self {
            name,
            visible: true,
            opacity: MAX_OPACITY,
            blend_mode: BlendMode::Normal,
            pixels: RgbaImage::new(width, height),
            generation: 0,
        }
    }

    /// Layer wrapping an existing raster (e.g. the decoded file a document
    /// was opened from).
    pub fn from_image(name: String, pixels: RgbaImage) -> Self {
        Self {
            name,
            visible: true,
            opacity: MAX_OPACITY,
            blend_mode: BlendMode::Normal,
            pixels,
            generation: 0,
        }
    }

    /// Install a new pixel buffer and advance the generation counter.
    pub fn replace_pixels(&mut self, pixels: RgbaImage) {
        self.pixels = pixels;
        self.generation = self.generation.wrapping_add(1);
    }
}

// ============================================================================
// CANVAS STATE — layer stack + compositor
// ============================================================================

/// Error type for layer-stack structure operations.
#[derive(Debug, PartialEq, Eq)]
pub enum LayerError {
    /// A document always keeps at least one layer.
    LastLayer,
    IndexOutOfRange { index: usize, len: usize },
}

impl std::fmt::Display for LayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerError::LastLayer => write!(f, "cannot remove the last remaining layer"),
            LayerError::IndexOutOfRange { index, len } => {
                write!(f, "layer index {} out of range (stack has {})", index, len)
            }
        }
    }
}

impl std::error::Error for LayerError {}

/// Ordered layer stack plus the canvas dimensions. Index 0 is the bottom
/// layer; compositing walks the array in order.
pub struct CanvasState {
    pub layers: Vec<Layer>,
    pub active_layer_index: usize,
    pub width: u32,
    pub height: u32,
    dirty_rect: Option<Bounds>,
}

impl CanvasState {
    /// Blank document: one transparent background layer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            layers: vec![Layer::new("Background".to_string(), width, height)],
            active_layer_index: 0,
            width,
            height,
            dirty_rect: Some(Bounds::full(width, height)),
        }
    }

    /// Document opened from a decoded image: a single layer holding it.
    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            layers: vec![Layer::from_image("Background".to_string(), image)],
            active_layer_index: 0,
            width,
            height,
            dirty_rect: Some(Bounds::full(width, height)),
        }
    }

    // ---- layer structure ----------------------------------------------------

    /// Append a new fully-transparent layer sized to the canvas and make it
    /// active.
    pub fn add_layer(&mut self) -> usize {
        let name = format!("Layer {}", self.layers.len() + 1);
        self.layers.push(Layer::new(name, self.width, self.height));
        self.active_layer_index = self.layers.len() - 1;
        self.mark_dirty(None);
        self.active_layer_index
    }

    /// Remove the active layer. Refused when it is the only one left.
    pub fn remove_active_layer(&mut self) -> Result<Layer, LayerError> {
        if self.layers.len() <= 1 {
            return Err(LayerError::LastLayer);
        }
        let removed = self.layers.remove(self.active_layer_index);
        if self.active_layer_index >= self.layers.len() {
            self.active_layer_index = self.layers.len() - 1;
        }
        self.mark_dirty(None);
        Ok(removed)
    }

    pub fn set_active_layer(&mut self, index: usize) -> Result<(), LayerError> {
        if index >= self.layers.len() {
            return Err(LayerError::IndexOutOfRange { index, len: self.layers.len() });
        }
        self.active_layer_index = index;
        Ok(())
    }

    pub fn active_layer(&self) -> &Layer {
        &self.layers[self.active_layer_index]
    }

    pub fn active_layer_mut(&mut self) -> &mut Layer {
        &mut self.layers[self.active_layer_index]
    }

    // ---- dirty tracking -----------------------------------------------------

    /// Record a region needing re-display. `None` marks the whole canvas.
    pub fn mark_dirty(&mut self, rect: Option<Bounds>) {
        let rect = rect.unwrap_or_else(|| Bounds::full(self.width, self.height));
        self.dirty_rect = Some(match self.dirty_rect {
            Some(existing) => existing.union(&rect),
            None => rect,
        });
    }

    /// Take the pending dirty region, leaving none.
    pub fn take_dirty(&mut self) -> Option<Bounds> {
        self.dirty_rect.take()
    }

    // ---- compositing --------------------------------------------------------

    /// Flatten the stack into a single raster.
    ///
    /// Layers are merged bottom-to-top. Hidden layers and layers at opacity
    /// 0 are skipped outright — they never reach the blend loop. A layer
    /// whose raster does not match the canvas dimensions is resampled to fit
    /// before blending (this is an anomaly; it is logged, not fatal).
    pub fn composite(&self) -> RgbaImage {
        // Resolve the stack once up front: skip rule + size recovery.
        let mut prepared: Vec<(std::borrow::Cow<RgbaImage>, BlendMode, u8)> =
            Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            if !layer.visible || layer.opacity == 0 {
                continue;
            }
            let pixels = if layer.pixels.dimensions() != (self.width, self.height) {
                crate::log_warn!(
                    "layer '{}' is {}x{}, canvas is {}x{} — resampling to fit",
                    layer.name,
                    layer.pixels.width(),
                    layer.pixels.height(),
                    self.width,
                    self.height
                );
                std::borrow::Cow::Owned(imageops::resize(
                    &layer.pixels,
                    self.width,
                    self.height,
                    imageops::FilterType::Lanczos3,
                ))
            } else {
                std::borrow::Cow::Borrowed(&layer.pixels)
            };
            let opacity = layer.opacity.min(MAX_OPACITY);
            prepared.push((pixels, layer.blend_mode, opacity));
        }

        let mut out = RgbaImage::new(self.width, self.height);
        if prepared.is_empty() {
            return out;
        }

        let width = self.width;
        let stride = width as usize * 4;
        let raw: &mut [u8] = &mut out;

        raw.par_chunks_exact_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as u32;
                for x in 0..width {
                    // Opaque-base skip: a fully-opaque Normal pixel at full
                    // opacity overwrites everything beneath it, so start
                    // blending from the deepest such layer.
                    let mut start = 0;
                    for (idx, (pixels, mode, opacity)) in prepared.iter().enumerate().rev() {
                        if *mode == BlendMode::Normal
                            && *opacity >= MAX_OPACITY
                            && pixels.get_pixel(x, y)[3] == 255
                        {
                            start = idx;
                            break;
                        }
                    }

                    let mut base = Rgba([0u8, 0, 0, 0]);
                    for (pixels, mode, opacity) in &prepared[start..] {
                        base = blend_pixel(base, *pixels.get_pixel(x, y), *mode, *opacity);
                    }

                    let off = x as usize * 4;
                    row[off..off + 4].copy_from_slice(&base.0);
                }
            });

        out
    }
}

// ============================================================================
// PER-PIXEL BLEND MATH
// ============================================================================

/// Scale an alpha byte by an opacity percentage, rounding half up.
#[inline]
pub fn scaled_alpha(alpha: u8, opacity: u8) -> u8 {
    let opacity = opacity.min(MAX_OPACITY) as u32;
    ((alpha as u32 * opacity + 50) / 100) as u8
}

/// Merge one layer pixel onto the accumulated composite beneath it.
///
/// The top pixel's alpha is first scaled by the layer opacity. `Normal` then
/// performs straight-alpha "over" compositing. Every other mode computes RGB
/// from the mode's formula at full strength and takes its output alpha
/// directly from the scaled top alpha — the alpha channel is overwritten,
/// not composited. Consumers rely on that asymmetry, so it is part of the
/// contract, not an implementation detail.
///
/// Float results convert back to bytes with round-half-up; this is the one
/// rounding convention used throughout the crate.
#[inline]
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: u8) -> Rgba<u8> {
    let top_a = scaled_alpha(top[3], opacity);

    if mode == BlendMode::Normal {
        // Fast paths: nothing to add / complete overwrite.
        if top_a == 0 {
            return base;
        }
        if top_a == 255 {
            return Rgba([top[0], top[1], top[2], 255]);
        }

        let ta = top_a as f32 / 255.0;
        let ba = base[3] as f32 / 255.0;
        let out_a = ta + ba * (1.0 - ta);
        if out_a <= 0.0 {
            return Rgba([0, 0, 0, 0]);
        }
        let blend = |t: u8, b: u8| -> u8 {
            let t = t as f32 / 255.0;
            let b = b as f32 / 255.0;
            let c = (t * ta + b * ba * (1.0 - ta)) / out_a;
            (c * 255.0).round().clamp(0.0, 255.0) as u8
        };
        return Rgba([
            blend(top[0], base[0]),
            blend(top[1], base[1]),
            blend(top[2], base[2]),
            (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
        ]);
    }

    let channel = |b: u8, t: u8| -> u8 {
        let b = b as f32 / 255.0;
        let t = t as f32 / 255.0;
        let c = match mode {
            BlendMode::Multiply => b * t,
            BlendMode::Screen => 1.0 - (1.0 - b) * (1.0 - t),
            BlendMode::Overlay => overlay_channel(b, t),
            BlendMode::Additive => (b + t).min(1.0),
            BlendMode::Subtract => (b - t).max(0.0),
            BlendMode::Difference => (b - t).abs(),
            BlendMode::Darken => b.min(t),
            BlendMode::Lighten => b.max(t),
            BlendMode::Normal => unreachable!(),
        };
        (c * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(base[0], top[0]),
        channel(base[1], top[1]),
        channel(base[2], top[2]),
        top_a,
    ])
}

/// Multiply in the shadows, screen in the highlights, switching on the base
/// sample.
fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(px))
    }

    #[test]
    fn blend_multiply() {
        let out = blend_pixel(
            Rgba([255, 128, 0, 255]),
            Rgba([128, 255, 255, 255]),
            BlendMode::Multiply,
            100,
        );
        assert_eq!(out, Rgba([128, 128, 0, 255]));
    }

    #[test]
    fn blend_screen() {
        let out = blend_pixel(
            Rgba([100, 0, 255, 255]),
            Rgba([100, 0, 255, 255]),
            BlendMode::Screen,
            100,
        );
        // 1 - (1 - 100/255)^2 = 0.6313... -> 161
        assert_eq!(out, Rgba([161, 0, 255, 255]));
    }

    #[test]
    fn blend_additive_clamps() {
        let out = blend_pixel(
            Rgba([200, 10, 0, 255]),
            Rgba([100, 10, 0, 255]),
            BlendMode::Additive,
            100,
        );
        assert_eq!(out, Rgba([255, 20, 0, 255]));
    }

    #[test]
    fn blend_subtract_clamps() {
        let out = blend_pixel(
            Rgba([100, 50, 0, 255]),
            Rgba([200, 20, 0, 255]),
            BlendMode::Subtract,
            100,
        );
        assert_eq!(out, Rgba([0, 30, 0, 255]));
    }

    #[test]
    fn blend_difference_darken_lighten() {
        let base = Rgba([200, 40, 90, 255]);
        let top = Rgba([60, 120, 90, 255]);
        assert_eq!(
            blend_pixel(base, top, BlendMode::Difference, 100),
            Rgba([140, 80, 0, 255])
        );
        assert_eq!(
            blend_pixel(base, top, BlendMode::Darken, 100),
            Rgba([60, 40, 90, 255])
        );
        assert_eq!(
            blend_pixel(base, top, BlendMode::Lighten, 100),
            Rgba([200, 120, 90, 255])
        );
    }

    #[test]
    fn blend_overlay_switches_on_base() {
        // Dark base: 2*b*t. 64/255 * 128/255 * 2 = 0.252... -> 64
        let dark = blend_pixel(
            Rgba([64, 64, 64, 255]),
            Rgba([128, 128, 128, 255]),
            BlendMode::Overlay,
            100,
        );
        assert_eq!(dark[0], 64);
        // Bright base: 1 - 2*(1-b)*(1-t).
        let bright = blend_pixel(
            Rgba([200, 200, 200, 255]),
            Rgba([128, 128, 128, 255]),
            BlendMode::Overlay,
            100,
        );
        assert_eq!(bright[0], 200);
    }

    #[test]
    fn non_normal_modes_take_alpha_from_top() {
        let base = Rgba([10, 20, 30, 255]);
        let top = Rgba([40, 50, 60, 200]);
        for &mode in BlendMode::all() {
            if mode == BlendMode::Normal {
                continue;
            }
            let out = blend_pixel(base, top, mode, 50);
            assert_eq!(out[3], scaled_alpha(200, 50), "mode {:?}", mode);
        }
    }

    #[test]
    fn scaled_alpha_rounds_half_up() {
        assert_eq!(scaled_alpha(255, 100), 255);
        assert_eq!(scaled_alpha(255, 50), 128); // 127.5 rounds up
        assert_eq!(scaled_alpha(255, 0), 0);
        assert_eq!(scaled_alpha(1, 50), 1); // 0.5 rounds up
        assert_eq!(scaled_alpha(255, 200), 255); // over-range opacity clamps
    }

    #[test]
    fn composite_single_opaque_layer_is_identity() {
        let img = RgbaImage::from_fn(8, 8, |x, y| {
            Rgba([x as u8 * 30, y as u8 * 30, 77, 255])
        });
        let state = CanvasState::from_image(img.clone());
        assert_eq!(state.composite().as_raw(), img.as_raw());
    }

    #[test]
    fn composite_red_under_half_blue() {
        // Red base, blue at alpha 128 on top, both Normal @ 100%:
        // straight-alpha over with round-half-up gives (127, 0, 128, 255).
        let mut state = CanvasState::from_image(solid(4, 4, [255, 0, 0, 255]));
        state.add_layer();
        state.active_layer_mut().pixels = solid(4, 4, [0, 0, 255, 128]);
        let out = state.composite();
        assert_eq!(out.get_pixel(2, 2), &Rgba([127, 0, 128, 255]));
    }

    #[test]
    fn hidden_layer_matches_removed_layer() {
        let mut state = CanvasState::from_image(solid(6, 6, [10, 200, 30, 255]));
        state.add_layer();
        state.active_layer_mut().pixels = solid(6, 6, [250, 0, 0, 180]);

        state.layers[1].visible = false;
        let hidden = state.composite();

        let removed_stack = CanvasState::from_image(solid(6, 6, [10, 200, 30, 255]));
        assert_eq!(hidden.as_raw(), removed_stack.composite().as_raw());
    }

    #[test]
    fn opacity_zero_contributes_nothing_in_every_mode() {
        for &mode in BlendMode::all() {
            let mut state = CanvasState::from_image(solid(4, 4, [90, 90, 90, 255]));
            state.add_layer();
            state.active_layer_mut().pixels = solid(4, 4, [255, 255, 0, 255]);
            state.layers[1].blend_mode = mode;
            state.layers[1].opacity = 0;
            let out = state.composite();
            assert_eq!(out.get_pixel(1, 1), &Rgba([90, 90, 90, 255]), "mode {:?}", mode);
        }
    }

    #[test]
    fn remove_last_layer_is_refused() {
        let mut state = CanvasState::new(4, 4);
        assert_eq!(state.remove_active_layer().unwrap_err(), LayerError::LastLayer);
        assert_eq!(state.layers.len(), 1);
    }

    #[test]
    fn remove_clamps_active_index() {
        let mut state = CanvasState::new(4, 4);
        state.add_layer();
        state.add_layer();
        assert_eq!(state.active_layer_index, 2);
        state.remove_active_layer().unwrap();
        assert_eq!(state.active_layer_index, 1);
    }

    #[test]
    fn set_active_rejects_out_of_range() {
        let mut state = CanvasState::new(4, 4);
        let err = state.set_active_layer(3).unwrap_err();
        assert_eq!(err, LayerError::IndexOutOfRange { index: 3, len: 1 });
        assert_eq!(state.active_layer_index, 0);
    }

    #[test]
    fn mismatched_layer_is_resampled_not_fatal() {
        let mut state = CanvasState::from_image(solid(8, 8, [0, 0, 0, 255]));
        state.add_layer();
        // Wrong-size layer: half the canvas in each dimension.
        state.active_layer_mut().pixels = solid(4, 4, [255, 255, 255, 255]);
        let out = state.composite();
        assert_eq!(out.dimensions(), (8, 8));
        // The resampled solid white covers the whole canvas.
        assert_eq!(out.get_pixel(7, 7), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn unknown_blend_mode_byte_falls_back_to_normal() {
        assert_eq!(BlendMode::from_u8(250), BlendMode::Normal);
        for &mode in BlendMode::all() {
            assert_eq!(BlendMode::from_u8(mode.to_u8()), mode);
        }
    }

    #[test]
    fn dirty_rects_merge() {
        let mut state = CanvasState::new(32, 32);
        state.take_dirty();
        state.mark_dirty(Some(Bounds::new(0, 0, 4, 4)));
        state.mark_dirty(Some(Bounds::new(8, 8, 4, 4)));
        assert_eq!(state.take_dirty(), Some(Bounds::new(0, 0, 12, 12)));
        assert_eq!(state.take_dirty(), None);
    }
}
