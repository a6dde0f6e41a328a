//! Drawing surfaces for watermark composition.
//!
//! - [`RasterImage`]: a decoded RGBA bitmap
//! - [`Canvas`]: a mutable surface with a global alpha, drawn with the
//!   Porter-Duff "over" operator
//! - [`CanvasProvider`]: the rendering capability, selected once at startup.
//!   [`RasterCanvasProvider`] renders on the CPU; [`UnavailableCanvasProvider`]
//!   stands in for environments without rendering support and reports
//!   [`WatermarkError::Environment`] instead of drawing.

use super::fonts::FontRegistry;
use super::{Dimensions, WatermarkError};
use ab_glyph::FontArc;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::Arc;

/// Largest width or height a canvas may have.
pub const MAX_CANVAS_DIMENSION: u32 = 32_767;

/// Largest pixel count a canvas may have.
pub const MAX_CANVAS_AREA: u64 = 268_435_456;

/// A decoded RGBA bitmap.
#[derive(Clone, PartialEq)]
pub struct RasterImage {
    pixels: RgbaImage,
}

impl std::fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterImage")
            .field("dimensions", &(self.pixels.width(), self.pixels.height()))
            .finish()
    }
}

impl RasterImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self {
            pixels: image.into_rgba8(),
        }
    }

    /// Decode encoded image bytes, detecting the format from magic bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, WatermarkError> {
        image::load_from_memory(bytes)
            .map(Self::from_dynamic)
            .map_err(|e| WatermarkError::DecodeError(e.to_string()))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.pixels.width(), self.pixels.height())
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }
}

/// Mutable drawing surface.
#[derive(Clone)]
pub struct Canvas {
    surface: RgbaImage,
    global_alpha: f32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            surface: RgbaImage::new(0, 0),
            global_alpha: 1.0,
        }
    }
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("dimensions", &(self.surface.width(), self.surface.height()))
            .field("global_alpha", &self.global_alpha)
            .finish()
    }
}

impl Canvas {
    /// Create a transparent canvas.
    pub fn new(width: u32, height: u32) -> Result<Self, WatermarkError> {
        check_canvas_size(width, height)?;
        Ok(Self {
            surface: RgbaImage::new(width, height),
            global_alpha: 1.0,
        })
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.surface.width(), self.surface.height())
    }

    /// Resize the surface. Like a browser canvas, resizing discards content
    /// and resets the global alpha.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), WatermarkError> {
        check_canvas_size(width, height)?;
        self.surface = RgbaImage::new(width, height);
        self.global_alpha = 1.0;
        Ok(())
    }

    /// Set every pixel to transparent black.
    pub fn clear(&mut self) {
        for pixel in self.surface.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    pub fn global_alpha(&self) -> f32 {
        self.global_alpha
    }

    /// Set the opacity applied to every subsequent draw. Values outside
    /// `[0, 1]` or non-finite values are ignored, matching canvas semantics.
    pub fn set_global_alpha(&mut self, alpha: f32) {
        if alpha.is_finite() && (0.0..=1.0).contains(&alpha) {
            self.global_alpha = alpha;
        }
    }

    /// Draw `image` scaled to `width` x `height` with its top-left corner at
    /// (`x`, `y`). Offsets snap to the nearest pixel; anything outside the
    /// surface is clipped.
    ///
    /// Only the part of the source that lands on the surface is resampled,
    /// so the cost follows the visible area rather than the target size.
    pub fn draw_image(&mut self, image: &RasterImage, x: f64, y: f64, width: u32, height: u32) {
        if width == 0 || height == 0 || image.width() == 0 || image.height() == 0 {
            return;
        }

        let (px, py) = (x.round() as i64, y.round() as i64);
        let (Some(cols), Some(rows)) = (
            visible_span(px, width, image.width(), self.surface.width()),
            visible_span(py, height, image.height(), self.surface.height()),
        ) else {
            return;
        };

        let cropped;
        let source = if cols.src_len == image.width() && rows.src_len == image.height() {
            image.pixels()
        } else {
            cropped = imageops::crop_imm(
                image.pixels(),
                cols.src_start,
                rows.src_start,
                cols.src_len,
                rows.src_len,
            )
            .to_image();
            &cropped
        };

        let scaled;
        let source = if source.dimensions() == (cols.dst_len, rows.dst_len) {
            source
        } else {
            scaled = imageops::resize(source, cols.dst_len, rows.dst_len, FilterType::Lanczos3);
            &scaled
        };

        blend_onto(
            &mut self.surface,
            source,
            cols.dst_offset,
            rows.dst_offset,
            self.global_alpha,
        );
    }

    /// Read a single pixel; `None` outside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        if x < self.surface.width() && y < self.surface.height() {
            Some(*self.surface.get_pixel(x, y))
        } else {
            None
        }
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn into_image(self) -> RgbaImage {
        self.surface
    }

    /// Snapshot the surface as a standalone bitmap.
    pub fn to_raster(&self) -> RasterImage {
        RasterImage::new(self.surface.clone())
    }
}

fn check_canvas_size(width: u32, height: u32) -> Result<(), WatermarkError> {
    if width > MAX_CANVAS_DIMENSION || height > MAX_CANVAS_DIMENSION {
        return Err(WatermarkError::CompositeError(format!(
            "canvas {}x{} exceeds maximum dimension {}",
            width, height, MAX_CANVAS_DIMENSION
        )));
    }
    if width as u64 * height as u64 > MAX_CANVAS_AREA {
        return Err(WatermarkError::CompositeError(format!(
            "canvas {}x{} exceeds maximum area {}",
            width, height, MAX_CANVAS_AREA
        )));
    }
    Ok(())
}

/// Source pixels kept on each side of the visible range so the resampling
/// filter sees the same neighbourhood as a full-size resize.
const RESAMPLE_MARGIN: i64 = 3;

/// One axis of a clipped draw: the source range to resample and where its
/// scaled copy lands on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AxisSpan {
    src_start: u32,
    src_len: u32,
    dst_offset: i64,
    dst_len: u32,
}

/// Map the on-surface part of `[origin, origin + dst_len)` back to source
/// pixels. `None` when nothing is visible.
fn visible_span(origin: i64, dst_len: u32, src_len: u32, limit: u32) -> Option<AxisSpan> {
    let start = origin.max(0);
    let end = (origin + dst_len as i64).min(limit as i64);
    if start >= end {
        return None;
    }

    let scale = dst_len as f64 / src_len as f64;
    let first = ((start - origin) as f64 / scale).floor() as i64 - RESAMPLE_MARGIN;
    let last = ((end - origin) as f64 / scale).ceil() as i64 + RESAMPLE_MARGIN;
    let src_start = first.clamp(0, src_len as i64 - 1);
    let src_end = last.clamp(src_start + 1, src_len as i64);

    let dst_start = (src_start as f64 * scale).round() as i64;
    let dst_end = if src_end == src_len as i64 {
        dst_len as i64
    } else {
        (src_end as f64 * scale).round() as i64
    };

    Some(AxisSpan {
        src_start: src_start as u32,
        src_len: (src_end - src_start) as u32,
        dst_offset: origin + dst_start,
        dst_len: (dst_end - dst_start).max(1) as u32,
    })
}

/// Blend `source` onto `target` at (`x`, `y`) with an extra opacity factor.
pub(crate) fn blend_onto(
    target: &mut RgbaImage,
    source: &RgbaImage,
    x: i64,
    y: i64,
    opacity: f32,
) {
    let target_width = target.width() as i64;
    let target_height = target.height() as i64;

    let x_start = x.max(0);
    let y_start = y.max(0);
    let x_end = (x + source.width() as i64).min(target_width);
    let y_end = (y + source.height() as i64).min(target_height);

    for ty in y_start..y_end {
        for tx in x_start..x_end {
            let src = *source.get_pixel((tx - x) as u32, (ty - y) as u32);
            let dst = target.get_pixel_mut(tx as u32, ty as u32);
            *dst = blend_pixels(*dst, src, opacity);
        }
    }
}

/// Porter-Duff "over" with an additional opacity applied to the foreground.
pub(crate) fn blend_pixels(
    background: Rgba<u8>,
    foreground: Rgba<u8>,
    opacity: f32,
) -> Rgba<u8> {
    let fg_alpha = (foreground[3] as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    if fg_alpha <= 0.0 {
        return background;
    }
    let bg_alpha = background[3] as f32 / 255.0;

    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);
    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend_channel = |fg: u8, bg: u8| -> u8 {
        let fg_f = fg as f32 / 255.0;
        let bg_f = bg as f32 / 255.0;
        let result = (fg_f * fg_alpha + bg_f * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        (result * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend_channel(foreground[0], background[0]),
        blend_channel(foreground[1], background[1]),
        blend_channel(foreground[2], background[2]),
        (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Rendering capability: allocates canvases and resolves fonts.
pub trait CanvasProvider: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    /// Allocate a transparent canvas.
    fn create_canvas(&self, width: u32, height: u32) -> Result<Canvas, WatermarkError>;

    /// Resolve a font family list to a face.
    fn font(&self, families: &str) -> Result<FontArc, WatermarkError>;
}

/// CPU rendering backed by the `image` and `ab_glyph` crates.
#[derive(Debug, Clone)]
pub struct RasterCanvasProvider {
    fonts: Arc<FontRegistry>,
}

impl RasterCanvasProvider {
    pub fn new(fonts: FontRegistry) -> Self {
        Self {
            fonts: Arc::new(fonts),
        }
    }

    /// Provider with only the embedded font.
    pub fn with_default_fonts() -> Result<Self, WatermarkError> {
        Ok(Self::new(FontRegistry::new()?))
    }

    pub fn fonts(&self) -> &FontRegistry {
        &self.fonts
    }
}

impl CanvasProvider for RasterCanvasProvider {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn create_canvas(&self, width: u32, height: u32) -> Result<Canvas, WatermarkError> {
        Canvas::new(width, height)
    }

    fn font(&self, families: &str) -> Result<FontArc, WatermarkError> {
        Ok(self.fonts.resolve(families))
    }
}

/// Provider for environments without rendering support.
#[derive(Debug, Clone, Default)]
pub struct UnavailableCanvasProvider {
    reason: String,
}

impl UnavailableCanvasProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> WatermarkError {
        let reason = if self.reason.is_empty() {
            "no canvas provider configured"
        } else {
            self.reason.as_str()
        };
        WatermarkError::Environment(reason.to_string())
    }
}

impl CanvasProvider for UnavailableCanvasProvider {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn create_canvas(&self, _width: u32, _height: u32) -> Result<Canvas, WatermarkError> {
        Err(self.error())
    }

    fn font(&self, _families: &str) -> Result<FontArc, WatermarkError> {
        Err(self.error())
    }
}
