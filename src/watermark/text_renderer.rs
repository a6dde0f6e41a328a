//! Text watermark rasterization.
//!
//! Renders a string as white glyphs with a thin black outline onto a
//! transparent bitmap cropped tightly around the glyphs. The outline comes
//! from four black copies of the text offset by one device pixel left, right,
//! up and down, with the white fill drawn on top.
//!
//! Rendering happens on an oversized working canvas so that no glyph is
//! clipped, then the canvas is trimmed to the alpha bounding box and padded
//! by [`TRIM_PADDING`] pixels on every side.

use super::blob::{BlobHandle, BlobRegistry};
use super::canvas::{Canvas, CanvasProvider, RasterImage};
use super::encoder::{encode_image, OutputFormat};
use super::WatermarkError;
use ab_glyph::{point, Font, FontArc, GlyphId, PxScale, ScaleFont};
use bytes::Bytes;
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use tracing::{debug, warn};

/// Font size in logical pixels, before the device pixel ratio.
pub const BASE_FONT_SIZE: f32 = 50.0;

/// Working canvas height as a multiple of the tallest text extent.
const CANVAS_HEIGHT_FACTOR: f32 = 5.0;

/// Working canvas width as a multiple of the widest text extent.
const CANVAS_WIDTH_FACTOR: f32 = 2.0;

/// Transparent margin kept around the trimmed glyphs, per side.
pub const TRIM_PADDING: u32 = 10;

const FILL_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const OUTLINE_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Options for rasterizing one string.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRenderOptions {
    pub text: String,
    /// CSS-style family list, e.g. `"Brand Sans, sans-serif"`.
    pub font_family: String,
    pub device_pixel_ratio: f32,
}

impl TextRenderOptions {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = family.into();
        self
    }

    pub fn with_device_pixel_ratio(mut self, dpr: f32) -> Self {
        self.device_pixel_ratio = dpr;
        self
    }

    /// Font size in device pixels.
    pub fn font_size(&self) -> f32 {
        BASE_FONT_SIZE * self.device_pixel_ratio
    }

    fn validate(&self) -> Result<(), WatermarkError> {
        if !self.device_pixel_ratio.is_finite() || self.device_pixel_ratio <= 0.0 {
            return Err(WatermarkError::ConfigError(format!(
                "device pixel ratio must be a positive number, got {}",
                self.device_pixel_ratio
            )));
        }
        if self.text.trim().is_empty() {
            return Err(WatermarkError::RenderError(
                "Cannot render empty text".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TextRenderOptions {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_family: "sans-serif".to_string(),
            device_pixel_ratio: 1.0,
        }
    }
}

/// Text measurements in device pixels.
///
/// `actual_*` values come from the union of the glyph outlines laid out on a
/// baseline at the origin; `font_*` values come from the face itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub advance_width: f32,
    /// Distance from the origin to the leftmost inked pixel (positive = left).
    pub actual_left: f32,
    pub actual_right: f32,
    pub actual_ascent: f32,
    pub actual_descent: f32,
    pub font_ascent: f32,
    pub font_descent: f32,
}

impl TextMetrics {
    /// Working canvas size that holds the text with room to spare.
    pub fn working_canvas_size(&self) -> (u32, u32) {
        let tallest = (self.actual_ascent + self.actual_descent)
            .max(self.font_ascent + self.font_descent);
        let widest = self
            .advance_width
            .max(self.actual_left + self.actual_right);

        let width = (CANVAS_WIDTH_FACTOR * widest).ceil().max(1.0) as u32;
        let height = (CANVAS_HEIGHT_FACTOR * tallest).ceil().max(1.0) as u32;
        (width, height)
    }
}

/// Scale at which one em equals `size` pixels, matching CSS `font-size`.
fn em_scale(font: &FontArc, size: f32) -> PxScale {
    match font.units_per_em() {
        Some(units_per_em) if units_per_em > 0.0 => {
            PxScale::from(size * font.height_unscaled() / units_per_em)
        }
        _ => PxScale::from(size),
    }
}

/// Glyph ids with their pen x offsets, kerning applied.
fn layout(font: &FontArc, scale: PxScale, text: &str) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(scale);
    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor = 0.0f32;
    let mut previous: Option<GlyphId> = None;

    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = previous {
            cursor += scaled.kern(prev, id);
        }
        glyphs.push((id, cursor));
        cursor += scaled.h_advance(id);
        previous = Some(id);
    }

    (glyphs, cursor)
}

/// Measure `text` at `size` device pixels.
pub fn measure_text(font: &FontArc, text: &str, size: f32) -> TextMetrics {
    let scale = em_scale(font, size);
    let scaled = font.as_scaled(scale);
    let (glyphs, advance_width) = layout(font, scale, text);

    let mut min_x = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_y = f32::NEG_INFINITY;

    for (id, x) in &glyphs {
        let glyph = id.with_scale_and_position(scale, point(*x, 0.0));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            min_x = min_x.min(bounds.min.x);
            max_x = max_x.max(bounds.max.x);
            min_y = min_y.min(bounds.min.y);
            max_y = max_y.max(bounds.max.y);
        }
    }

    let inked = min_x.is_finite();
    TextMetrics {
        advance_width,
        actual_left: if inked { -min_x } else { 0.0 },
        actual_right: if inked { max_x } else { 0.0 },
        actual_ascent: if inked { -min_y } else { 0.0 },
        actual_descent: if inked { max_y } else { 0.0 },
        font_ascent: scaled.ascent(),
        font_descent: -scaled.descent(),
    }
}

/// Rasterizes text watermarks through a [`CanvasProvider`].
#[derive(Clone)]
pub struct TextRasterizer {
    provider: Arc<dyn CanvasProvider>,
}

impl std::fmt::Debug for TextRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRasterizer")
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl TextRasterizer {
    pub fn new(provider: Arc<dyn CanvasProvider>) -> Self {
        Self { provider }
    }

    /// Render `options.text` to a tightly trimmed bitmap.
    pub fn rasterize(&self, options: &TextRenderOptions) -> Result<RasterImage, WatermarkError> {
        options.validate()?;

        let font = self.provider.font(&options.font_family)?;
        let size = options.font_size();
        let metrics = measure_text(&font, &options.text, size);
        let (width, height) = metrics.working_canvas_size();

        let mut canvas = self.provider.create_canvas(width, height)?;

        // Top baseline: the em box top sits at the draw point.
        let origin_x = width as f32 / 4.0;
        let baseline_y = height as f32 / 4.0 + metrics.font_ascent;
        let outline = options.device_pixel_ratio;

        for (dx, dy) in [(-outline, 0.0), (outline, 0.0), (0.0, -outline), (0.0, outline)] {
            fill_text(
                &mut canvas,
                &font,
                size,
                &options.text,
                origin_x + dx,
                baseline_y + dy,
                OUTLINE_COLOR,
            );
        }
        fill_text(
            &mut canvas,
            &font,
            size,
            &options.text,
            origin_x,
            baseline_y,
            FILL_COLOR,
        );

        let bounds = alpha_bounds(canvas.as_image()).ok_or_else(|| {
            warn!(text = %options.text, "Text produced no visible glyphs");
            WatermarkError::RenderError(format!(
                "text '{}' has no visible glyphs",
                options.text
            ))
        })?;
        let trimmed = crop_with_padding(canvas.as_image(), bounds, TRIM_PADDING);

        debug!(
            text_len = options.text.len(),
            dpr = options.device_pixel_ratio,
            working_width = width,
            working_height = height,
            width = trimmed.width(),
            height = trimmed.height(),
            "Rasterized text watermark"
        );

        Ok(RasterImage::new(trimmed))
    }

    /// [`rasterize`](Self::rasterize) on the blocking thread pool.
    pub async fn rasterize_async(
        &self,
        options: TextRenderOptions,
    ) -> Result<RasterImage, WatermarkError> {
        let rasterizer = self.clone();
        tokio::task::spawn_blocking(move || rasterizer.rasterize(&options)).await?
    }

    /// Rasterize and register the PNG encoding as a temporary blob.
    pub fn rasterize_to_blob(
        &self,
        options: &TextRenderOptions,
        blobs: &BlobRegistry,
    ) -> Result<BlobHandle, WatermarkError> {
        let image = self.rasterize(options)?;
        let encoded = encode_image(image.pixels(), OutputFormat::Png, 100)?;
        Ok(blobs.create(Bytes::from(encoded.data), Some(OutputFormat::Png.content_type())))
    }
}

/// Draw `text` in a solid `color` with the baseline at (`x`, `baseline_y`).
fn fill_text(
    canvas: &mut Canvas,
    font: &FontArc,
    size: f32,
    text: &str,
    x: f32,
    baseline_y: f32,
    color: Rgba<u8>,
) {
    let (width, height) = (canvas.width(), canvas.height());
    let scale = em_scale(font, size);
    let (glyphs, _) = layout(font, scale, text);

    // Coverage of the whole string; overlapping glyphs take the max, like a
    // single filled path.
    let mut coverage = vec![0.0f32; width as usize * height as usize];
    for (id, offset) in glyphs {
        let glyph = id.with_scale_and_position(scale, point(x + offset, baseline_y));
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|gx, gy, c| {
            let px = gx as i64 + bounds.min.x as i64;
            let py = gy as i64 + bounds.min.y as i64;
            if px >= 0 && py >= 0 && px < width as i64 && py < height as i64 {
                let idx = py as usize * width as usize + px as usize;
                coverage[idx] = coverage[idx].max(c);
            }
        });
    }

    let layer = RgbaImage::from_fn(width, height, |px, py| {
        let c = coverage[py as usize * width as usize + px as usize];
        let alpha = (c.clamp(0.0, 1.0) * color[3] as f32).round() as u8;
        Rgba([color[0], color[1], color[2], alpha])
    });
    canvas.draw_image(&RasterImage::new(layer), 0.0, 0.0, width, height);
}

/// Inclusive bounding box of non-transparent pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphaBounds {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl AlphaBounds {
    pub fn width(&self) -> u32 {
        self.right - self.left + 1
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top + 1
    }
}

/// Scan the alpha channel from all four edges. `None` if fully transparent.
pub fn alpha_bounds(image: &RgbaImage) -> Option<AlphaBounds> {
    let mut bounds: Option<AlphaBounds> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[3] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => AlphaBounds {
                left: x,
                top: y,
                right: x,
                bottom: y,
            },
            Some(b) => AlphaBounds {
                left: b.left.min(x),
                top: b.top.min(y),
                right: b.right.max(x),
                bottom: b.bottom.max(y),
            },
        });
    }
    bounds
}

/// Copy `bounds` out of `image` onto a transparent bitmap with `padding`
/// pixels on every side.
pub fn crop_with_padding(image: &RgbaImage, bounds: AlphaBounds, padding: u32) -> RgbaImage {
    let mut output = RgbaImage::new(bounds.width() + 2 * padding, bounds.height() + 2 * padding);
    for y in 0..bounds.height() {
        for x in 0..bounds.width() {
            let pixel = *image.get_pixel(bounds.left + x, bounds.top + y);
            output.put_pixel(x + padding, y + padding, pixel);
        }
    }
    output
}
