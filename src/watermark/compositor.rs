//! Watermark compositor.
//!
//! Draws a base image and two marks onto a shared canvas:
//!
//! - the **vendor** mark, either a fetched logo or rasterized text, scaled to
//!   one sixth of the base width
//! - the **platform** mark, always a fetched logo, scaled to base width / 3.5
//!
//! Both marks keep their aspect ratio. For every requested position the
//! [`PlacementTable`] picks which mark is drawn there; all marks share one
//! global opacity.
//!
//! # Example
//!
//! ```ignore
//! let request = CompositionRequest::new(base, WatermarkSpec::text("Acme Motors"), platform_url)
//!     .with_positions(vec![Position::BottomLeft, Position::TopRight])
//!     .with_opacity(0.5);
//!
//! let mut canvas = Canvas::default();
//! let report = compositor.compose(&mut canvas, &request).await?;
//! let webp = encoder::encode(&canvas, OutputFormat::WebP, 80)?;
//! ```

use super::canvas::{Canvas, RasterImage};
use super::image_fetcher::ImageFetcher;
use super::placement::{MarkRole, PlacementTable};
use super::position::{calculate_position, Dimensions, PlacementPosition};
use super::text_renderer::{TextRasterizer, TextRenderOptions};
use super::{Position, WatermarkError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Vendor mark width is the base width divided by this.
pub const VENDOR_WIDTH_DIVISOR: f64 = 6.0;

/// Platform mark width is the base width divided by this.
pub const PLATFORM_WIDTH_DIVISOR: f64 = 3.5;

/// How the vendor mark's source is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkKind {
    /// Source is a fetchable image location.
    Image,
    /// Source is literal text to rasterize.
    Text,
}

impl MarkKind {
    /// `"image"` selects [`MarkKind::Image`]; any other value is text.
    pub fn from_discriminator(value: &str) -> Self {
        if value == "image" {
            Self::Image
        } else {
            Self::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkSpec {
    pub kind: MarkKind,
    pub source: String,
}

impl WatermarkSpec {
    pub fn image(source: impl Into<String>) -> Self {
        Self {
            kind: MarkKind::Image,
            source: source.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: MarkKind::Text,
            source: text.into(),
        }
    }
}

/// Everything needed for one composition.
#[derive(Debug, Clone)]
pub struct CompositionRequest {
    pub base_image: Arc<RasterImage>,
    pub vendor_mark: WatermarkSpec,
    /// Location of the platform logo.
    pub platform_source: String,
    /// Drawn in order; duplicates are drawn again.
    pub positions: Vec<Position>,
    /// Global alpha shared by every overlay, 0.0 to 1.0.
    pub opacity: f32,
}

impl CompositionRequest {
    /// Request with the default positions (`bottom-left`, `top-right`) and
    /// opacity 0.5.
    pub fn new(
        base_image: Arc<RasterImage>,
        vendor_mark: WatermarkSpec,
        platform_source: impl Into<String>,
    ) -> Self {
        Self {
            base_image,
            vendor_mark,
            platform_source: platform_source.into(),
            positions: vec![Position::BottomLeft, Position::TopRight],
            opacity: 0.5,
        }
    }

    pub fn with_positions(mut self, positions: Vec<Position>) -> Self {
        self.positions = positions;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

/// Scale `source` to `target_width`, keeping its aspect ratio.
///
/// Width and height round half away from zero, minimum 1.
pub fn target_size(source: &Dimensions, target_width: f64) -> Result<Dimensions, WatermarkError> {
    if source.width == 0 || source.height == 0 {
        return Err(WatermarkError::CompositeError(format!(
            "overlay has zero size {}x{}",
            source.width, source.height
        )));
    }

    let target_height = target_width / source.aspect_ratio();
    Ok(Dimensions::new(
        round_dimension(target_width),
        round_dimension(target_height),
    ))
}

fn round_dimension(value: f64) -> u32 {
    value.round().clamp(1.0, u32::MAX as f64) as u32
}

/// One overlay drawn during a composition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayPlacement {
    pub position: Position,
    pub role: MarkRole,
    /// Offset before snapping to pixels.
    pub offset: PlacementPosition,
    pub size: Dimensions,
}

/// Geometry of a composition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionReport {
    pub canvas: Dimensions,
    pub opacity: f32,
    pub vendor_size: Dimensions,
    pub platform_size: Dimensions,
    pub placements: Vec<OverlayPlacement>,
}

impl CompositionReport {
    /// Number of overlays drawn for `role`.
    pub fn count(&self, role: MarkRole) -> usize {
        self.placements.iter().filter(|p| p.role == role).count()
    }
}

/// Compute where every overlay goes, without drawing anything.
pub fn plan_composition(
    placement: &PlacementTable,
    base: Dimensions,
    vendor_source: Dimensions,
    platform_source: Dimensions,
    positions: &[Position],
    opacity: f32,
) -> Result<CompositionReport, WatermarkError> {
    let base_width = base.width as f64;
    let vendor_size = target_size(&vendor_source, base_width / VENDOR_WIDTH_DIVISOR)?;
    let platform_size = target_size(&platform_source, base_width / PLATFORM_WIDTH_DIVISOR)?;

    let placements = positions
        .iter()
        .map(|&position| {
            let role = placement.role_for(position);
            let size = match role {
                MarkRole::Vendor => vendor_size,
                MarkRole::Platform => platform_size,
            };
            OverlayPlacement {
                position,
                role,
                offset: calculate_position(position, &size, &base),
                size,
            }
        })
        .collect();

    Ok(CompositionReport {
        canvas: base,
        opacity,
        vendor_size,
        platform_size,
        placements,
    })
}

/// Composites vendor and platform marks onto a base image.
#[derive(Debug, Clone)]
pub struct WatermarkCompositor {
    fetcher: ImageFetcher,
    rasterizer: TextRasterizer,
    placement: PlacementTable,
    font_family: String,
    device_pixel_ratio: f32,
}

impl WatermarkCompositor {
    pub fn new(fetcher: ImageFetcher, rasterizer: TextRasterizer) -> Self {
        Self {
            fetcher,
            rasterizer,
            placement: PlacementTable::default(),
            font_family: "sans-serif".to_string(),
            device_pixel_ratio: 1.0,
        }
    }

    pub fn with_placement(mut self, placement: PlacementTable) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = family.into();
        self
    }

    pub fn with_device_pixel_ratio(mut self, dpr: f32) -> Self {
        self.device_pixel_ratio = dpr;
        self
    }

    pub fn placement(&self) -> &PlacementTable {
        &self.placement
    }

    pub fn fetcher(&self) -> &ImageFetcher {
        &self.fetcher
    }

    /// Composite `request` onto `canvas`.
    ///
    /// The canvas is resized to the base image, cleared and filled with the
    /// base before any overlay is resolved. On error the canvas holds
    /// whatever was drawn so far.
    pub async fn compose(
        &self,
        canvas: &mut Canvas,
        request: &CompositionRequest,
    ) -> Result<CompositionReport, WatermarkError> {
        self.compose_inner(canvas, request).await.map_err(|e| {
            warn!(
                vendor_kind = ?request.vendor_mark.kind,
                platform = %request.platform_source,
                error = %e,
                "Watermark composition failed"
            );
            e
        })
    }

    async fn compose_inner(
        &self,
        canvas: &mut Canvas,
        request: &CompositionRequest,
    ) -> Result<CompositionReport, WatermarkError> {
        validate_opacity(request.opacity)?;

        let base = &request.base_image;
        if base.width() == 0 || base.height() == 0 {
            return Err(WatermarkError::CompositeError(
                "base image has zero size".to_string(),
            ));
        }

        canvas.resize(base.width(), base.height())?;
        canvas.clear();
        canvas.draw_image(base, 0.0, 0.0, base.width(), base.height());
        canvas.set_global_alpha(request.opacity);

        let (vendor, platform) = tokio::try_join!(
            self.resolve_vendor(&request.vendor_mark),
            self.resolve_platform(&request.platform_source)
        )?;

        let report = plan_composition(
            &self.placement,
            base.dimensions(),
            vendor.dimensions(),
            platform.dimensions(),
            &request.positions,
            request.opacity,
        )?;

        for overlay in &report.placements {
            let image = match overlay.role {
                MarkRole::Vendor => &vendor,
                MarkRole::Platform => &platform,
            };
            debug!(
                position = %overlay.position,
                role = overlay.role.as_str(),
                x = overlay.offset.x,
                y = overlay.offset.y,
                width = overlay.size.width,
                height = overlay.size.height,
                "Drawing overlay"
            );
            canvas.draw_image(
                image,
                overlay.offset.x,
                overlay.offset.y,
                overlay.size.width,
                overlay.size.height,
            );
        }

        info!(
            width = base.width(),
            height = base.height(),
            overlays = report.placements.len(),
            opacity = request.opacity,
            "Composited watermarks"
        );

        Ok(report)
    }

    async fn resolve_vendor(
        &self,
        spec: &WatermarkSpec,
    ) -> Result<Arc<RasterImage>, WatermarkError> {
        match spec.kind {
            MarkKind::Image => Ok(self.fetcher.fetch(&spec.source).await?.image),
            MarkKind::Text => {
                let options = TextRenderOptions::new(spec.source.clone())
                    .with_font_family(self.font_family.clone())
                    .with_device_pixel_ratio(self.device_pixel_ratio);
                let image = self.rasterizer.rasterize_async(options).await?;
                Ok(Arc::new(image))
            }
        }
    }

    async fn resolve_platform(&self, source: &str) -> Result<Arc<RasterImage>, WatermarkError> {
        Ok(self.fetcher.fetch(source).await?.image)
    }
}

fn validate_opacity(opacity: f32) -> Result<(), WatermarkError> {
    if opacity.is_finite() && (0.0..=1.0).contains(&opacity) {
        Ok(())
    } else {
        Err(WatermarkError::ConfigError(format!(
            "opacity must be between 0.0 and 1.0, got {}",
            opacity
        )))
    }
}
