//! Watermark compositing for listing images.
//!
//! A base photo receives two marks:
//!
//! - **Vendor mark**: the dealer's logo, or its name rasterized as outlined
//!   text when no logo is supplied
//! - **Platform mark**: the marketplace logo
//!
//! Each mark is scaled to a fixed fraction of the base width with its aspect
//! ratio preserved, placed at symbolic positions, and blended with a shared
//! opacity. The result is encoded as WEBP (default), PNG or JPEG.
//!
//! # Configuration Example
//!
//! ```yaml
//! rasterizer:
//!   device_pixel_ratio: 2.0
//!   font_family: "Brand Sans, sans-serif"
//! compositor:
//!   default_positions: [bottom-left, top-right]
//!   default_opacity: 0.5
//! ```

pub mod blob;
pub mod canvas;
pub mod compositor;
pub mod encoder;
pub mod error;
pub mod fonts;
pub mod image_fetcher;
pub mod placement;
pub mod position;
pub mod text_renderer;

// Re-export main types for convenience
pub use blob::{BlobHandle, BlobRegistry};
pub use canvas::{
    Canvas, CanvasProvider, RasterCanvasProvider, RasterImage, UnavailableCanvasProvider,
};
pub use compositor::{
    plan_composition, target_size, CompositionReport, CompositionRequest, MarkKind,
    OverlayPlacement, WatermarkCompositor, WatermarkSpec,
};
pub use encoder::{encode, encode_image, EncodedImage, OutputFormat};
pub use error::WatermarkError;
pub use fonts::FontRegistry;
pub use image_fetcher::{CachedImage, ImageFetcher, ImageFetcherConfig, ImageSource};
pub use placement::{MarkRole, PlacementTable};
pub use position::{
    calculate_position, calculate_position_str, Dimensions, PlacementPosition, Position,
};
pub use text_renderer::{measure_text, TextMetrics, TextRasterizer, TextRenderOptions};
