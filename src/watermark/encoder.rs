//! Output encoding for composited canvases.
//!
//! A trait-based encoder per output format, selected through
//! [`EncoderFactory`]. WEBP is the default artifact format; PNG and JPEG are
//! available for callers that need them.

use super::canvas::Canvas;
use super::WatermarkError;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use tracing::debug;

/// Default encoding quality (1-100).
pub const DEFAULT_QUALITY: u8 = 80;

/// Encoded output format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[value(name = "webp")]
    WebP,
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::WebP => "image/webp",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::WebP => "webp",
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    /// Guess a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "webp" => Some(Self::WebP),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WebP => "webp",
            Self::Png => "png",
            Self::Jpeg => "jpeg",
        })
    }
}

/// Result of encoding an image.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Encodes RGBA pixels into one output format.
pub trait ImageEncoder: Send + Sync {
    fn format(&self) -> OutputFormat;

    /// Encode RGBA8 pixel data (4 bytes per pixel) at `quality` (1-100).
    fn encode(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Vec<u8>, WatermarkError>;

    fn supports_transparency(&self) -> bool;
}

/// Lossy WEBP via libwebp; quality 100 switches to lossless.
pub struct WebPEncoder;

impl ImageEncoder for WebPEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::WebP
    }

    fn encode(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Vec<u8>, WatermarkError> {
        let encoder = webp::Encoder::from_rgba(data, width, height);
        let lossless = quality >= 100;
        let memory = encoder
            .encode_simple(lossless, quality as f32)
            .map_err(|e| WatermarkError::EncodeError(format!("webp: {:?}", e)))?;
        Ok(memory.to_vec())
    }

    fn supports_transparency(&self) -> bool {
        true
    }
}

pub struct PngEncoder;

impl ImageEncoder for PngEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Png
    }

    fn encode(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        _quality: u8,
    ) -> Result<Vec<u8>, WatermarkError> {
        use image::codecs::png::PngEncoder as ImagePngEncoder;
        use image::ImageEncoder as _;

        let mut output = Cursor::new(Vec::new());
        ImagePngEncoder::new(&mut output)
            .write_image(data, width, height, image::ColorType::Rgba8)
            .map_err(|e| WatermarkError::EncodeError(format!("png: {}", e)))?;
        Ok(output.into_inner())
    }

    fn supports_transparency(&self) -> bool {
        true
    }
}

/// JPEG output; transparency is flattened onto white.
pub struct JpegEncoder;

impl ImageEncoder for JpegEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Jpeg
    }

    fn encode(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Vec<u8>, WatermarkError> {
        use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
        use image::ImageEncoder as _;

        let rgb = rgba_to_rgb(data);
        let mut output = Cursor::new(Vec::new());
        ImageJpegEncoder::new_with_quality(&mut output, quality)
            .write_image(&rgb, width, height, image::ColorType::Rgb8)
            .map_err(|e| WatermarkError::EncodeError(format!("jpeg: {}", e)))?;
        Ok(output.into_inner())
    }

    fn supports_transparency(&self) -> bool {
        false
    }
}

pub struct EncoderFactory;

impl EncoderFactory {
    pub fn create(format: OutputFormat) -> Box<dyn ImageEncoder> {
        match format {
            OutputFormat::WebP => Box::new(WebPEncoder),
            OutputFormat::Png => Box::new(PngEncoder),
            OutputFormat::Jpeg => Box::new(JpegEncoder),
        }
    }
}

/// Encode a bitmap. Quality is clamped to 1-100.
pub fn encode_image(
    image: &RgbaImage,
    format: OutputFormat,
    quality: u8,
) -> Result<EncodedImage, WatermarkError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(WatermarkError::EncodeError(format!(
            "cannot encode empty {}x{} image",
            width, height
        )));
    }

    let quality = quality.clamp(1, 100);
    let data = EncoderFactory::create(format).encode(image.as_raw(), width, height, quality)?;
    debug!(
        format = %format,
        quality = quality,
        width = width,
        height = height,
        bytes = data.len(),
        "Encoded image"
    );

    Ok(EncodedImage {
        data,
        format,
        width,
        height,
    })
}

/// Encode the current contents of a canvas.
pub fn encode(
    canvas: &Canvas,
    format: OutputFormat,
    quality: u8,
) -> Result<EncodedImage, WatermarkError> {
    encode_image(canvas.as_image(), format, quality)
}

/// Background that JPEG output is flattened onto.
const JPEG_MATTE: [u8; 3] = [255, 255, 255];

/// Flatten RGBA onto [`JPEG_MATTE`], weighting each colour by its alpha.
fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for chunk in rgba.chunks_exact(4) {
        let alpha = chunk[3] as u32;
        for (channel, matte) in chunk[..3].iter().zip(JPEG_MATTE) {
            let mixed = (*channel as u32 * alpha + matte as u32 * (255 - alpha) + 127) / 255;
            rgb.push(mixed as u8);
        }
    }
    rgb
}
