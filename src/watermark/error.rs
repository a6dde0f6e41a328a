//! Errors for the compositing pipeline.
//!
//! Every failure in the fetch → decode → rasterize → composite → encode
//! pipeline surfaces as one of these variants.

use std::fmt;

/// Failure at one stage of producing a composited image.
#[derive(Debug)]
pub enum WatermarkError {
    /// A base or mark image could not be read from its source
    FetchError(String),

    /// Fetched bytes could not be decoded as an image
    DecodeError(String),

    /// Text could not be rasterized (empty text, no visible glyphs)
    RenderError(String),

    /// No rendering capability is available in this environment
    Environment(String),

    /// Invalid configuration or request parameters
    ConfigError(String),

    /// Canvas allocation or drawing failed
    CompositeError(String),

    /// Failed to serialise the composited canvas
    EncodeError(String),
}

impl fmt::Display for WatermarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchError(msg) => write!(f, "Image source unavailable: {}", msg),
            Self::DecodeError(msg) => write!(f, "Image bytes not decodable: {}", msg),
            Self::RenderError(msg) => write!(f, "Text mark not rasterized: {}", msg),
            Self::Environment(msg) => write!(f, "No rendering support: {}", msg),
            Self::ConfigError(msg) => write!(f, "Invalid composition settings: {}", msg),
            Self::CompositeError(msg) => write!(f, "Canvas operation failed: {}", msg),
            Self::EncodeError(msg) => write!(f, "Output encoding failed: {}", msg),
        }
    }
}

impl std::error::Error for WatermarkError {}

impl From<tokio::task::JoinError> for WatermarkError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::CompositeError(format!("background task failed: {}", err))
    }
}
