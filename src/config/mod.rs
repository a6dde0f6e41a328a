// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::watermark::fonts::DEFAULT_FONT_FAMILY;
use crate::watermark::image_fetcher::{DEFAULT_MAX_BODY_BYTES, DEFAULT_REQUEST_TIMEOUT};
use crate::watermark::{
    FontRegistry, ImageFetcherConfig, MarkRole, OutputFormat, PlacementTable, Position,
    WatermarkError,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is referenced but not set")]
    MissingEnvVar(String),

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Watermark(#[from] WatermarkError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub rasterizer: RasterizerConfig,
    #[serde(default)]
    pub compositor: CompositorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line, for log aggregation
    Json,
    /// Human-readable output
    #[default]
    Pretty,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset (default: info)
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_max_cache_entries() -> u64 {
    100
}

fn default_cache_ttl_seconds() -> u64 {
    3600
}

fn default_max_image_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Image fetching and caching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Decoded images kept in memory (default: 100)
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: u64,

    /// Cache time-to-live in seconds (default: 3600)
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    /// Largest accepted image body in bytes (default: 32 MiB)
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            max_cache_entries: default_max_cache_entries(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

impl FetcherConfig {
    pub fn to_fetcher_config(&self) -> ImageFetcherConfig {
        ImageFetcherConfig {
            max_cache_entries: self.max_cache_entries,
            cache_ttl: Duration::from_secs(self.cache_ttl_seconds),
            request_timeout: Duration::from_secs(self.timeout_seconds),
            max_body_bytes: self.max_image_bytes,
        }
    }
}

fn default_device_pixel_ratio() -> f32 {
    1.0
}

fn default_font_family() -> String {
    "sans-serif".to_string()
}

/// Extra font file made available to text watermarks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FontFileConfig {
    pub family: String,
    pub path: PathBuf,
}

/// Text watermark rasterization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterizerConfig {
    /// Device pixel ratio applied to the 50px base font size (default: 1.0)
    #[serde(default = "default_device_pixel_ratio")]
    pub device_pixel_ratio: f32,

    /// Family list used for text marks (default: sans-serif)
    #[serde(default = "default_font_family")]
    pub font_family: String,

    /// Registered family used when a requested family is unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_font: Option<String>,

    #[serde(default)]
    pub fonts: Vec<FontFileConfig>,
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            device_pixel_ratio: default_device_pixel_ratio(),
            font_family: default_font_family(),
            default_font: None,
            fonts: Vec::new(),
        }
    }
}

impl RasterizerConfig {
    /// Load the embedded face plus every configured font file.
    pub fn build_font_registry(&self) -> Result<FontRegistry, WatermarkError> {
        let mut registry = FontRegistry::new()?;
        for font in &self.fonts {
            registry.register_file(&font.family, &font.path)?;
        }
        if let Some(family) = &self.default_font {
            registry.set_default_family(family)?;
        }
        Ok(registry)
    }
}

fn default_opacity() -> f32 {
    0.5
}

fn default_positions() -> Vec<Position> {
    vec![Position::BottomLeft, Position::TopRight]
}

/// Composition defaults and the role placement table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositorConfig {
    /// Position overrides on top of the default (bottom-left: vendor)
    #[serde(default)]
    pub placement: BTreeMap<Position, MarkRole>,

    /// Opacity when the caller does not give one (default: 0.5)
    #[serde(default = "default_opacity")]
    pub default_opacity: f32,

    /// Positions when the caller does not give any (default: bottom-left, top-right)
    #[serde(default = "default_positions")]
    pub default_positions: Vec<Position>,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            placement: BTreeMap::new(),
            default_opacity: default_opacity(),
            default_positions: default_positions(),
        }
    }
}

impl CompositorConfig {
    pub fn placement_table(&self) -> Result<PlacementTable, WatermarkError> {
        PlacementTable::with_overrides(&self.placement)
    }
}

fn default_quality() -> u8 {
    crate::watermark::encoder::DEFAULT_QUALITY
}

/// Encoded artifact settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Encoder quality 1-100 (default: 80)
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            quality: default_quality(),
        }
    }
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, ConfigError> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            if std::env::var(var_name).is_err() {
                return Err(ConfigError::MissingEnvVar(var_name.to_string()));
            }
        }

        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        });

        if substituted.trim().is_empty() {
            return Ok(Config::default());
        }

        let config: Config = serde_yaml::from_str(&substituted)?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            return Err(ConfigError::Invalid(format!(
                "logging.level '{}' is not a valid filter directive",
                self.logging.level
            )));
        }

        if self.fetcher.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "fetcher.timeout_seconds must be > 0".to_string(),
            ));
        }
        if self.fetcher.max_image_bytes == 0 {
            return Err(ConfigError::Invalid(
                "fetcher.max_image_bytes must be > 0".to_string(),
            ));
        }

        let dpr = self.rasterizer.device_pixel_ratio;
        if !dpr.is_finite() || dpr <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "rasterizer.device_pixel_ratio must be a positive number, got {}",
                dpr
            )));
        }
        if self.rasterizer.font_family.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "rasterizer.font_family cannot be empty".to_string(),
            ));
        }
        for font in &self.rasterizer.fonts {
            if font.family.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "font file {} has an empty family name",
                    font.path.display()
                )));
            }
        }
        if let Some(default_font) = &self.rasterizer.default_font {
            let known = default_font.trim().eq_ignore_ascii_case(DEFAULT_FONT_FAMILY)
                || self
                    .rasterizer
                    .fonts
                    .iter()
                    .any(|f| f.family.trim().eq_ignore_ascii_case(default_font.trim()));
            if !known {
                return Err(ConfigError::Invalid(format!(
                    "rasterizer.default_font '{}' is not among the configured fonts",
                    default_font
                )));
            }
        }

        let opacity = self.compositor.default_opacity;
        if !opacity.is_finite() || !(0.0..=1.0).contains(&opacity) {
            return Err(ConfigError::Invalid(format!(
                "compositor.default_opacity must be between 0.0 and 1.0, got {}",
                opacity
            )));
        }
        if self.compositor.placement.contains_key(&Position::Unrecognized) {
            return Err(ConfigError::Invalid(
                "compositor.placement keys must be named positions".to_string(),
            ));
        }

        if !(1..=100).contains(&self.output.quality) {
            return Err(ConfigError::Invalid(format!(
                "output.quality must be between 1 and 100, got {}",
                self.output.quality
            )));
        }

        Ok(())
    }
}
