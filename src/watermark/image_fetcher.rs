//! Watermark image fetcher with caching.
//!
//! Fetches overlay and base images from HTTP(S) URLs, `file://` URLs or
//! plain filesystem paths, decodes them to RGBA and caches the decoded result
//! in memory.
//!
//! # Supported Sources
//!
//! - `https://cdn.example.com/logo.png` / `http://...` - fetched with `reqwest`
//! - `file:///srv/assets/logo.png` - read from disk
//! - `assets/logo.png` - bare path, read from disk
//!
//! # Caching
//!
//! Decoded images are kept in a `moka` cache bounded by entry count with a
//! TTL. Fetched bytes live in a temporary blob only for the duration of the
//! decode; the blob is revoked whether decoding succeeds or fails.

use super::blob::BlobRegistry;
use super::canvas::RasterImage;
use super::WatermarkError;
use bytes::{Bytes, BytesMut};
use image::ImageFormat;
use moka::future::Cache;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default ceiling on a fetched body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Configuration for the image fetcher.
#[derive(Debug, Clone)]
pub struct ImageFetcherConfig {
    /// Maximum number of cached images.
    pub max_cache_entries: u64,
    /// Time-to-live for cached images.
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
    /// Bodies larger than this fail with `FetchError`.
    pub max_body_bytes: usize,
}

impl Default for ImageFetcherConfig {
    fn default() -> Self {
        Self {
            max_cache_entries: 100,
            cache_ttl: Duration::from_secs(3600),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Parsed location of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Http(String),
    File(PathBuf),
}

impl ImageSource {
    /// Parse a source string.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` for empty sources and URL schemes other than
    /// `http`, `https` and `file`.
    pub fn parse(source: &str) -> Result<Self, WatermarkError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(WatermarkError::FetchError(
                "Image source cannot be empty".to_string(),
            ));
        }

        if source.starts_with("https://") || source.starts_with("http://") {
            return Ok(ImageSource::Http(source.to_string()));
        }
        if let Some(path) = source.strip_prefix("file://") {
            if path.is_empty() {
                return Err(WatermarkError::FetchError(format!(
                    "Invalid file source: {source}"
                )));
            }
            return Ok(ImageSource::File(PathBuf::from(path)));
        }
        if let Some((scheme, _)) = source.split_once("://") {
            return Err(WatermarkError::FetchError(format!(
                "Unsupported source protocol '{scheme}' in {source}. Use http(s):// or file://"
            )));
        }
        if source.starts_with("data:") || source.starts_with("blob:") {
            return Err(WatermarkError::FetchError(format!(
                "Unsupported source protocol in {source}"
            )));
        }

        Ok(ImageSource::File(PathBuf::from(source)))
    }

    pub fn cache_key(&self) -> String {
        match self {
            ImageSource::Http(url) => url.clone(),
            ImageSource::File(path) => format!("file://{}", path.display()),
        }
    }

    fn name(&self) -> String {
        match self {
            ImageSource::Http(url) => url.clone(),
            ImageSource::File(path) => path.display().to_string(),
        }
    }
}

/// Decoded image shared between the cache and callers.
#[derive(Clone)]
pub struct CachedImage {
    pub image: Arc<RasterImage>,
}

impl std::fmt::Debug for CachedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedImage")
            .field("dimensions", &(self.image.width(), self.image.height()))
            .finish()
    }
}

impl CachedImage {
    pub fn new(image: RasterImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }
}

/// Fetcher for watermark images with built-in caching.
#[derive(Clone)]
pub struct ImageFetcher {
    cache: Cache<String, CachedImage>,
    http_client: reqwest::Client,
    blobs: BlobRegistry,
    max_body_bytes: usize,
}

impl std::fmt::Debug for ImageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFetcher")
            .field("cached", &self.cache.entry_count())
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl ImageFetcher {
    /// Create a new image fetcher.
    ///
    /// # Errors
    ///
    /// Returns `WatermarkError::ConfigError` if the HTTP client cannot be
    /// created.
    pub fn new(config: ImageFetcherConfig, blobs: BlobRegistry) -> Result<Self, WatermarkError> {
        let cache = Cache::builder()
            .max_capacity(config.max_cache_entries)
            .time_to_live(config.cache_ttl)
            .build();

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                WatermarkError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            cache,
            http_client,
            blobs,
            max_body_bytes: config.max_body_bytes,
        })
    }

    pub fn blobs(&self) -> &BlobRegistry {
        &self.blobs
    }

    /// Fetch and decode an image. Repeated calls for the same source hit the
    /// cache until the TTL expires.
    pub async fn fetch(&self, source: &str) -> Result<CachedImage, WatermarkError> {
        let parsed = ImageSource::parse(source)?;
        let cache_key = parsed.cache_key();

        if let Some(cached) = self.cache.get(&cache_key).await {
            debug!(source = %cache_key, "Watermark image cache hit");
            return Ok(cached);
        }

        let (bytes, content_type) = match &parsed {
            ImageSource::Http(url) => self.fetch_from_http(url).await?,
            ImageSource::File(path) => (self.read_file(path).await?, None),
        };

        let image = self
            .decode(bytes, content_type, parsed.name())
            .await
            .map_err(|e| {
                warn!(source = %cache_key, error = %e, "Failed to decode image");
                e
            })?;

        debug!(
            source = %cache_key,
            width = image.width(),
            height = image.height(),
            "Fetched watermark image"
        );

        let cached = CachedImage::new(image);
        self.cache.insert(cache_key, cached.clone()).await;
        Ok(cached)
    }

    async fn fetch_from_http(
        &self,
        url: &str,
    ) -> Result<(Bytes, Option<String>), WatermarkError> {
        let mut response = self.http_client.get(url).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "HTTP fetch failed");
            WatermarkError::FetchError(format!("HTTP fetch failed: {e}"))
        })?;

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "HTTP fetch returned error status");
            return Err(WatermarkError::FetchError(format!(
                "HTTP request failed with status: {}",
                response.status()
            )));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_body_bytes as u64 {
                return Err(self.too_large(url));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| WatermarkError::FetchError(format!("Failed to read HTTP body: {e}")))?
        {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(self.too_large(url));
            }
            body.extend_from_slice(&chunk);
        }

        Ok((body.freeze(), content_type))
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes, WatermarkError> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            WatermarkError::FetchError(format!("Failed to read {}: {e}", path.display()))
        })?;
        if metadata.len() > self.max_body_bytes as u64 {
            return Err(self.too_large(&path.display().to_string()));
        }

        let data = tokio::fs::read(path).await.map_err(|e| {
            WatermarkError::FetchError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Ok(Bytes::from(data))
    }

    /// Decode on the blocking pool while a blob holds the bytes.
    async fn decode(
        &self,
        bytes: Bytes,
        content_type: Option<String>,
        name: String,
    ) -> Result<RasterImage, WatermarkError> {
        let blob = self.blobs.create(bytes, content_type.as_deref());
        tokio::task::spawn_blocking(move || -> Result<RasterImage, WatermarkError> {
            let format = detect_image_format(blob.bytes(), &name)?;
            let decoded = image::load(Cursor::new(blob.bytes()), format)
                .map_err(|e| WatermarkError::DecodeError(format!("{name}: {e}")))?;
            Ok(RasterImage::from_dynamic(decoded))
        })
        .await?
    }

    fn too_large(&self, name: &str) -> WatermarkError {
        warn!(source = %name, limit = self.max_body_bytes, "Watermark image exceeds size limit");
        WatermarkError::FetchError(format!(
            "{name} exceeds the {} byte limit",
            self.max_body_bytes
        ))
    }

    /// Get the number of cached images.
    pub fn cache_size(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Clear all cached images.
    pub async fn clear_cache(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// Check if an image is cached.
    pub async fn is_cached(&self, source: &str) -> bool {
        if let Ok(parsed) = ImageSource::parse(source) {
            self.cache.get(&parsed.cache_key()).await.is_some()
        } else {
            false
        }
    }
}

/// Detect image format from magic bytes, falling back to the extension.
pub fn detect_image_format(data: &[u8], path: &str) -> Result<ImageFormat, WatermarkError> {
    if let Ok(format) = image::guess_format(data) {
        return Ok(format);
    }

    let path = path.split(['?', '#']).next().unwrap_or(path);
    let ext = path
        .rsplit('.')
        .next()
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => Ok(ImageFormat::Png),
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "gif" => Ok(ImageFormat::Gif),
        "webp" => Ok(ImageFormat::WebP),
        _ => Err(WatermarkError::DecodeError(format!(
            "Unsupported image format: {ext}"
        ))),
    }
}
