// Image fetching over HTTP and from disk, with caching and blob release

use super::common::{png_bytes, spawn_image_server, write_png, Route, BLUE, RED};
use overmark::watermark::{
    BlobRegistry, Dimensions, ImageFetcher, ImageFetcherConfig, WatermarkError,
};
use std::collections::HashMap;
use std::time::Duration;

fn fetcher(config: ImageFetcherConfig) -> (ImageFetcher, BlobRegistry) {
    let blobs = BlobRegistry::new();
    let fetcher = ImageFetcher::new(config, blobs.clone()).expect("fetcher");
    (fetcher, blobs)
}

#[tokio::test]
async fn test_http_fetch_is_cached() {
    let mut routes = HashMap::new();
    routes.insert("/logo.png", Route::ok(png_bytes(40, 20, RED)));
    let server = spawn_image_server(routes).await;
    let (fetcher, blobs) = fetcher(ImageFetcherConfig::default());
    let url = server.url("/logo.png");

    let first = fetcher.fetch(&url).await.unwrap();
    assert_eq!(first.image.dimensions(), Dimensions::new(40, 20));
    assert!(fetcher.is_cached(&url).await);

    let second = fetcher.fetch(&url).await.unwrap();
    assert_eq!(server.hits(), 1);
    assert_eq!(first.image, second.image);
    assert_eq!(blobs.live_count(), 0);
}

#[tokio::test]
async fn test_clear_cache_refetches() {
    let mut routes = HashMap::new();
    routes.insert("/logo.png", Route::ok(png_bytes(8, 8, BLUE)));
    let server = spawn_image_server(routes).await;
    let (fetcher, _) = fetcher(ImageFetcherConfig::default());
    let url = server.url("/logo.png");

    fetcher.fetch(&url).await.unwrap();
    fetcher.clear_cache().await;
    assert!(!fetcher.is_cached(&url).await);

    fetcher.fetch(&url).await.unwrap();
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_cache_ttl_expires() {
    let mut routes = HashMap::new();
    routes.insert("/logo.png", Route::ok(png_bytes(8, 8, BLUE)));
    let server = spawn_image_server(routes).await;
    let (fetcher, _) = fetcher(ImageFetcherConfig {
        cache_ttl: Duration::from_millis(100),
        ..ImageFetcherConfig::default()
    });
    let url = server.url("/logo.png");

    fetcher.fetch(&url).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    fetcher.fetch(&url).await.unwrap();
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_error_status_is_fetch_error() {
    let mut routes = HashMap::new();
    routes.insert("/forbidden.png", Route::status(403));
    let server = spawn_image_server(routes).await;
    let (fetcher, blobs) = fetcher(ImageFetcherConfig::default());

    for path in ["/forbidden.png", "/missing.png"] {
        let err = fetcher.fetch(&server.url(path)).await.unwrap_err();
        assert!(matches!(err, WatermarkError::FetchError(_)), "{path}: {err}");
        assert!(!fetcher.is_cached(&server.url(path)).await);
    }
    assert_eq!(blobs.live_count(), 0);
}

#[tokio::test]
async fn test_undecodable_body_is_decode_error() {
    let mut routes = HashMap::new();
    routes.insert("/notes.txt", Route::ok(b"just some text".to_vec()));
    let server = spawn_image_server(routes).await;
    let (fetcher, blobs) = fetcher(ImageFetcherConfig::default());

    let err = fetcher.fetch(&server.url("/notes.txt")).await.unwrap_err();
    assert!(matches!(err, WatermarkError::DecodeError(_)), "{err}");
    assert_eq!(blobs.live_count(), 0);
}

#[tokio::test]
async fn test_unreachable_host_is_fetch_error() {
    let (fetcher, _) = fetcher(ImageFetcherConfig {
        request_timeout: Duration::from_secs(2),
        ..ImageFetcherConfig::default()
    });
    // Bind then drop to get a port with nothing listening
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = fetcher
        .fetch(&format!("http://127.0.0.1:{port}/logo.png"))
        .await
        .unwrap_err();
    assert!(matches!(err, WatermarkError::FetchError(_)), "{err}");
}

#[tokio::test]
async fn test_file_sources() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_png(dir.path(), "logo.png", 12, 6, RED);
    let (fetcher, _) = fetcher(ImageFetcherConfig::default());

    let bare = fetcher.fetch(&path).await.unwrap();
    assert_eq!(bare.image.dimensions(), Dimensions::new(12, 6));

    let url = format!("file://{path}");
    let via_url = fetcher.fetch(&url).await.unwrap();
    assert_eq!(bare.image, via_url.image);
}

#[tokio::test]
async fn test_oversized_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_png(dir.path(), "big.png", 64, 64, RED);
    let (fetcher, blobs) = fetcher(ImageFetcherConfig {
        max_body_bytes: 16,
        ..ImageFetcherConfig::default()
    });

    let err = fetcher.fetch(&path).await.unwrap_err();
    assert!(matches!(err, WatermarkError::FetchError(_)), "{err}");
    assert_eq!(blobs.live_count(), 0);
}

#[tokio::test]
async fn test_unsupported_sources_rejected() {
    let (fetcher, _) = fetcher(ImageFetcherConfig::default());
    for source in ["", "ftp://example.com/logo.png", "data:image/png;base64,AAAA"] {
        let err = fetcher.fetch(source).await.unwrap_err();
        assert!(matches!(err, WatermarkError::FetchError(_)), "{source}: {err}");
    }
}
