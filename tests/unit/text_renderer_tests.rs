// Text watermark rasterization through the public API

use overmark::watermark::{
    BlobRegistry, FontRegistry, RasterCanvasProvider, RasterImage, TextRasterizer,
    TextRenderOptions, UnavailableCanvasProvider, WatermarkError,
};
use std::path::PathBuf;
use std::sync::Arc;

fn rasterizer() -> TextRasterizer {
    TextRasterizer::new(Arc::new(
        RasterCanvasProvider::with_default_fonts().expect("fonts"),
    ))
}

fn border_is_clear(image: &RasterImage, band: u32) -> bool {
    let pixels = image.pixels();
    pixels.enumerate_pixels().all(|(x, y, p)| {
        let inside = x >= band
            && y >= band
            && x < pixels.width() - band
            && y < pixels.height() - band;
        inside || p[3] == 0
    })
}

#[test]
fn test_rendered_text_has_padding_band_and_ink() {
    let image = rasterizer()
        .rasterize(&TextRenderOptions::new("Acme Motors"))
        .unwrap();

    assert!(image.width() > 20 && image.height() > 20);
    assert!(border_is_clear(&image, 10));
    assert!(image.pixels().pixels().any(|p| p[3] == 255));
}

#[test]
fn test_outline_is_dark_and_fill_is_light() {
    let image = rasterizer()
        .rasterize(&TextRenderOptions::new("HHH"))
        .unwrap();
    let pixels = image.pixels();

    assert!(pixels
        .pixels()
        .any(|p| p[3] == 255 && p[0] > 240 && p[1] > 240 && p[2] > 240));
    // The outer fringe carries only the offset copies
    assert!(pixels
        .pixels()
        .any(|p| p[3] > 0 && p[0] < 15 && p[1] < 15 && p[2] < 15));
}

#[test]
fn test_device_pixel_ratio_scales_output() {
    let r = rasterizer();
    let one = r.rasterize(&TextRenderOptions::new("Dealer")).unwrap();
    let two = r
        .rasterize(&TextRenderOptions::new("Dealer").with_device_pixel_ratio(2.0))
        .unwrap();

    // Padding is fixed, so compare the inked extents
    let ratio = (two.width() - 20) as f32 / (one.width() - 20) as f32;
    assert!((1.8..=2.2).contains(&ratio), "ratio {ratio}");
    assert!(two.height() > one.height());
}

#[test]
fn test_invalid_inputs() {
    let r = rasterizer();

    let err = r.rasterize(&TextRenderOptions::new("   ")).unwrap_err();
    assert!(matches!(err, WatermarkError::RenderError(_)), "{err}");

    for dpr in [0.0, -1.0, f32::NAN, f32::INFINITY] {
        let err = r
            .rasterize(&TextRenderOptions::new("Acme").with_device_pixel_ratio(dpr))
            .unwrap_err();
        assert!(matches!(err, WatermarkError::ConfigError(_)), "{dpr}: {err}");
    }
}

#[test]
fn test_unknown_family_falls_back_to_default_face() {
    let r = rasterizer();
    let default = r.rasterize(&TextRenderOptions::new("Acme")).unwrap();
    let fallback = r
        .rasterize(&TextRenderOptions::new("Acme").with_font_family("No Such Face"))
        .unwrap();
    assert_eq!(default, fallback);
}

#[test]
fn test_registered_font_file_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brand.ttf");
    std::fs::copy(
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts/DejaVuSans.ttf"),
        &path,
    )
    .unwrap();

    let mut fonts = FontRegistry::new().unwrap();
    fonts.register_file("Brand Sans", &path).unwrap();
    assert_eq!(fonts.resolve_family("'Brand Sans', serif"), "brand sans");
    assert_eq!(fonts.resolve_family("serif, 'Brand Sans'"), "dejavu sans");
    let r = TextRasterizer::new(Arc::new(RasterCanvasProvider::new(fonts)));

    let image = r
        .rasterize(&TextRenderOptions::new("Acme").with_font_family("'Brand Sans', serif"))
        .unwrap();
    assert!(border_is_clear(&image, 10));
}

#[test]
fn test_unavailable_environment() {
    let r = TextRasterizer::new(Arc::new(UnavailableCanvasProvider::default()));
    let err = r.rasterize(&TextRenderOptions::new("Acme")).unwrap_err();
    assert!(matches!(err, WatermarkError::Environment(_)), "{err}");
}

#[test]
fn test_rasterize_to_blob_lifecycle() {
    let blobs = BlobRegistry::new();
    let handle = rasterizer()
        .rasterize_to_blob(&TextRenderOptions::new("Acme"), &blobs)
        .unwrap();

    let url = handle.url();
    assert!(url.starts_with("blob:"));
    assert!(blobs.is_live(&url));
    assert_eq!(handle.content_type(), Some("image/png"));

    let decoded = RasterImage::decode(handle.bytes()).unwrap();
    assert!(border_is_clear(&decoded, 10));

    drop(handle);
    assert!(!blobs.is_live(&url));
    assert_eq!(blobs.live_count(), 0);
}

#[tokio::test]
async fn test_rasterize_async_matches_sync() {
    let r = rasterizer();
    let options = TextRenderOptions::new("Acme");
    let sync = r.rasterize(&options).unwrap();
    let from_pool = r.rasterize_async(options).await.unwrap();
    assert_eq!(sync, from_pool);
}
