use anyhow::{anyhow, bail, Context};
use clap::Parser;
use overmark::config::Config;
use overmark::watermark::{
    encode, BlobRegistry, Canvas, CanvasProvider, CompositionRequest, ImageFetcher, OutputFormat,
    Position, RasterCanvasProvider, TextRasterizer, WatermarkCompositor, WatermarkSpec,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_CONFIG_FILE: &str = "overmark.yaml";

/// Overmark - composite vendor and platform watermarks onto listing images
#[derive(Parser, Debug)]
#[command(name = "overmark")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: ./overmark.yaml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,

    /// Base image (path, file:// or http(s) URL)
    #[arg(long, required_unless_present = "test")]
    base: Option<String>,

    /// Vendor logo location
    #[arg(long, conflicts_with = "vendor_text")]
    vendor_image: Option<String>,

    /// Vendor name, rendered as outlined text when there is no logo
    #[arg(long)]
    vendor_text: Option<String>,

    /// Platform logo location
    #[arg(long, required_unless_present = "test")]
    platform_image: Option<String>,

    /// Position to draw at; repeat for several (default from config)
    #[arg(long = "position", value_name = "POSITION")]
    positions: Vec<String>,

    /// Opacity shared by all marks, 0.0 to 1.0
    #[arg(long)]
    alpha: Option<f32>,

    /// Device pixel ratio for text marks
    #[arg(long)]
    dpr: Option<f32>,

    /// Output format (default: from the output extension, then config)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Encoder quality 1-100
    #[arg(long)]
    quality: Option<u8>,

    /// Where to write the composited image
    #[arg(short, long, required_unless_present = "test")]
    output: Option<PathBuf>,

    /// Print the placement report as JSON on stdout
    #[arg(long)]
    report: bool,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::from_file(DEFAULT_CONFIG_FILE)
            .with_context(|| format!("Failed to load configuration from {}", DEFAULT_CONFIG_FILE)),
        None => Ok(Config::default()),
    }
}

fn output_format(args: &Args, output: &Path, config: &Config) -> OutputFormat {
    args.format
        .or_else(|| {
            output
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(OutputFormat::from_extension)
        })
        .unwrap_or(config.output.format)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    config.validate().context("Invalid configuration")?;

    overmark::logging::init_subscriber(&config.logging)
        .map_err(|e| anyhow!("Failed to initialize logging subsystem: {}", e))?;

    tracing::info!(
        config_file = ?args.config,
        dpr = config.rasterizer.device_pixel_ratio,
        fonts = config.rasterizer.fonts.len(),
        output_format = %config.output.format,
        "Configuration loaded successfully"
    );

    let fonts = config.rasterizer.build_font_registry()?;
    let placement = config.compositor.placement_table()?;

    if args.test {
        tracing::info!("Configuration test passed");
        println!("configuration OK");
        return Ok(());
    }

    let (Some(base_source), Some(platform_source), Some(output)) =
        (&args.base, &args.platform_image, &args.output)
    else {
        bail!("--base, --platform-image and --output are required");
    };

    let vendor_mark = match (&args.vendor_image, &args.vendor_text) {
        (Some(image), _) => WatermarkSpec::image(image.clone()),
        (None, Some(text)) => WatermarkSpec::text(text.clone()),
        (None, None) => bail!("one of --vendor-image or --vendor-text is required"),
    };

    let provider: Arc<dyn CanvasProvider> = Arc::new(RasterCanvasProvider::new(fonts));
    let blobs = BlobRegistry::new();
    let fetcher = ImageFetcher::new(config.fetcher.to_fetcher_config(), blobs.clone())?;
    let compositor = WatermarkCompositor::new(fetcher.clone(), TextRasterizer::new(provider))
        .with_placement(placement)
        .with_font_family(config.rasterizer.font_family.clone())
        .with_device_pixel_ratio(args.dpr.unwrap_or(config.rasterizer.device_pixel_ratio));

    let base_image = fetcher.fetch(base_source).await?.image;

    let positions = if args.positions.is_empty() {
        config.compositor.default_positions.clone()
    } else {
        args.positions.iter().map(|p| Position::parse(p)).collect()
    };
    for (raw, position) in args.positions.iter().zip(&positions) {
        if !position.is_recognized() {
            tracing::warn!(position = %raw, "Unrecognized position, drawing at the origin");
        }
    }

    let request = CompositionRequest::new(base_image, vendor_mark, platform_source.clone())
        .with_positions(positions)
        .with_opacity(args.alpha.unwrap_or(config.compositor.default_opacity));

    let mut canvas = Canvas::default();
    let report = compositor.compose(&mut canvas, &request).await?;

    let format = output_format(&args, output, &config);
    let quality = args.quality.unwrap_or(config.output.quality);
    let encoded = encode(&canvas, format, quality)?;
    tokio::fs::write(output, &encoded.data)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    tracing::info!(
        output = %output.display(),
        format = %format,
        bytes = encoded.len(),
        width = encoded.width,
        height = encoded.height,
        live_blobs = blobs.live_count(),
        "Wrote watermarked image"
    );

    if args.report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
