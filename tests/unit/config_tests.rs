// Configuration loading: env substitution, files, validation and the
// objects built from a loaded config

use overmark::config::{Config, ConfigError, LogFormat};
use overmark::watermark::{MarkRole, OutputFormat, Position};
use std::io::Write;
use std::path::PathBuf;

fn dejavu_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts/DejaVuSans.ttf")
}

#[test]
fn test_full_yaml_round_trip() {
    let yaml = r#"
logging:
  level: debug
  format: json
fetcher:
  timeout_seconds: 5
  max_cache_entries: 10
  cache_ttl_seconds: 60
  max_image_bytes: 1048576
rasterizer:
  device_pixel_ratio: 2.0
  font_family: "Brand Sans, sans-serif"
compositor:
  default_opacity: 0.8
  default_positions: [center, top-left]
  placement:
    top-left: vendor
output:
  format: png
  quality: 90
"#;
    let config = Config::from_yaml_with_env(yaml).unwrap();
    config.validate().unwrap();

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.rasterizer.device_pixel_ratio, 2.0);
    assert_eq!(
        config.compositor.default_positions,
        vec![Position::Center, Position::TopLeft]
    );
    assert_eq!(config.output.format, OutputFormat::Png);

    let fetcher = config.fetcher.to_fetcher_config();
    assert_eq!(fetcher.request_timeout.as_secs(), 5);
    assert_eq!(fetcher.max_body_bytes, 1_048_576);

    let table = config.compositor.placement_table().unwrap();
    assert_eq!(table.role_for(Position::TopLeft), MarkRole::Vendor);
    assert_eq!(table.role_for(Position::BottomLeft), MarkRole::Vendor);
    assert_eq!(table.role_for(Position::TopRight), MarkRole::Platform);
}

#[test]
fn test_unknown_position_strings_deserialize_as_unrecognized() {
    let yaml = "compositor:\n  default_positions: [bottom-left, nowhere]\n";
    let config = Config::from_yaml_with_env(yaml).unwrap();
    assert_eq!(
        config.compositor.default_positions,
        vec![Position::BottomLeft, Position::Unrecognized]
    );
    config.validate().unwrap();
}

#[test]
fn test_env_substitution() {
    std::env::set_var("OVERMARK_TEST_LOG_LEVEL", "warn");
    let config = Config::from_yaml_with_env("logging:\n  level: ${OVERMARK_TEST_LOG_LEVEL}\n")
        .unwrap();
    assert_eq!(config.logging.level, "warn");
}

#[test]
fn test_missing_env_var_is_reported() {
    let err = Config::from_yaml_with_env("logging:\n  level: ${OVERMARK_TEST_UNSET_VAR}\n")
        .unwrap_err();
    match err {
        ConfigError::MissingEnvVar(name) => assert_eq!(name, "OVERMARK_TEST_UNSET_VAR"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "output:\n  format: jpeg\n  quality: 70").unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.output.format, OutputFormat::Jpeg);
    assert_eq!(config.output.quality, 70);
}

#[test]
fn test_from_missing_file_is_io_error() {
    let err = Config::from_file("/definitely/not/here/overmark.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "{err}");
}

#[test]
fn test_malformed_yaml_is_parse_error() {
    let err = Config::from_yaml_with_env("output: [unclosed").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)), "{err}");
}

#[test]
fn test_validation_rejects_bad_values() {
    let cases = [
        "compositor:\n  default_opacity: 1.5\n",
        "rasterizer:\n  device_pixel_ratio: 0.0\n",
        "rasterizer:\n  device_pixel_ratio: -2.0\n",
        "rasterizer:\n  font_family: \"  \"\n",
        "rasterizer:\n  default_font: Missing Face\n",
        "fetcher:\n  timeout_seconds: 0\n",
        "fetcher:\n  max_image_bytes: 0\n",
        "output:\n  quality: 0\n",
        "output:\n  quality: 101\n",
        "logging:\n  level: \"overmark=verbose\"\n",
    ];
    for yaml in cases {
        let config = Config::from_yaml_with_env(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{yaml}: {err}");
    }
}

#[test]
fn test_font_registry_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let font_path = dir.path().join("brand.ttf");
    std::fs::copy(dejavu_path(), &font_path).unwrap();

    let yaml = format!(
        concat!(
            "rasterizer:\n  default_font: Brand Sans\n",
            "  fonts:\n    - family: Brand Sans\n      path: {}\n"
        ),
        font_path.display()
    );
    let config = Config::from_yaml_with_env(&yaml).unwrap();
    config.validate().unwrap();

    let registry = config.rasterizer.build_font_registry().unwrap();
    assert!(registry.contains("Brand Sans"));
    assert!(registry.contains("brand sans"));
    assert_eq!(registry.default_family(), "brand sans");
}

#[test]
fn test_missing_font_file_fails_registry_build() {
    let yaml = "rasterizer:\n  fonts:\n    - family: Ghost\n      path: /no/such/font.ttf\n";
    let config = Config::from_yaml_with_env(yaml).unwrap();
    config.validate().unwrap();
    assert!(config.rasterizer.build_font_registry().is_err());
}
