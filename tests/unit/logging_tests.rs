// Logging subsystem initialization

use overmark::config::{LogFormat, LoggingConfig};
use overmark::logging::{build_filter, init_subscriber};

#[test]
fn test_init_subscriber_is_idempotent() {
    let config = LoggingConfig::default();
    assert!(init_subscriber(&config).is_ok());
    assert!(init_subscriber(&config).is_ok());

    let json = LoggingConfig {
        level: "debug".to_string(),
        format: LogFormat::Json,
    };
    assert!(init_subscriber(&json).is_ok());

    tracing::info!(test = "logging", "Subscriber initialized");
}

#[test]
fn test_build_filter_uses_configured_level() {
    if std::env::var("RUST_LOG").is_ok() {
        return;
    }
    let config = LoggingConfig {
        level: "overmark=debug".to_string(),
        format: LogFormat::Pretty,
    };
    assert_eq!(build_filter(&config).to_string(), "overmark=debug");
}

#[test]
fn test_build_filter_falls_back_on_invalid_level() {
    if std::env::var("RUST_LOG").is_ok() {
        return;
    }
    let config = LoggingConfig {
        level: "overmark=verbose".to_string(),
        format: LogFormat::Pretty,
    };
    assert_eq!(build_filter(&config).to_string(), "info");
}

#[test]
fn test_concurrent_initialization_succeeds_everywhere() {
    let handles: Vec<_> = (0..8)
        .map(|i| {
            std::thread::spawn(move || {
                let config = LoggingConfig {
                    level: "info".to_string(),
                    format: if i % 2 == 0 {
                        LogFormat::Json
                    } else {
                        LogFormat::Pretty
                    },
                };
                init_subscriber(&config).is_ok()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
}
