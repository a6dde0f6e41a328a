// Logging module for structured logging using the tracing crate

use parking_lot::{const_mutex, Mutex};
use std::error::Error;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

static INITIALIZED: Mutex<bool> = const_mutex(false);

/// Build the event filter: `RUST_LOG` when set and valid, otherwise the
/// configured level, otherwise `info`.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber.
///
/// Events go to stderr so that stdout stays free for command output.
/// Repeated calls after a successful initialization are no-ops.
///
/// # Examples
///
/// ```
/// use overmark::config::LoggingConfig;
/// use overmark::logging::init_subscriber;
///
/// init_subscriber(&LoggingConfig::default()).expect("Failed to initialize logging");
/// tracing::info!("Application started");
/// ```
pub fn init_subscriber(config: &LoggingConfig) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut initialized = INITIALIZED.lock();
    if *initialized {
        return Ok(());
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_filter(config))
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => builder.json().try_init()?,
        LogFormat::Pretty => builder.try_init()?,
    }

    *initialized = true;
    Ok(())
}
