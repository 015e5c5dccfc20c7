//! Subscriber setup for the `serial-line` binary.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the application.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Filter directive for a config and a `-v` count.
///
/// Each `-v` raises the crate's own level one step above the configured one.
pub fn filter_directive(config: &LoggingConfig, verbosity: u8) -> String {
    match verbosity {
        0 => config.level.clone(),
        1 => format!("{},serial_line=debug", config.level),
        _ => format!("{},serial_line=trace", config.level),
    }
}

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over the config and verbosity when set.
pub fn init(
    config: &LoggingConfig,
    verbosity: u8,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directive) => EnvFilter::try_new(directive)?,
        Err(_) => EnvFilter::try_new(filter_directive(config, verbosity))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    }
}
