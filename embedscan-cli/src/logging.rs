//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout carries only the JSON listing.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::LogFormat;

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// `filter` takes precedence over `RUST_LOG`; both fall back to `info`.
pub fn init_logging(filter: Option<&str>, format: LogFormat, no_color: bool) -> Result<()> {
    let env_filter = match filter {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid log filter '{directives}'"))?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_ansi(!no_color),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr).with_current_span(false))
            .try_init(),
    }
    .context("failed to initialize logging")
}
