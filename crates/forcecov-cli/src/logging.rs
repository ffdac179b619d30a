//! Tracing setup
//!
//! Logs go to stderr so stdout carries only the run report. `RUST_LOG`
//! overrides the level chosen by `--verbose`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogFormat {
    /// Compact human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

/// Default directive for the given verbosity
pub(crate) fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "forcecov=debug,forcecov_core=debug,forcecov_remote=debug,info"
    } else {
        "info"
    }
}

/// Install the global subscriber
///
/// Fails when a subscriber is already installed.
pub(crate) fn init(verbose: bool, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(verbose)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }
    Ok(())
}
