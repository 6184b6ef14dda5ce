//! Tracing subscriber setup for binaries built on this crate.
//!
//! Library code only emits events; installing a subscriber is left to the
//! binary, which calls [`init_tracing`] once at startup.

use shared::config::{LogFormat, LoggingConfig};
use tracing::{Subscriber, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt, fmt::MakeWriter};

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Returns the configured level, or `None` when a global subscriber was
/// already installed.
pub fn init_tracing(logging: &LoggingConfig) -> Option<String> {
    let subscriber = build_subscriber(logging, std::io::stderr);
    tracing::subscriber::set_global_default(subscriber)
        .ok()
        .map(|()| logging.level.clone())
}

/// Builds the subscriber without installing it.
pub fn build_subscriber<W>(logging: &LoggingConfig, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let builder = fmt::fmt()
        .with_env_filter(build_env_filter(logging))
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(writer);

    match logging.format {
        LogFormat::Json => Box::new(builder.json().with_ansi(false).finish()),
        LogFormat::Text => Box::new(builder.with_ansi(false).finish()),
    }
}

fn build_env_filter(logging: &LoggingConfig) -> EnvFilter {
    let default_level = logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}
