//! Process-wide diagnostic logging.
//!
//! Library code logs through both `tracing` and `log`; this installs a
//! single subscriber that receives both. The filter comes from `RUST_LOG`
//! and defaults to `info`.

use std::io;
use std::str::FromStr;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::error::LoggingError;

/// Output format of diagnostic logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, coloured when stderr is a terminal.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Diagnostics go to stderr so that stdout
/// stays free for command output.
///
/// # Errors
///
/// Fails if a `log` logger or a tracing subscriber is already installed,
/// e.g. on a second call.
pub fn init_logging(format: LogFormat) -> Result<(), LoggingError> {
    tracing_log::LogTracer::init()?;

    let registry = tracing_subscriber::registry().with(env_filter());
    match format {
        LogFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_thread_names(true)
                .with_span_events(FmtSpan::CLOSE);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
    }

    Ok(())
}
