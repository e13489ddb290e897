//! Logging initialisation for the LatticeDB storage core.
//!
//! Wires the `observability` configuration section into a layered tracing
//! subscriber. Two renderings are supported: a compact text form for
//! operators and single-line JSON for log shippers. `RUST_LOG` always takes
//! precedence over the configured level; absent both, the lattice crates log
//! at debug so storage and schema operations stay visible during
//! development.

use std::str::FromStr;

use lattice_config::ObservabilityConfig;
use thiserror::Error;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Rendering of emitted log events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Single-line human-readable text.
    #[default]
    Text,
    /// One JSON object per event, fields flattened for log shippers.
    Json,
}

/// Error returned when a format name from configuration is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log format `{0}`")]
pub struct UnknownFormatError(String);

impl FromStr for OutputFormat {
    type Err = UnknownFormatError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "text" | "pretty" | "compact" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(UnknownFormatError(other.to_string())),
        }
    }
}

/// Subscriber options, normally sourced from [`ObservabilityConfig`].
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Filter directive applied when `RUST_LOG` is unset, e.g. `info`.
    pub level: String,
    pub format: OutputFormat,
    /// Emit a close event with timing for every span.
    pub span_timings: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: OutputFormat::default(),
            span_timings: false,
        }
    }
}

impl LoggingOptions {
    /// Derive options from the configuration section. An unrecognised
    /// format name falls back to the text rendering.
    pub fn from_config(config: &ObservabilityConfig) -> Self {
        let format = config.log_format.parse().unwrap_or_else(|err| {
            tracing::warn!(%err, "falling back to text logs");
            OutputFormat::Text
        });
        Self {
            level: config.log_level.clone(),
            format,
            span_timings: false,
        }
    }

    /// The filter directives applied when `RUST_LOG` is unset.
    fn default_directives(&self) -> String {
        format!(
            "{},lattice_store=debug,lattice_schema=debug",
            self.level
        )
    }
}

/// Install the global tracing subscriber.
///
/// Fails if the configured level does not parse as a filter directive or if
/// a subscriber is already installed.
pub fn init_logging(options: &LoggingOptions) -> anyhow::Result<()> {
    let directives = options.default_directives();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directives))
        .map_err(|e| anyhow::anyhow!("invalid log filter `{}`: {}", directives, e))?;

    let span_events = if options.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let events = tracing_subscriber::fmt::layer().with_span_events(span_events);

    let registry = tracing_subscriber::registry().with(filter);
    match options.format {
        OutputFormat::Text => registry.with(events.compact()).try_init()?,
        OutputFormat::Json => registry.with(events.json().flatten_event(true)).try_init()?,
    }

    tracing::debug!(format = ?options.format, "tracing subscriber installed");
    Ok(())
}

/// Initialise logging straight from the configuration section.
pub fn init_from_config(config: &ObservabilityConfig) -> anyhow::Result<()> {
    init_logging(&LoggingOptions::from_config(config))
}
