//! Subscriber installation.
//!
//! The `[logging]` section picks a filter and an output format. Pretty output
//! is meant for a terminal; JSON output carries the current span, so every
//! line logged during a transfer names its archive and archiver pid.

use photopack_config::{LogFormat, LoggingSection};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// How logs are filtered and printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Install nothing when false.
    pub enabled: bool,

    /// `EnvFilter` directives, e.g. `info` or `photopack_server=debug,hyper=warn`.
    pub filter: String,

    /// Line-delimited JSON instead of pretty output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from(&LoggingSection::default())
    }
}

impl From<&LoggingSection> for LogConfig {
    fn from(section: &LoggingSection) -> Self {
        Self {
            enabled: section.enabled,
            filter: section.level.clone(),
            json: section.format == LogFormat::Json,
        }
    }
}

/// Installs the global subscriber described by `config`.
///
/// # Errors
///
/// [`TelemetryError::LoggingInit`] if the filter doesn't parse or a global
/// subscriber is already set.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = env_filter(&config.filter)?;
    let (json, pretty) = if config.json {
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false);
        (Some(layer), None)
    } else {
        (None, Some(fmt::layer().pretty().with_target(false)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Parses filter directives.
///
/// # Errors
///
/// [`TelemetryError::LoggingInit`] naming the bad directive.
pub fn env_filter(directives: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directives)
        .map_err(|e| TelemetryError::LoggingInit(format!("bad filter '{directives}': {e}")))
}
