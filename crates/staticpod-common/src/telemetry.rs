//! Logging initialization.
//!
//! The installer runs as a short-lived pod, so logs go to stdout/stderr only:
//! human-readable text by default, or JSON lines for log collectors.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,staticpod=debug,kube=info,tower=warn,hyper=warn";

/// Errors that can occur during logging initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to install the global tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Output format for log lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line text
    #[default]
    Text,
    /// JSON objects, one per line
    Json,
}

/// Configuration for logging initialization
#[derive(Clone, Debug, Default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Filter directives used when `RUST_LOG` is unset (defaults to [`DEFAULT_LOG_FILTER`])
    pub default_filter: Option<String>,
}

impl LoggingConfig {
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(self.default_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER))
        })
    }
}

/// Install the global tracing subscriber.
///
/// # Example
///
/// ```ignore
/// use staticpod_common::telemetry::{init_logging, LogFormat, LoggingConfig};
///
/// init_logging(LoggingConfig { format: LogFormat::Json, ..Default::default() })?;
/// ```
pub fn init_logging(config: LoggingConfig) -> Result<(), TelemetryError> {
    let fmt_layer = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer().with_target(false).boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Text);
        assert!(config.default_filter.is_none());
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_second_init_fails() {
        // The first call may lose to another test; the second never wins.
        let _ = init_logging(LoggingConfig::default());
        let second = init_logging(LoggingConfig::default());
        assert!(matches!(second, Err(TelemetryError::SubscriberInit(_))));
    }
}
