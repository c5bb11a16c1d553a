//! `tracing` subscriber setup for processes embedding the syncer.

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the filter directives, e.g. `docfeed_sync=debug`.
pub const LOG_ENV: &str = "DOCFEED_LOG";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter {directive:?}: {reason}")]
    InvalidFilter { directive: String, reason: String },
    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Used when `DOCFEED_LOG` is unset.
    pub default_directive: String,
    pub with_target: bool,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            with_target: true,
            ansi: true,
        }
    }
}

impl LogConfig {
    pub fn with_default_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    fn filter(&self, from_env: Option<String>) -> Result<EnvFilter, LoggingError> {
        let directive = from_env
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.default_directive.clone());
        EnvFilter::try_new(&directive).map_err(|err| LoggingError::InvalidFilter {
            directive,
            reason: err.to_string(),
        })
    }
}

/// Installs a stderr fmt subscriber. Fails instead of panicking when called
/// twice.
pub fn init_logging(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = config.filter(std::env::var(LOG_ENV).ok())?;
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.with_target)
        .with_ansi(config.ansi);
    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_directive_wins_over_default() {
        let config = LogConfig::default().with_default_directive("warn");
        let filter = config.filter(Some("docfeed_sync=debug".into())).unwrap();
        assert_eq!(filter.to_string(), "docfeed_sync=debug");
    }

    #[test]
    fn blank_env_uses_default() {
        let config = LogConfig::default().with_default_directive("warn");
        let filter = config.filter(Some("  ".into())).unwrap();
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn second_init_reports_already_initialized() {
        let config = LogConfig::default().with_ansi(false);
        let _ = init_logging(&config);
        assert!(matches!(
            init_logging(&config),
            Err(LoggingError::AlreadyInitialized)
        ));
    }
}
