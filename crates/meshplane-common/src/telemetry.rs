//! Logging initialization
//!
//! JSON structured logging for in-cluster deployments, a human readable
//! formatter for development. `RUST_LOG` always wins over the defaults.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Errors that can occur during logging initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Configuration for logging initialization
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Use the human readable formatter instead of JSON
    pub dev_mode: bool,
    /// Raise the default filter to debug for meshplane crates
    pub verbose: bool,
}

impl TelemetryConfig {
    /// Default filter directive used when `RUST_LOG` is unset
    pub fn default_filter(&self) -> &'static str {
        if self.verbose {
            "info,meshplane=debug,meshplane_operator=debug,meshplane_components=debug,kube=info,tower=warn,hyper=warn"
        } else {
            "info,kube=warn,tower=warn,hyper=warn"
        }
    }
}

/// Initialize the global tracing subscriber
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter()));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.dev_mode {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init()
    };

    result.map_err(|e: tracing_subscriber::util::TryInitError| {
        TelemetryError::SubscriberInit(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_meshplane_to_debug() {
        let config = TelemetryConfig {
            dev_mode: false,
            verbose: true,
        };
        assert!(config.default_filter().contains("meshplane_operator=debug"));
    }

    #[test]
    fn default_filter_is_info() {
        let config = TelemetryConfig::default();
        assert!(config.default_filter().starts_with("info"));
        assert!(!config.default_filter().contains("debug"));
    }
}
