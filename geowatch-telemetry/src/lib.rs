//! Telemetry initialization and configuration.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Configuration for the logging layer.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub default_level: Option<String>,
    pub log_directives: Vec<String>,
    pub json_output: bool,
}

impl TelemetryConfig {
    /// Create a new configuration with the given service name.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the default log level (e.g., "debug", "info").
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = Some(level.into());
        self
    }

    /// Add a custom tracing directive (e.g., "geowatch_engine=debug").
    pub fn with_log_directive(mut self, directive: impl Into<String>) -> Self {
        self.log_directives.push(directive.into());
        self
    }

    /// Emit JSON lines instead of human-readable output.
    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Supported variables:
    /// - `SERVICE_NAME`: The name of the service (default: "geowatch")
    /// - `LOG_LEVEL`: Default log level (default: "info")
    /// - `LOG_FORMAT`: Set to "json" for JSON lines
    pub fn from_env() -> Self {
        let service_name =
            std::env::var("SERVICE_NAME").unwrap_or_else(|_| "geowatch".to_string());
        let default_level = std::env::var("LOG_LEVEL").ok();
        let json_output = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

        Self {
            service_name,
            default_level,
            log_directives: Vec::new(),
            json_output,
        }
    }
}

/// Install the global subscriber. Safe to call more than once; only the
/// first call takes effect.
pub fn init(config: TelemetryConfig) {
    INIT.call_once(|| {
        let level = config.default_level.as_deref().unwrap_or("info");
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level));
        for directive in &config.log_directives {
            if let Ok(parsed) = directive.parse() {
                filter = filter.add_directive(parsed);
            }
        }

        let registry = tracing_subscriber::registry().with(filter);
        if config.json_output {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }

        tracing::debug!(service = %config.service_name, "telemetry initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_directives() {
        let config = TelemetryConfig::new("geowatch-worker")
            .with_log_level("debug")
            .with_log_directive("geowatch_engine=trace");
        assert_eq!(config.service_name, "geowatch-worker");
        assert_eq!(config.default_level.as_deref(), Some("debug"));
        assert_eq!(config.log_directives.len(), 1);
    }

    #[test]
    fn init_is_idempotent() {
        init(TelemetryConfig::new("test"));
        init(TelemetryConfig::new("test-again"));
    }
}
