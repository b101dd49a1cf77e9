//! Configuration parsing for the finsim service.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides (the standard `OTEL_*` names)
//! - Sensible defaults for running next to a local collector

use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;

/// Default port of an OTLP/HTTP collector receiver.
const OTLP_HTTP_PORT: &str = ":4318";

/// Default port of an OTLP/gRPC collector receiver.
const OTLP_GRPC_PORT: &str = ":4317";

/// Log verbosity accepted by `LOG_LEVEL`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// The tracing filter this level maps to. `Critical` has no tracing
    /// counterpart and filters like `Error`.
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
        }
    }

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// otel-finsim: a financing simulation service instrumented with OpenTelemetry.
#[derive(Parser, Debug, Clone)]
#[command(name = "otel-finsim")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "FINSIM_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "FINSIM_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Service name reported in the telemetry resource and in every log line
    #[arg(long, env = "OTEL_SERVICE_NAME", default_value = "poc-fastapi-service")]
    pub service_name: String,

    /// OpenTelemetry collector endpoint (OTLP/HTTP form is converted to gRPC)
    #[arg(
        long,
        env = "OTEL_EXPORTER_OTLP_ENDPOINT",
        default_value = "http://otel-collector:4318"
    )]
    pub otel_endpoint: String,

    /// Log level (DEBUG, INFO, WARNING, ERROR, CRITICAL)
    #[arg(
        long,
        env = "LOG_LEVEL",
        value_enum,
        ignore_case = true,
        default_value = "info"
    )]
    pub log_level: LogLevel,

    /// URL of the external rate service queried during a simulation
    #[arg(
        long,
        env = "FINSIM_RATE_SERVICE_URL",
        default_value = "https://httpbin.org/delay/0.15"
    )]
    pub rate_service_url: String,

    /// Timeout for the external rate service, in seconds
    #[arg(long, env = "FINSIM_RATE_SERVICE_TIMEOUT_SECS", default_value_t = 5)]
    pub rate_service_timeout_secs: u64,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Collector address in the `host:port` form the gRPC exporters expect.
    pub fn grpc_endpoint(&self) -> String {
        grpc_endpoint(&self.otel_endpoint)
    }

    /// Create a configuration suitable for in-process tests.
    pub fn test_config(rate_service_url: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            rate_service_url: rate_service_url.into(),
            rate_service_timeout_secs: 1,
            log_level: LogLevel::Debug,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            service_name: "poc-fastapi-service".into(),
            otel_endpoint: "http://otel-collector:4318".into(),
            log_level: LogLevel::Info,
            rate_service_url: "https://httpbin.org/delay/0.15".into(),
            rate_service_timeout_secs: 5,
        }
    }
}

/// Convert a collector endpoint to the bare `host:port` used over gRPC.
///
/// A scheme-prefixed endpoint loses its scheme and has the OTLP/HTTP port
/// swapped for the gRPC one. A bare host gets the gRPC port appended. A
/// bare `host:port` is returned unchanged, whatever the port.
pub fn grpc_endpoint(endpoint: &str) -> String {
    let stripped = endpoint
        .strip_prefix("http://")
        .or_else(|| endpoint.strip_prefix("https://"));

    match stripped {
        Some(rest) => rest.replace(OTLP_HTTP_PORT, OTLP_GRPC_PORT),
        None if endpoint.contains(':') => endpoint.to_string(),
        None => format!("{endpoint}{OTLP_GRPC_PORT}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.service_name, "poc-fastapi-service");
        assert_eq!(config.grpc_endpoint(), "otel-collector:4317");
    }

    #[test]
    fn test_cli_defaults_match_default_config() {
        use clap::CommandFactory;

        let command = Config::command();
        let default_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_default_values().first())
                .and_then(|value| value.to_str())
                .map(str::to_string)
        };

        let config = Config::default();
        assert_eq!(default_of("service_name"), Some(config.service_name));
        assert_eq!(default_of("otel_endpoint"), Some(config.otel_endpoint));
        assert_eq!(default_of("rate_service_url"), Some(config.rate_service_url));
    }

    #[test]
    fn test_grpc_endpoint_strips_http_scheme() {
        assert_eq!(grpc_endpoint("http://collector:4318"), "collector:4317");
    }

    #[test]
    fn test_grpc_endpoint_strips_https_scheme() {
        assert_eq!(grpc_endpoint("https://collector:4318"), "collector:4317");
    }

    #[test]
    fn test_grpc_endpoint_appends_default_port() {
        assert_eq!(grpc_endpoint("collector"), "collector:4317");
    }

    #[test]
    fn test_grpc_endpoint_keeps_custom_port() {
        assert_eq!(grpc_endpoint("collector:9999"), "collector:9999");
        assert_eq!(grpc_endpoint("http://collector:9999"), "collector:9999");
    }

    #[test]
    fn test_grpc_endpoint_without_scheme_keeps_http_port() {
        // The port rewrite only applies to scheme-prefixed endpoints.
        assert_eq!(grpc_endpoint("collector:4318"), "collector:4318");
    }

    #[test]
    fn test_grpc_endpoint_scheme_without_port() {
        assert_eq!(grpc_endpoint("http://collector"), "collector");
    }

    #[test]
    fn test_parse_log_level_ignores_case() {
        let config = Config::try_parse_from(["otel-finsim", "--log-level", "WARNING"])
            .expect("valid args");
        assert_eq!(config.log_level, LogLevel::Warning);

        let config = Config::try_parse_from(["otel-finsim", "--log-level", "critical"])
            .expect("valid args");
        assert_eq!(config.log_level.as_level_filter(), LevelFilter::ERROR);
    }

    #[test]
    fn test_parse_rejects_unknown_log_level() {
        assert!(Config::try_parse_from(["otel-finsim", "--log-level", "verbose"]).is_err());
    }

    #[test]
    fn test_parse_cli_overrides() {
        let config = Config::try_parse_from([
            "otel-finsim",
            "--port",
            "9090",
            "--otel-endpoint",
            "https://collector.internal:4318",
            "--service-name",
            "finsim-test",
        ])
        .expect("valid args");

        assert_eq!(config.port, 9090);
        assert_eq!(config.service_name, "finsim-test");
        assert_eq!(config.grpc_endpoint(), "collector.internal:4317");
    }
}
