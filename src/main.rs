//! otel-finsim: financing simulation service with OpenTelemetry.
//!
//! # Usage
//!
//! ```bash
//! otel-finsim --port 8000 --log-level info
//! ```
//!
//! Environment variables can also be used:
//! - `OTEL_SERVICE_NAME`: Service name for telemetry and logs
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: Collector endpoint (HTTP form is converted to gRPC)
//! - `LOG_LEVEL`: DEBUG, INFO, WARNING, ERROR or CRITICAL
//! - `RUST_LOG`: Overrides the log filter entirely

use std::sync::Arc;

use otel_finsim::config::Config;
use otel_finsim::observability::init_telemetry;
use otel_finsim::server::run_server;
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
  otel-finsim v{} - Financing simulation service

  Configuration:
    Address:    {}:{}
    Service:    {}
    Collector:  {} (gRPC {})
    Log Level:  {}

  Press Ctrl+C to shutdown gracefully.
"#,
        version,
        config.host,
        config.port,
        config.service_name,
        config.otel_endpoint,
        config.grpc_endpoint(),
        config.log_level
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Arc::new(Config::parse_args());

    // Initialize traces, metrics and JSON logging
    let telemetry = init_telemetry(&config)?;

    print_banner(&config);

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn signal handler task
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                        }
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating shutdown...");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }

        let _ = shutdown_tx.send(true);
    });

    let result = run_server(config, telemetry.metrics(), shutdown_rx).await;

    match &result {
        Ok(()) => tracing::info!("otel-finsim shutdown complete"),
        Err(e) => tracing::error!(error = %format!("{e:#}"), "Server failed"),
    }

    // Flush buffered spans and metrics before exiting
    telemetry.shutdown();
    result
}
