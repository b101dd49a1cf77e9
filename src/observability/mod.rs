//! OpenTelemetry observability infrastructure.
//!
//! Provides:
//! - Structured JSON logging carrying trace context
//! - OTLP trace export (batched, plaintext gRPC)
//! - OTLP metrics export (periodic, plaintext gRPC)
//! - W3C trace context propagation helpers
//!
//! Everything is set up once by [`init_telemetry`], which returns the
//! [`Telemetry`] handle owning the providers.

pub mod format;
pub mod metrics;
pub mod propagation;
pub mod tracing;

use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use thiserror::Error;

use crate::config::Config;
use self::metrics::Metrics;

/// Errors raised while setting up telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to build OTLP trace pipeline: {0}")]
    Trace(#[from] opentelemetry::trace::TraceError),

    #[error("global subscriber already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Handle to the process-wide telemetry providers.
///
/// Created once at boot by [`init_telemetry`]; call [`Telemetry::shutdown`]
/// before exiting so buffered spans and metrics are flushed.
pub struct Telemetry {
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
    metrics: Metrics,
}

impl Telemetry {
    /// Instruments backed by the exporting meter provider.
    pub fn metrics(&self) -> Metrics {
        self.metrics.clone()
    }

    /// Flush and shut down both providers.
    pub fn shutdown(self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            ::tracing::warn!(error = %e, "Failed to shut down tracer provider");
        }
        if let Err(e) = self.meter_provider.shutdown() {
            ::tracing::warn!(error = %e, "Failed to shut down meter provider");
        }
    }
}

/// Resource describing this service.
pub fn resource(service_name: &str) -> Resource {
    Resource::new([KeyValue::new("service.name", service_name.to_string())])
}

/// Initialize traces, metrics and logging from `config`.
///
/// Must be called once, from inside the Tokio runtime. A second call fails
/// with [`TelemetryError::AlreadyInitialized`].
pub fn init_telemetry(config: &Config) -> Result<Telemetry, TelemetryError> {
    let endpoint = config.grpc_endpoint();
    let resource = resource(&config.service_name);

    let tracer_provider = tracing::build_tracer_provider(&endpoint, resource.clone())?;
    let (meter_provider, metrics_error) = metrics::build_meter_provider(&endpoint, resource);

    tracing::init_tracing(&config.service_name, config.log_level, &tracer_provider)?;

    if let Some(e) = metrics_error {
        ::tracing::warn!(error = %e, "Failed to create OTLP metrics exporter, metrics will not be exported");
    }

    ::tracing::info!(
        service = %config.service_name,
        endpoint = %endpoint,
        log_level = %config.log_level,
        "Telemetry initialized"
    );

    let metrics = metrics::metrics_for(&meter_provider);
    Ok(Telemetry {
        tracer_provider,
        meter_provider,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_carries_service_name() {
        let resource = resource("finsim-test");
        let name = resource
            .get(opentelemetry::Key::new("service.name"))
            .map(|v| v.to_string());
        assert_eq!(name.as_deref(), Some("finsim-test"));
    }
}
