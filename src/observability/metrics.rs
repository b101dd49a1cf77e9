//! OTLP metrics for the HTTP surface and the simulation flow.
//!
//! Key metrics:
//! - http.server.requests: Counter of served requests by method, route and status
//! - http.server.request.duration: Histogram of request latency in seconds
//! - finsim.rate_service.fallbacks: Counter of rate service calls answered by the fallback
//! - finsim.simulations: Counter of simulations by outcome

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{MatchedPath, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider as _};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;

/// Instrumentation scope name used for every instrument.
pub const METER_NAME: &str = "otel-finsim";

/// Export interval for the periodic OTLP reader.
pub const EXPORT_INTERVAL: Duration = Duration::from_millis(5000);

/// Finsim metrics registry.
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Total number of served HTTP requests.
    pub http_requests: Counter<u64>,
    /// Histogram of HTTP request latency in seconds.
    pub http_duration: Histogram<f64>,
    /// Rate service calls that fell back to the simulated value.
    pub rate_fallbacks: Counter<u64>,
    /// Simulations by outcome.
    pub simulations: Counter<u64>,
}

impl Metrics {
    /// Create the instruments from a meter.
    pub fn new(meter: &Meter) -> Self {
        Self {
            http_requests: meter
                .u64_counter("http.server.requests")
                .with_description("Total number of HTTP requests served")
                .with_unit("1")
                .init(),
            http_duration: meter
                .f64_histogram("http.server.request.duration")
                .with_description("Duration of HTTP server requests")
                .with_unit("s")
                .init(),
            rate_fallbacks: meter
                .u64_counter("finsim.rate_service.fallbacks")
                .with_description("Rate service calls answered with the simulated value")
                .with_unit("1")
                .init(),
            simulations: meter
                .u64_counter("finsim.simulations")
                .with_description("Financing simulations by outcome")
                .with_unit("1")
                .init(),
        }
    }

    /// Instruments bound to the global meter, which records nothing unless a
    /// provider has been installed there. Used when running without a collector.
    pub fn disabled() -> Self {
        Self::new(&global::meter(METER_NAME))
    }

    /// Record one served request.
    pub fn record_request(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        let attrs = [
            KeyValue::new("http.request.method", method.to_string()),
            KeyValue::new("http.route", route.to_string()),
            KeyValue::new("http.response.status_code", i64::from(status)),
        ];
        self.http_requests.add(1, &attrs);
        self.http_duration.record(elapsed.as_secs_f64(), &attrs);
    }

    /// Record a rate service fallback.
    pub fn record_rate_fallback(&self) {
        self.rate_fallbacks.add(1, &[]);
    }

    /// Record a finished simulation.
    pub fn record_simulation(&self, outcome: &'static str) {
        self.simulations.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

/// Build the meter provider exporting over OTLP/gRPC every [`EXPORT_INTERVAL`].
///
/// Falls back to a manual reader (metrics recorded, never exported) when the
/// exporter cannot be built; the error is returned alongside for logging once
/// the subscriber is up.
pub fn build_meter_provider(
    grpc_endpoint: &str,
    resource: Resource,
) -> (SdkMeterProvider, Option<opentelemetry::metrics::MetricsError>) {
    use opentelemetry_otlp::{Protocol, WithExportConfig};

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(format!("http://{grpc_endpoint}"))
        .with_protocol(Protocol::Grpc);

    match opentelemetry_otlp::new_pipeline()
        .metrics(opentelemetry_sdk::runtime::Tokio)
        .with_exporter(exporter)
        .with_resource(resource.clone())
        .with_period(EXPORT_INTERVAL)
        .build()
    {
        Ok(provider) => (provider, None),
        Err(e) => {
            let reader = ManualReader::builder().build();
            let provider = SdkMeterProvider::builder()
                .with_reader(reader)
                .with_resource(resource)
                .build();
            (provider, Some(e))
        }
    }
}

/// Create metrics from a provider's meter.
pub fn metrics_for(provider: &SdkMeterProvider) -> Metrics {
    Metrics::new(&provider.meter(METER_NAME))
}

/// Middleware recording request count and latency for every request.
pub async fn record_http_metrics(
    State(metrics): State<Metrics>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    metrics.record_request(&method, &route, response.status().as_u16(), start.elapsed());
    response
}
