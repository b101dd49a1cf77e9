//! Subscriber setup: JSON logs and OpenTelemetry span export.
//!
//! Configures structured logging with:
//! - One JSON object per event (see [`super::format`])
//! - W3C trace and span ids on every event emitted inside a span
//! - OTLP exporter for distributed tracing
//!
//! The configured log level gates log events only. Spans are recorded
//! whatever the level, so traces are exported and every record keeps its ids.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use opentelemetry_sdk::Resource;
use tracing::Subscriber;
use tracing_subscriber::filter::{filter_fn, FilterExt};
use tracing_subscriber::fmt::format::DefaultFields;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Filter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use super::format::JsonFormatter;
use crate::config::LogLevel;

/// Instrumentation scope name for spans produced by this crate.
pub const TRACER_NAME: &str = "otel-finsim";

/// Dependencies that are capped at `warn` whatever the configured level.
const QUIET_TARGETS: &[&str] = &[
    "h2",
    "hyper",
    "hyper_util",
    "tonic",
    "tower",
    "reqwest",
    "opentelemetry",
    "opentelemetry_sdk",
    "opentelemetry_otlp",
];

/// Filter directives for `level`, with noisy dependencies capped at `warn`.
pub fn filter_directives(level: LogLevel) -> String {
    let mut directives = level.as_level_filter().to_string().to_lowercase();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{target}=warn"));
    }
    directives
}

/// Build the event filter: `RUST_LOG` wins, otherwise `level`.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directives(level)))
}

/// Spans recorded whatever the log level: this crate's spans at `info` and
/// above, with noisy dependencies capped at `warn`.
pub fn span_filter() -> EnvFilter {
    EnvFilter::new(filter_directives(LogLevel::Info))
}

/// Per-layer filter for the JSON log layer.
///
/// `level` only gates events. Spans pass by [`span_filter`] so that records
/// emitted at any level still see their enclosing spans and trace ids.
pub fn log_filter<S>(level: LogLevel) -> impl Filter<S> + Send + Sync + 'static
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let spans = FilterExt::<S>::and(filter_fn(|metadata| metadata.is_span()), span_filter());
    FilterExt::<S>::or(spans, env_filter(level))
}

/// A fmt layer writing JSON records for `service_name` to `make_writer`.
pub fn json_log_layer<S, W>(
    service_name: &str,
    make_writer: W,
) -> tracing_subscriber::fmt::Layer<S, DefaultFields, JsonFormatter, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(JsonFormatter::new(service_name))
        .with_writer(make_writer)
}

/// Build the tracer provider exporting spans over OTLP/gRPC in batches.
pub fn build_tracer_provider(
    grpc_endpoint: &str,
    resource: Resource,
) -> Result<TracerProvider, opentelemetry::trace::TraceError> {
    use opentelemetry_otlp::{Protocol, WithExportConfig};

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(format!("http://{grpc_endpoint}"))
        .with_protocol(Protocol::Grpc);

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(resource))
        .install_batch(opentelemetry_sdk::runtime::Tokio)
}

/// Compose the subscriber: OpenTelemetry bridge filtered by [`span_filter`]
/// and JSON logs filtered by [`log_filter`].
pub fn telemetry_subscriber<W>(
    service_name: &str,
    level: LogLevel,
    tracer: Tracer,
    make_writer: W,
) -> impl Subscriber + for<'a> LookupSpan<'a> + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let otel_layer = tracing_opentelemetry::layer()
        .with_tracer(tracer)
        .with_filter(span_filter());

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(json_log_layer(service_name, make_writer).with_filter(log_filter(level)))
}

/// Install the global subscriber with JSON logs on stdout.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(
    service_name: &str,
    level: LogLevel,
    provider: &TracerProvider,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    telemetry_subscriber(
        service_name,
        level,
        provider.tracer(TRACER_NAME),
        std::io::stdout,
    )
    .try_init()
}

/// Initialize tracing for tests (only logs errors).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("error"))
        .with(json_log_layer("test", tracing_subscriber::fmt::TestWriter::new()))
        .try_init();
}
