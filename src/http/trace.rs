//! Server spans for inbound requests.
//!
//! Each request gets an `otel.kind = server` span parented on the caller's
//! W3C trace context, if any. Status is recorded on the span when the
//! response is ready; request logging lives in [`super::logging`].

use std::time::Duration;

use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{MakeSpan, OnResponse, TraceLayer};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::observability::propagation::extract_context;

/// Builds the server span for a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerSpan;

impl<B> MakeSpan<B> for ServerSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str)
            .unwrap_or_else(|| request.uri().path());

        let span = tracing::info_span!(
            "http_request",
            otel.name = %format!("{} {}", request.method(), route),
            otel.kind = "server",
            otel.status_code = tracing::field::Empty,
            http.request.method = %request.method(),
            http.route = %route,
            url.path = %request.uri().path(),
            http.response.status_code = tracing::field::Empty,
        );
        span.set_parent(extract_context(request.headers()));
        span
    }
}

/// Records the response status on the server span.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordStatus;

impl<B> OnResponse<B> for RecordStatus {
    fn on_response(self, response: &Response<B>, _latency: Duration, span: &Span) {
        let status = response.status();
        span.record("http.response.status_code", status.as_u16());
        if status.is_server_error() {
            span.record("otel.status_code", "ERROR");
        }
    }
}

/// Tracing layer type produced by [`trace_layer`].
pub type ServerTraceLayer =
    TraceLayer<SharedClassifier<ServerErrorsAsFailures>, ServerSpan, (), RecordStatus, (), (), ()>;

/// Tracing layer emitting one server span per request and no log events of
/// its own.
pub fn trace_layer() -> ServerTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(ServerSpan)
        .on_request(())
        .on_response(RecordStatus)
        .on_body_chunk(())
        .on_eos(())
        .on_failure(())
}
