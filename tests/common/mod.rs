//! Test utilities and harness for finsim integration tests.
//!
//! Provides:
//! - In-memory capture of JSON log lines
//! - A mock rate service on a random local port
//! - Router builders and request helpers

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use opentelemetry::trace::TracerProvider as _;
use otel_finsim::config::{Config, LogLevel};
use otel_finsim::observability::metrics::Metrics;
use otel_finsim::observability::tracing::{json_log_layer, telemetry_subscriber};
use otel_finsim::server::{create_router, AppState};
use serde_json::Value;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

/// Service name used by every test subscriber.
pub const TEST_SERVICE: &str = "finsim-test";

/// A rate service URL nothing listens on.
pub const UNREACHABLE_RATE_URL: &str = "http://127.0.0.1:1/delay";

/// Shared buffer collecting everything the JSON formatter writes.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer poisoned").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl CapturedLogs {
    /// Every captured line parsed as JSON. Panics if a line is not JSON.
    pub fn records(&self) -> Vec<Value> {
        let bytes = self.0.lock().expect("log buffer poisoned").clone();
        String::from_utf8(bytes)
            .expect("logs are UTF-8")
            .lines()
            .map(|line| {
                serde_json::from_str(line).unwrap_or_else(|e| panic!("not JSON ({e}): {line}"))
            })
            .collect()
    }

    /// Records emitted by this crate, excluding dependencies' events.
    pub fn own_records(&self) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r["logger"].as_str().is_some_and(|l| l.starts_with("otel_finsim")))
            .collect()
    }

    /// Records emitted by the request logging middleware.
    pub fn http_records(&self) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r.pointer("/extra/http/status_code").is_some())
            .collect()
    }

    /// Request log records for `path`.
    pub fn http_records_for(&self, path: &str) -> Vec<Value> {
        self.http_records()
            .into_iter()
            .filter(|r| r.pointer("/extra/http/path").and_then(Value::as_str) == Some(path))
            .collect()
    }

    /// Records whose `extra.event` equals `event`.
    pub fn events(&self, event: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r.pointer("/extra/event").and_then(Value::as_str) == Some(event))
            .collect()
    }
}

/// Subscriber writing JSON logs into a buffer.
pub fn capture_subscriber() -> (impl Subscriber + Send + Sync, CapturedLogs) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(json_log_layer(TEST_SERVICE, logs.clone()));
    (subscriber, logs)
}

/// Subscriber writing JSON logs into a buffer, with OpenTelemetry span data
/// so log lines carry trace ids and outbound calls carry `traceparent`.
///
/// Keep the returned provider alive for as long as the subscriber is used.
pub fn capture_subscriber_with_otel() -> (
    impl Subscriber + Send + Sync,
    CapturedLogs,
    opentelemetry_sdk::trace::TracerProvider,
) {
    let provider = opentelemetry_sdk::trace::TracerProvider::builder().build();
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry()
        .with(tracing_opentelemetry::layer().with_tracer(provider.tracer("finsim-test")))
        .with(json_log_layer(TEST_SERVICE, logs.clone()));
    (subscriber, logs, provider)
}

/// The production subscriber at `level`, writing JSON logs into a buffer.
///
/// Keep the returned provider alive for as long as the subscriber is used.
pub fn capture_subscriber_at(
    level: LogLevel,
) -> (
    impl Subscriber + Send + Sync,
    CapturedLogs,
    opentelemetry_sdk::trace::TracerProvider,
) {
    let provider = opentelemetry_sdk::trace::TracerProvider::builder().build();
    let logs = CapturedLogs::default();
    let subscriber = telemetry_subscriber(
        TEST_SERVICE,
        level,
        provider.tracer("finsim-test"),
        logs.clone(),
    );
    (subscriber, logs, provider)
}

/// Application router calling the rate service at `rate_url`.
pub fn app(rate_url: &str) -> Router {
    let mut config = Config::test_config(rate_url);
    config.service_name = TEST_SERVICE.to_string();
    create_router(AppState::new(Arc::new(config), Metrics::disabled()))
}

/// Send a GET through the router and decode the JSON body, if any.
pub async fn send_get(router: Router, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = router
        .oneshot(builder.body(Body::empty()).expect("valid request"))
        .await
        .expect("router is infallible");

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// A local stand-in for the external rate service.
pub struct MockRateService {
    /// URL to configure as the rate service.
    pub url: String,
    /// `traceparent` header of every request received.
    pub traceparents: Arc<Mutex<Vec<Option<String>>>>,
}

impl MockRateService {
    /// Start a mock answering every request with `status`.
    pub async fn start(status: StatusCode) -> Self {
        let traceparents = Arc::new(Mutex::new(Vec::new()));
        let seen = traceparents.clone();

        let router = Router::new().route(
            "/delay",
            get(move |headers: HeaderMap| {
                let seen = seen.clone();
                async move {
                    let traceparent = headers
                        .get("traceparent")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    seen.lock().expect("mock state poisoned").push(traceparent);
                    (status, "{}")
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock rate service");
        let addr = listener.local_addr().expect("mock has an address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            url: format!("http://{addr}/delay"),
            traceparents,
        }
    }

    /// Number of requests received so far.
    pub fn hits(&self) -> usize {
        self.traceparents.lock().expect("mock state poisoned").len()
    }
}
