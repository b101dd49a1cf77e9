//! Client for the external rate service.
//!
//! Every call runs in an `otel.kind = client` span and carries the span's
//! trace context in a `traceparent` header.

use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use thiserror::Error;

use crate::observability::propagation::inject_context;

/// Errors from the rate service call.
#[derive(Debug, Error)]
pub enum RateError {
    #[error("request to rate service failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("rate service returned {0}")]
    Status(StatusCode),
}

/// HTTP client for the rate service.
#[derive(Debug, Clone)]
pub struct RateClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
    label: String,
}

impl RateClient {
    /// Create a client calling `url` with the given per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let url = url.into();
        let label = Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "rate-service".to_string());
        Self {
            http: reqwest::Client::new(),
            url,
            timeout,
            label,
        }
    }

    /// Name of the remote service used in log fields (the URL's host).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Query the rate service, returning the time until response headers in
    /// milliseconds. Non-2xx responses are errors.
    #[tracing::instrument(
        name = "rate_service_request",
        skip(self),
        fields(
            otel.name = "GET",
            otel.kind = "client",
            otel.status_code = tracing::field::Empty,
            http.request.method = "GET",
            url.full = %self.url,
            http.response.status_code = tracing::field::Empty,
        )
    )]
    pub async fn fetch_latency_ms(&self) -> Result<f64, RateError> {
        let span = tracing::Span::current();
        let mut headers = HeaderMap::new();
        inject_context(&span, &mut headers);

        let started = Instant::now();
        let response = self
            .http
            .get(&self.url)
            .headers(headers)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                span.record("otel.status_code", "ERROR");
                e
            })?;
        let elapsed = started.elapsed();

        let status = response.status();
        span.record("http.response.status_code", status.as_u16());
        if !status.is_success() {
            span.record("otel.status_code", "ERROR");
            return Err(RateError::Status(status));
        }

        Ok(elapsed.as_secs_f64() * 1000.0)
    }
}
