//! Per-request structured logging.
//!
//! Every request whose path is not in the skip-set produces exactly one log
//! event after the handler has finished, at a severity derived from the
//! response status.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::Response;

/// Paths that are never logged: the root status check, health and docs.
pub const DEFAULT_SKIP_PATHS: &[&str] = &["/", "/health", "/docs", "/redoc", "/openapi.json"];

/// Log severity for a finished request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Classify a status code. Total over every `u16`: anything below 400,
    /// conventional or not, is `Info`.
    pub fn for_status(status: u16) -> Self {
        match status {
            500.. => Severity::Error,
            400..=499 => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// What the middleware observed about one request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpObservation {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub status: u16,
    pub duration_ms: f64,
    pub client_ip: String,
    pub user_agent: String,
}

impl HttpObservation {
    /// Severity of this observation.
    pub fn severity(&self) -> Severity {
        Severity::for_status(self.status)
    }

    /// Human-readable summary used as the log message.
    pub fn message(&self) -> String {
        let summary = format!("{} {} - {}", self.method, self.path, self.status);
        match self.severity() {
            Severity::Error => format!("{summary} (server error)"),
            Severity::Warning => format!("{summary} (client error)"),
            Severity::Info => summary,
        }
    }

    /// Emit the log event for this observation.
    pub fn emit(&self) {
        let message = self.message();
        macro_rules! emit_at {
            ($level:ident) => {
                tracing::$level!(
                    http.method = %self.method,
                    http.path = %self.path,
                    http.query_params = self.query.as_deref(),
                    http.status_code = self.status,
                    http.duration_ms = self.duration_ms,
                    http.client_ip = %self.client_ip,
                    http.user_agent = %self.user_agent,
                    "{message}"
                )
            };
        }

        match self.severity() {
            Severity::Error => emit_at!(error),
            Severity::Warning => emit_at!(warn),
            Severity::Info => emit_at!(info),
        }
    }
}

/// Round to two decimal places.
pub fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// Middleware state: the set of paths that are not logged.
#[derive(Debug, Clone)]
pub struct RequestLogging {
    skip_paths: Arc<HashSet<String>>,
}

impl RequestLogging {
    /// Log every request except those whose path is in `skip_paths`.
    pub fn new<I, P>(skip_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            skip_paths: Arc::new(skip_paths.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether requests to `path` are skipped.
    pub fn skips(&self, path: &str) -> bool {
        self.skip_paths.contains(path)
    }
}

impl Default for RequestLogging {
    fn default() -> Self {
        Self::new(DEFAULT_SKIP_PATHS.iter().copied())
    }
}

/// Axum middleware logging one event per non-skipped request.
pub async fn log_requests(
    State(logging): State<RequestLogging>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if logging.skips(request.uri().path()) {
        return next.run(request).await;
    }

    let start = Instant::now();

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = request
        .uri()
        .query()
        .filter(|q| !q.is_empty())
        .map(str::to_string);
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let response = next.run(request).await;

    let observation = HttpObservation {
        method,
        path,
        query,
        status: response.status().as_u16(),
        duration_ms: round_ms(start.elapsed().as_secs_f64() * 1000.0),
        client_ip,
        user_agent,
    };
    observation.emit();

    response
}
