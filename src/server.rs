//! HTTP server setup and lifecycle.
//!
//! Configures the axum router with:
//! - Status, health and simulation handlers
//! - Server spans, HTTP metrics and request logging middleware
//! - Graceful shutdown support

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, MethodRouter};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::catch_panic::CatchPanicLayer;

use crate::config::Config;
use crate::http::{log_requests, trace_layer, RequestLogging};
use crate::observability::metrics::{record_http_metrics, Metrics};
use crate::service::{self, RateClient};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rates: RateClient,
    pub metrics: Metrics,
}

impl AppState {
    /// Build the state from the boot-time configuration.
    pub fn new(config: Arc<Config>, metrics: Metrics) -> Self {
        let rates = RateClient::new(
            config.rate_service_url.clone(),
            Duration::from_secs(config.rate_service_timeout_secs),
        );
        Self {
            config,
            rates,
            metrics,
        }
    }
}

/// Create the application router with the default logging skip-set.
pub fn create_router(state: AppState) -> Router {
    create_router_with_logging(state, RequestLogging::default())
}

/// Create the application router with a custom request logging policy.
pub fn create_router_with_logging(state: AppState, logging: RequestLogging) -> Router {
    let metrics = state.metrics.clone();

    let routes = Router::new()
        .route("/", get(service::root))
        .route("/health", get(service::health))
        .route(
            "/simular-financiamento",
            guard_panics(get(service::simular_financiamento)),
        )
        .with_state(state);

    with_middleware(routes, metrics, logging)
}

/// Answer a panic in `route` with the simulation's HTTP 500 body.
pub fn guard_panics<S>(route: MethodRouter<S>) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    route.layer(CatchPanicLayer::custom(service::panic_response))
}

/// Wrap `routes` in the request middleware.
///
/// Layers, outermost first: server span, HTTP metrics, request logging.
pub fn with_middleware(routes: Router, metrics: Metrics, logging: RequestLogging) -> Router {
    routes
        .layer(from_fn_with_state(logging, log_requests))
        .layer(from_fn_with_state(metrics, record_http_metrics))
        .layer(trace_layer())
}

/// Run the HTTP server on an already bound listener until shutdown.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.changed().await;
        tracing::info!("Shutdown signal received, stopping server");
    })
    .await
}

/// Run the finsim HTTP server.
///
/// # Arguments
///
/// * `config` - Server configuration
/// * `metrics` - Instruments recording HTTP and simulation metrics
/// * `shutdown_rx` - Receiver for shutdown signal
///
/// # Returns
///
/// Returns when the server has shut down.
pub async fn run_server(
    config: Arc<Config>,
    metrics: Metrics,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let state = AppState::new(config, metrics);
    let router = create_router(state);

    tracing::info!(address = %listener.local_addr()?, "Starting finsim HTTP server");

    serve(listener, router, shutdown_rx)
        .await
        .context("HTTP server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}
