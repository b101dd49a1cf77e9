//! HTTP handlers for the finsim service.

pub mod rates;
pub mod simulation;

pub use rates::{RateClient, RateError};
pub use simulation::{simular_financiamento, Proposal, SimulationError};

use std::any::Any;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::server::AppState;

/// Body of GET /.
#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub status: &'static str,
    pub service: String,
}

/// Handle GET / - service status.
pub async fn root(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(ServiceStatus {
        status: "ok",
        service: state.config.service_name.clone(),
    })
}

/// Handle GET /health - Basic health check.
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Turn a handler panic into the simulation's HTTP 500 response.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };

    tracing::error!(
        event = "simulation_failed",
        error_type = "panic",
        panic = %message,
        "Simulation failed"
    );
    simulation::internal_error(&message)
}
