//! Financing simulation.
//!
//! Simulates internal work, queries the external rate service (falling back
//! to a fixed value when it is unavailable) and returns an approved proposal.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::http::logging::round_ms;
use crate::server::AppState;

/// Rate used when the rate service cannot be reached or answers non-2xx.
pub const FALLBACK_RATE_MS: f64 = 150.0;

/// Note attached to a proposal built from the fallback rate.
pub const SIMULATED_NOTE: &str = "Valor simulado";

/// Status of every proposal this service produces.
pub const APPROVED: &str = "aprovada";

/// Internal calculation time before the rate service call.
const CALCULATION_DELAY: Duration = Duration::from_millis(100);

/// Proposal formatting time after the rate service call.
const FORMATTING_DELAY: Duration = Duration::from_millis(50);

/// A financing proposal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Proposal {
    pub proposta_status: &'static str,
    pub taxa_externa_ms: f64,
    pub observacao: Option<&'static str>,
}

impl Proposal {
    /// An approved proposal for the given rate.
    ///
    /// The note is decided by exact equality with [`FALLBACK_RATE_MS`], so a
    /// genuine 150.0 ms answer is also reported as simulated. Kept for
    /// compatibility with existing consumers of the note.
    #[allow(clippy::float_cmp)]
    pub fn approved(taxa_externa_ms: f64) -> Self {
        let observacao = (taxa_externa_ms == FALLBACK_RATE_MS).then_some(SIMULATED_NOTE);
        Self {
            proposta_status: APPROVED,
            taxa_externa_ms,
            observacao,
        }
    }
}

/// Internal failures of a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid external rate: {0} ms")]
    InvalidRate(f64),
}

impl SimulationError {
    /// Short error type name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SimulationError::InvalidRate(_) => "InvalidRate",
        }
    }
}

impl IntoResponse for SimulationError {
    fn into_response(self) -> Response {
        internal_error(&self.to_string())
    }
}

/// HTTP 500 with the simulation error detail.
pub fn internal_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": format!("Erro interno na simulação: {message}") })),
    )
        .into_response()
}

/// Run one simulation.
pub async fn simulate(state: &AppState) -> Result<Proposal, SimulationError> {
    tracing::info!(event = "simulation_started", "Starting financing simulation");

    tokio::time::sleep(CALCULATION_DELAY).await;

    let service = state.rates.label();
    tracing::info!(
        external_service = service,
        event = "external_call",
        "Querying external rate service"
    );

    let taxa_externa_ms = match state.rates.fetch_latency_ms().await {
        Ok(ms) => ms,
        Err(e) => {
            tracing::warn!(
                external_service = service,
                error = %e,
                fallback = true,
                event = "external_call_failed",
                "External rate service unavailable, using simulated value"
            );
            state.metrics.record_rate_fallback();
            FALLBACK_RATE_MS
        }
    };

    if !taxa_externa_ms.is_finite() || taxa_externa_ms < 0.0 {
        return Err(SimulationError::InvalidRate(taxa_externa_ms));
    }

    tokio::time::sleep(FORMATTING_DELAY).await;

    let proposal = Proposal::approved(taxa_externa_ms);

    tracing::info!(
        event = "simulation_completed",
        business.proposta_status = proposal.proposta_status,
        business.taxa_externa_ms = round_ms(proposal.taxa_externa_ms),
        business.observacao = proposal.observacao,
        "Simulation completed successfully"
    );

    Ok(proposal)
}

/// Handle GET /simular-financiamento.
#[tracing::instrument(skip(state))]
pub async fn simular_financiamento(
    State(state): State<AppState>,
) -> Result<Json<Proposal>, SimulationError> {
    match simulate(&state).await {
        Ok(proposal) => {
            state.metrics.record_simulation("approved");
            Ok(Json(proposal))
        }
        Err(e) => {
            state.metrics.record_simulation("failed");
            tracing::error!(
                event = "simulation_failed",
                error_type = e.kind(),
                error = &e as &(dyn std::error::Error + 'static),
                "Simulation failed"
            );
            Err(e)
        }
    }
}
