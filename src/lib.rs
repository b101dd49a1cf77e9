//! otel-finsim: a financing simulation service instrumented with OpenTelemetry.
//!
//! The business endpoint is deliberately small; the point of the service is
//! the telemetry wired around it.
//!
//! # Architecture
//!
//! - **Traces**: a server span per request and a client span per outbound
//!   call, exported over OTLP/gRPC with W3C context propagation
//! - **Metrics**: request count/latency and simulation outcomes, exported
//!   every 5 seconds over OTLP/gRPC
//! - **Logs**: one JSON object per event, carrying `trace_id`/`span_id`
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration, collector endpoint normalization
//! - [`http`]: Server span and request logging middleware
//! - [`observability`]: Telemetry setup, JSON log formatter, metrics, propagation
//! - [`server`]: Router assembly and server lifecycle
//! - [`service`]: Handlers and the rate service client

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // http::logging::RequestLogging is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc       // Panic docs can be verbose
)]

pub mod config;
pub mod http;
pub mod observability;
pub mod server;
pub mod service;

pub use config::{Config, LogLevel};
pub use observability::{init_telemetry, Telemetry, TelemetryError};
pub use server::{create_router, AppState};
