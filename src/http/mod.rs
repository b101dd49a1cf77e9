//! HTTP middleware: server spans and per-request logging.
//!
//! ```text
//! inbound request
//!     → trace.rs   (server span, W3C parent extraction)
//!     → metrics    (count + latency, every request)
//!     → logging.rs (one JSON event per non-skipped request)
//!     → handler
//! ```

pub mod logging;
pub mod trace;

pub use logging::{log_requests, HttpObservation, RequestLogging, Severity};
pub use trace::trace_layer;
