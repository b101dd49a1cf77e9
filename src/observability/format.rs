//! JSON log formatter with OpenTelemetry trace context.
//!
//! Every event becomes one JSON object on one line:
//!
//! ```text
//! {"timestamp":"2025-01-01T12:00:00.000000Z","level":"INFO","logger":"otel_finsim::service",
//!  "message":"Simulation completed","service":"poc-fastapi-service",
//!  "trace_id":"4bf92f3577b34da6a3ce929d0e0e4736","span_id":"00f067aa0ba902b7",
//!  "source":{"file":"src/service/simulation.rs","line":88,"function":"simular_financiamento"},
//!  "extra":{"event":"simulation_completed","business":{"taxa_externa_ms":150.0}}}
//! ```
//!
//! Consumers must access keys by name; key order is not part of the format.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use opentelemetry::trace::TraceContextExt;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_opentelemetry::OtelData;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Field prefixes used for bookkeeping by tracing-log and tracing-opentelemetry.
const INTERNAL_PREFIXES: &[&str] = &["log.", "otel."];

/// Call site of a log event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: String,
}

/// A log event flattened into the shape written to the log stream.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: &'static str,
    pub logger: String,
    pub message: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl LogRecord {
    /// Create a record stamped with the current UTC time.
    pub fn new(
        level: &Level,
        logger: impl Into<String>,
        message: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            level: level_name(level),
            logger: logger.into(),
            message: message.into(),
            service: service.into(),
            trace_id: None,
            span_id: None,
            source: None,
            extra: Map::new(),
            exception: None,
        }
    }

    /// Insert an extra field, nesting dotted keys into objects.
    ///
    /// Keys starting with `_` and bookkeeping keys are dropped.
    pub fn insert_extra(&mut self, key: &str, value: Value) {
        if !is_public_field(key) {
            return;
        }
        insert_nested(&mut self.extra, key, value);
    }

    /// Serialize to a single JSON line. Never fails.
    pub fn to_json_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(line) => line,
            Err(e) => serde_json::json!({
                "timestamp": self.timestamp,
                "level": self.level,
                "logger": self.logger,
                "message": self.message,
                "service": self.service,
                "format_error": e.to_string(),
            })
            .to_string(),
        }
    }
}

/// Upper-case level names; `WARN` is spelled out as `WARNING`.
pub fn level_name(level: &Level) -> &'static str {
    if *level == Level::ERROR {
        "ERROR"
    } else if *level == Level::WARN {
        "WARNING"
    } else if *level == Level::INFO {
        "INFO"
    } else if *level == Level::DEBUG {
        "DEBUG"
    } else {
        "TRACE"
    }
}

fn is_public_field(key: &str) -> bool {
    key != "message"
        && !key.starts_with('_')
        && !INTERNAL_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}

fn insert_nested(map: &mut Map<String, Value>, key: &str, value: Value) {
    match key.split_once('.') {
        Some((head, rest)) if !head.is_empty() && !rest.is_empty() => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(inner) = entry {
                insert_nested(inner, rest, value);
            }
        }
        _ => {
            map.insert(key.to_string(), value);
        }
    }
}

/// Render an error and its `source()` chain.
pub fn format_error_chain(error: &(dyn Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    if source.is_some() {
        rendered.push_str("\n\nCaused by:");
    }
    let mut depth = 0;
    while let Some(cause) = source {
        rendered.push_str(&format!("\n    {depth}: {cause}"));
        depth += 1;
        source = cause.source();
    }
    rendered
}

/// Collects event fields into JSON values.
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Vec<(&'static str, Value)>,
    exception: Option<String>,
}

impl FieldCollector {
    fn push(&mut self, field: &Field, value: Value) {
        self.fields.push((field.name(), value));
    }
}

impl Visit for FieldCollector {
    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.push(field, value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, Value::from(value));
    }

    fn record_i128(&mut self, field: &Field, value: i128) {
        let value = i64::try_from(value)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        self.push(field, value);
    }

    fn record_u128(&mut self, field: &Field, value: u128) {
        let value = u64::try_from(value)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        self.push(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.push(field, Value::String(value.to_string()));
        }
    }

    fn record_error(&mut self, _field: &Field, value: &(dyn Error + 'static)) {
        self.exception = Some(format_error_chain(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.push(field, Value::String(format!("{value:?}")));
        }
    }
}

/// Trace and span ids of an OpenTelemetry-backed span, as lowercase hex.
fn trace_context(otel: &OtelData) -> Option<(String, String)> {
    let span_id = otel.builder.span_id?;
    let parent = otel.parent_cx.span();
    let parent_context = parent.span_context();
    let trace_id = if parent_context.is_valid() {
        parent_context.trace_id()
    } else {
        otel.builder.trace_id?
    };
    Some((trace_id.to_string(), span_id.to_string()))
}

/// `tracing_subscriber` event formatter producing one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    service: Arc<str>,
}

impl JsonFormatter {
    /// Create a formatter that stamps every record with `service`.
    pub fn new(service: &str) -> Self {
        Self {
            service: Arc::from(service),
        }
    }
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let mut record = LogRecord::new(
            metadata.level(),
            metadata.target(),
            fields.message.take().unwrap_or_default(),
            self.service.as_ref(),
        );

        // Walk from the innermost span outwards: the first span names the
        // function, the first span with OpenTelemetry data supplies the ids.
        let mut function = None;
        if let Some(scope) = ctx.event_scope() {
            for span in scope {
                if function.is_none() {
                    function = Some(span.name().to_string());
                }
                if let Some((trace_id, span_id)) =
                    span.extensions().get::<OtelData>().and_then(trace_context)
                {
                    record.trace_id = Some(trace_id);
                    record.span_id = Some(span_id);
                    break;
                }
            }
        }

        record.source = Some(SourceLocation {
            file: metadata.file().map(str::to_string),
            line: metadata.line(),
            function: function
                .or_else(|| metadata.module_path().map(str::to_string))
                .unwrap_or_else(|| metadata.target().to_string()),
        });

        for (key, value) in fields.fields {
            record.insert_extra(key, value);
        }
        record.exception = fields.exception;

        writeln!(writer, "{}", record.to_json_line())
    }
}
