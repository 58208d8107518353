//! Shared span-pipeline helpers used by the sync and async wrappers.
//!
//! Everything that is common to one traced call lives here: building the span
//! for a registered method or a generic command, setting attributes
//! defensively, the best-effort boundary around attribute extraction, and
//! recording call outcomes.

use crate::commands::{render_fields, FieldSpec, IndexDefinition};
use crate::commands::{ExtractionError, SearchQuery, SearchReply};
use crate::instrumentor::InstrumentorConfig;
use crate::registry::MethodDescriptor;
use opentelemetry::{KeyValue, Value};
use opentelemetry_semantic_conventions as semconv;
use tracing::field::Empty;

/// Creates the span for a registered method.
///
/// The span is named after the descriptor (`otel.name`), carries the
/// `db.system.name`/`db.operation.name` baseline immediately, and declares
/// every attribute any extractor may record later. Fields that no extractor
/// fills stay empty and are dropped by the subscriber.
///
/// Field names must be literals in the `tracing` macros, so the two baseline
/// keys are spelled out; they match the semantic-convention constants used by
/// [`extract_command_attributes`].
pub(crate) fn command_span(descriptor: &MethodDescriptor) -> tracing::Span {
    tracing::info_span!(
        "redis_command",
        otel.name = %descriptor.span_name,
        "db.system.name" = "redis",
        "db.operation.name" = %descriptor.method_name,
        redis.generic = Empty,
        redis.commands.search.query = Empty,
        redis.commands.search.total = Empty,
        redis.commands.search.duration = Empty,
        redis.commands.search.docs = Empty,
        redis.create_index.fields = Empty,
        redis.create_index.definition = Empty,
        otel.status_code = Empty,
        otel.status_description = Empty,
        error = Empty,
        error.message = Empty,
        "error.type" = Empty,
    )
}

/// Creates the span for an unregistered command going through the generic
/// path, along with the attributes extracted from the command itself.
///
/// The attributes come back as OpenTelemetry key-values so callers can apply
/// them with [`apply_span_attributes`]; the operation name also feeds the span
/// name (`redis <operation>`).
pub(crate) fn generic_command_span(cmd: &redis::Cmd) -> (tracing::Span, Vec<KeyValue>) {
    let attributes = extract_command_attributes(cmd);
    let operation = get_command_name(cmd).unwrap_or_else(|| "command".to_string());
    let span_name = generate_span_name(&operation);

    let span = tracing::info_span!(
        "redis_command",
        otel.name = %span_name,
        "db.system.name" = Empty,
        "db.operation.name" = Empty,
        redis.generic = Empty,
        otel.status_code = Empty,
        otel.status_description = Empty,
        error = Empty,
        error.message = Empty,
        "error.type" = Empty,
    );

    (span, attributes)
}

/// Extracts the baseline attributes from a Redis command.
///
/// Returns `db.system.name` (always `"redis"`) and, when the command name can
/// be determined from the first argument, `db.operation.name`.
pub fn extract_command_attributes(cmd: &redis::Cmd) -> Vec<KeyValue> {
    let mut attributes = vec![KeyValue::new(semconv::attribute::DB_SYSTEM_NAME, "redis")];

    if let Some(cmd_name) = get_command_name(cmd) {
        attributes.push(KeyValue::new(
            semconv::attribute::DB_OPERATION_NAME,
            cmd_name,
        ));
    }

    attributes
}

/// Extracts the uppercased command name from the first argument.
///
/// Cursor arguments belong to the SCAN family and map to `"SCAN"`. Returns
/// `None` for empty commands or names that are not valid UTF-8; the latter is
/// logged as a warning and otherwise ignored.
pub(crate) fn get_command_name(cmd: &redis::Cmd) -> Option<String> {
    let first_arg = cmd.args_iter().next()?;
    let bytes = match first_arg {
        redis::Arg::Simple(bytes) => bytes,
        redis::Arg::Cursor => return Some("SCAN".to_string()),
    };
    match std::str::from_utf8(bytes) {
        Ok(name) => Some(name.to_uppercase()),
        Err(_) => {
            tracing::warn!("failed to parse redis command name as UTF-8");
            None
        }
    }
}

/// Generates the span name for a Redis operation: `redis <operation>` in
/// lowercase.
pub fn generate_span_name(operation: &str) -> String {
    format!("redis {}", operation.to_lowercase())
}

/// Whether a value is worth recording as a span attribute.
///
/// Empty strings carry no information and are skipped; so are value kinds that
/// have no tracing-field representation.
pub(crate) fn should_record(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.as_str().is_empty(),
        Value::I64(_) | Value::F64(_) | Value::Bool(_) => true,
        _ => false,
    }
}

/// Sets a single span attribute defensively.
///
/// The attribute is recorded only when a value is present and, for strings,
/// non-empty; anything else is a no-op. This keeps spans free of placeholder
/// data when an extractor has nothing to say.
///
/// # Examples
///
/// ```rust
/// use otel_instrumentation_redisearch::common::set_span_attribute;
/// use opentelemetry::Value;
///
/// let span = tracing::Span::current();
/// set_span_attribute(&span, "db.operation.name", Some(Value::from("GET")));
/// set_span_attribute(&span, "db.operation.name", Some(Value::from(""))); // skipped
/// set_span_attribute(&span, "db.operation.name", None); // skipped
/// ```
pub fn set_span_attribute(span: &tracing::Span, name: &str, value: Option<Value>) {
    let Some(value) = value else { return };
    if !should_record(&value) {
        return;
    }
    match value {
        Value::String(s) => {
            span.record(name, s.as_str());
        }
        Value::I64(i) => {
            span.record(name, i);
        }
        Value::F64(f) => {
            span.record(name, f);
        }
        Value::Bool(b) => {
            span.record(name, b);
        }
        _ => {}
    }
}

/// Applies a bag of extracted attributes to a span through the defensive
/// setter.
pub fn apply_span_attributes(span: &tracing::Span, attributes: &[KeyValue]) {
    for attr in attributes {
        set_span_attribute(span, attr.key.as_str(), Some(attr.value.clone()));
    }
}

/// Runs an attribute extractor inside the telemetry error boundary.
///
/// Extraction is best-effort: if the extractor fails, the failure is forwarded
/// to the configured exception logger and the traced call proceeds as if the
/// extractor had done nothing. Nothing an extractor does can abort or alter
/// the application call.
pub fn best_effort(
    config: &InstrumentorConfig,
    extract: impl FnOnce() -> Result<(), ExtractionError>,
) {
    if let Err(err) = extract() {
        config.notify_extraction_error(&err);
    }
}

/// Marks a span as a generic Redis call.
pub(crate) fn set_generic_attributes(span: &tracing::Span) -> Result<(), ExtractionError> {
    set_span_attribute(span, "redis.generic", Some(Value::I64(1)));
    Ok(())
}

/// Records the query string of a search call before it runs.
pub(crate) fn set_search_attributes(
    span: &tracing::Span,
    query: &SearchQuery,
) -> Result<(), ExtractionError> {
    set_span_attribute(
        span,
        "redis.commands.search.query",
        Some(Value::String(query.query_string().to_owned().into())),
    );
    Ok(())
}

/// Records the stringified schema arguments of a create_index call.
///
/// Fields and definition land under two distinct keys.
pub(crate) fn set_create_index_attributes(
    span: &tracing::Span,
    fields: &[FieldSpec],
    definition: &IndexDefinition,
) -> Result<(), ExtractionError> {
    set_span_attribute(
        span,
        "redis.create_index.fields",
        Some(Value::String(render_fields(fields).into())),
    );
    set_span_attribute(
        span,
        "redis.create_index.definition",
        Some(Value::String(definition.to_string().into())),
    );
    Ok(())
}

/// Records the result shape of a successful search.
pub(crate) fn record_search_reply(
    span: &tracing::Span,
    reply: &SearchReply,
) -> Result<(), ExtractionError> {
    set_span_attribute(
        span,
        "redis.commands.search.total",
        Some(Value::I64(reply.total)),
    );
    set_span_attribute(
        span,
        "redis.commands.search.duration",
        Some(Value::F64(reply.duration)),
    );
    set_span_attribute(
        span,
        "redis.commands.search.docs",
        Some(Value::String(format!("{:?}", reply.docs).into())),
    );
    Ok(())
}

/// Records the outcome of a ping: an event when the server answered, and the
/// generic marker either way.
pub(crate) fn record_ping_outcome(
    span: &tracing::Span,
    alive: bool,
) -> Result<(), ExtractionError> {
    if alive {
        tracing::event!(parent: span, tracing::Level::INFO, "redis.ping");
    }
    set_generic_attributes(span)
}

/// Records the outcome of a command on its span.
///
/// Success records an `OK` status; failure delegates to
/// [`record_error_on_span`]. The result itself is left untouched either way.
pub fn record_command_result<T>(span: &tracing::Span, result: &Result<T, redis::RedisError>) {
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            record_error_on_span(span, err);
        }
    }
}

/// Records a failed call on its span.
///
/// Sets `error`, `error.message`, the OpenTelemetry status fields, and an
/// `error.type` label categorizing the `redis::ErrorKind`. The error is
/// recorded, never swallowed; callers propagate it afterwards.
pub fn record_error_on_span(span: &tracing::Span, err: &redis::RedisError) {
    span.record("error", true);
    span.record("error.message", tracing::field::display(err));
    span.record("otel.status_code", "ERROR");
    span.record("otel.status_description", tracing::field::display(err));
    span.record("error.type", error_kind_label(err.kind()));
}

/// Stable label for an error kind, recorded as `error.type`.
pub(crate) fn error_kind_label(kind: redis::ErrorKind) -> &'static str {
    match kind {
        redis::ErrorKind::ResponseError => "response_error",
        redis::ErrorKind::AuthenticationFailed => "authentication_failed",
        redis::ErrorKind::TypeError => "type_error",
        redis::ErrorKind::ExecAbortError => "exec_abort_error",
        redis::ErrorKind::BusyLoadingError => "busy_loading_error",
        redis::ErrorKind::NoScriptError => "no_script_error",
        redis::ErrorKind::InvalidClientConfig => "invalid_client_config",
        redis::ErrorKind::Moved => "moved",
        redis::ErrorKind::Ask => "ask",
        redis::ErrorKind::TryAgain => "try_again",
        redis::ErrorKind::ClusterDown => "cluster_down",
        redis::ErrorKind::CrossSlot => "cross_slot",
        redis::ErrorKind::MasterDown => "master_down",
        redis::ErrorKind::IoError => "io_error",
        redis::ErrorKind::ClientError => "client_error",
        redis::ErrorKind::ExtensionError => "extension_error",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{descriptor_for, CommandKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_test::traced_test;

    #[test]
    fn span_name_is_lowercased_operation() {
        assert_eq!(generate_span_name("GET"), "redis get");
        assert_eq!(generate_span_name("FT.SEARCH"), "redis ft.search");
    }

    #[test]
    fn command_name_is_uppercased() {
        let mut cmd = redis::Cmd::new();
        cmd.arg("get").arg("key");
        assert_eq!(get_command_name(&cmd), Some("GET".to_string()));
    }

    #[test]
    fn empty_command_has_no_name() {
        assert_eq!(get_command_name(&redis::Cmd::new()), None);
    }

    #[traced_test]
    #[test]
    fn invalid_utf8_command_name_is_logged_and_skipped() {
        let mut cmd = redis::Cmd::new();
        cmd.arg(vec![0u8, 159, 146, 150]);
        assert_eq!(get_command_name(&cmd), None);
        assert!(logs_contain("failed to parse redis command name"));
    }

    #[test]
    fn command_attributes_carry_system_and_operation() {
        let mut cmd = redis::Cmd::new();
        cmd.arg("GET").arg("key");
        let attributes = extract_command_attributes(&cmd);

        assert!(attributes
            .iter()
            .any(|attr| attr.key.as_str() == semconv::attribute::DB_SYSTEM_NAME));
        let operation = attributes
            .iter()
            .find(|attr| attr.key.as_str() == semconv::attribute::DB_OPERATION_NAME)
            .expect("operation attribute");
        assert_eq!(operation.value.as_str(), "GET");
    }

    #[test]
    fn empty_command_omits_operation_attribute() {
        let attributes = extract_command_attributes(&redis::Cmd::new());
        assert!(attributes
            .iter()
            .any(|attr| attr.key.as_str() == semconv::attribute::DB_SYSTEM_NAME));
        assert!(!attributes
            .iter()
            .any(|attr| attr.key.as_str() == semconv::attribute::DB_OPERATION_NAME));
    }

    #[test]
    fn recording_policy_skips_empty_strings() {
        assert!(!should_record(&Value::from("")));
        assert!(should_record(&Value::from("GET")));
        assert!(should_record(&Value::I64(0)));
        assert!(should_record(&Value::F64(0.0)));
        assert!(should_record(&Value::Bool(false)));
    }

    #[test]
    fn best_effort_forwards_failures_to_logger() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let config = InstrumentorConfig::with_exception_logger(Arc::new(move |_err| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        best_effort(&config, || Ok(()));
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        best_effort(&config, || Err(ExtractionError::MissingField("total")));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn best_effort_without_logger_is_silent() {
        let config = InstrumentorConfig::new();
        best_effort(&config, || Err(ExtractionError::InvalidUtf8));
    }

    #[test]
    fn error_kind_labels() {
        assert_eq!(
            error_kind_label(redis::ErrorKind::ResponseError),
            "response_error"
        );
        assert_eq!(error_kind_label(redis::ErrorKind::IoError), "io_error");
        assert_eq!(error_kind_label(redis::ErrorKind::Moved), "moved");
    }

    #[test]
    fn recording_an_error_does_not_panic() {
        let descriptor = descriptor_for(CommandKind::Ping).unwrap();
        let span = command_span(descriptor);
        let err = redis::RedisError::from((redis::ErrorKind::ResponseError, "boom"));
        record_error_on_span(&span, &err);
        record_command_result::<()>(&span, &Err(err));
    }

    #[test]
    fn extractors_never_fail_on_valid_input() {
        let descriptor = descriptor_for(CommandKind::Search).unwrap();
        let span = command_span(descriptor);
        assert!(set_search_attributes(&span, &SearchQuery::new("@title:hello")).is_ok());
        assert!(set_generic_attributes(&span).is_ok());
        assert!(record_ping_outcome(&span, true).is_ok());
        assert!(record_ping_outcome(&span, false).is_ok());
    }
}
