//! Typed request and response adapters for the intercepted methods.
//!
//! The attribute extractors in [`crate::common`] never poke at raw argument
//! lists or reply arrays directly. Each intercepted method instead has an
//! explicit adapter type here with a documented shape: [`SearchQuery`] for the
//! query argument of `FT.SEARCH`, [`FieldSpec`]/[`IndexDefinition`] for the
//! arguments of `FT.CREATE`, and [`SearchReply`] for the parsed search
//! response. The adapters also know how to render themselves into the
//! `redis::Cmd` sent over the wire.

use redis::{Cmd, Value};
use std::fmt;

/// Error raised while adapting a reply into its typed shape.
///
/// These errors belong to the telemetry domain: when one surfaces inside an
/// attribute extractor it is stopped at the [`crate::common::best_effort`]
/// boundary and at most forwarded to the configured exception logger. It only
/// becomes caller-visible when the application itself asked for the typed
/// reply.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The reply element had a different shape than the protocol documents.
    #[error("unexpected reply shape: expected {expected}")]
    UnexpectedShape { expected: &'static str },
    /// A documented reply field was absent.
    #[error("reply field `{0}` is missing")]
    MissingField(&'static str),
    /// A reply string was not valid UTF-8.
    #[error("reply data is not valid UTF-8")]
    InvalidUtf8,
}

/// A full-text query, the first argument to `search`.
///
/// Exposes the query string the pre-call extractor records as
/// `redis.commands.search.query`.
///
/// # Examples
///
/// ```rust
/// use otel_instrumentation_redisearch::SearchQuery;
///
/// let query = SearchQuery::new("@title:hello");
/// assert_eq!(query.query_string(), "@title:hello");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    raw: String,
}

impl SearchQuery {
    /// Builds a query from its raw RediSearch query string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The raw query string as sent to the server.
    pub fn query_string(&self) -> &str {
        &self.raw
    }
}

/// One field of an index schema, the `fields` argument to `create_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSpec {
    /// A full-text `TEXT` field.
    Text(String),
    /// A `NUMERIC` field.
    Numeric(String),
    /// A `TAG` field.
    Tag(String),
}

impl FieldSpec {
    fn name(&self) -> &str {
        match self {
            FieldSpec::Text(name) | FieldSpec::Numeric(name) | FieldSpec::Tag(name) => name,
        }
    }

    fn type_token(&self) -> &'static str {
        match self {
            FieldSpec::Text(_) => "TEXT",
            FieldSpec::Numeric(_) => "NUMERIC",
            FieldSpec::Tag(_) => "TAG",
        }
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.type_token())
    }
}

/// Which data structure an index is built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexTarget {
    /// Index hash keys (the server default).
    #[default]
    Hash,
    /// Index JSON documents.
    Json,
}

impl IndexTarget {
    fn token(self) -> &'static str {
        match self {
            IndexTarget::Hash => "HASH",
            IndexTarget::Json => "JSON",
        }
    }
}

/// The `definition` argument to `create_index`: what the index covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexDefinition {
    target: IndexTarget,
    prefixes: Vec<String>,
}

impl IndexDefinition {
    /// Definition over hash keys with no prefix restriction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indexed data structure.
    pub fn on(mut self, target: IndexTarget) -> Self {
        self.target = target;
        self
    }

    /// Restricts the index to keys carrying the given prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    /// Key prefixes covered by this definition.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

impl fmt::Display for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ON {}", self.target.token())?;
        if !self.prefixes.is_empty() {
            write!(f, " PREFIX {}", self.prefixes.join(" "))?;
        }
        Ok(())
    }
}

/// Renders a field list the way it is recorded as a span attribute.
pub(crate) fn render_fields(fields: &[FieldSpec]) -> String {
    let rendered: Vec<String> = fields.iter().map(|field| field.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}

/// A single document returned by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDoc {
    /// The document key.
    pub id: String,
    /// Returned field/value pairs, empty for NOCONTENT queries.
    pub fields: Vec<(String, String)>,
}

/// Parsed `FT.SEARCH` reply, the response shape consumed by the post-call
/// extractor.
///
/// The wire reply is a flat array: the total hit count followed by each
/// document key and, unless the query suppressed content, its field/value
/// array. `duration` does not travel on the wire; it is the call latency in
/// milliseconds measured around the request, which is how the client libraries
/// this instrumentation models populate their own result objects.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchReply {
    /// Total number of matching documents.
    pub total: i64,
    /// Call latency in milliseconds.
    pub duration: f64,
    /// Returned documents.
    pub docs: Vec<SearchDoc>,
}

impl SearchReply {
    /// Parses a raw search reply.
    ///
    /// `duration` is the measured call latency in milliseconds. Fails with
    /// [`ExtractionError`] when the reply does not have the documented shape;
    /// the caller decides whether that aborts the call (typed API) or only the
    /// telemetry (extractor path).
    pub fn from_value(value: &Value, duration: f64) -> Result<Self, ExtractionError> {
        let Value::Array(items) = value else {
            return Err(ExtractionError::UnexpectedShape {
                expected: "array reply",
            });
        };
        let mut items = items.iter();

        let total = match items.next() {
            Some(Value::Int(total)) => *total,
            Some(_) => {
                return Err(ExtractionError::UnexpectedShape {
                    expected: "integer total as first element",
                })
            }
            None => return Err(ExtractionError::MissingField("total")),
        };

        let mut docs = Vec::new();
        let mut pending = items.peekable();
        while let Some(item) = pending.next() {
            let id = reply_string(item)?;
            let fields = match pending.peek() {
                Some(Value::Array(pairs)) => {
                    let pairs = field_pairs(pairs)?;
                    pending.next();
                    pairs
                }
                // NOCONTENT replies carry bare ids
                _ => Vec::new(),
            };
            docs.push(SearchDoc { id, fields });
        }

        Ok(SearchReply {
            total,
            duration,
            docs,
        })
    }
}

fn field_pairs(pairs: &[Value]) -> Result<Vec<(String, String)>, ExtractionError> {
    let mut fields = Vec::with_capacity(pairs.len() / 2);
    let mut pairs = pairs.iter();
    while let Some(name) = pairs.next() {
        let value = pairs
            .next()
            .ok_or(ExtractionError::MissingField("field value"))?;
        fields.push((reply_string(name)?, reply_string(value)?));
    }
    Ok(fields)
}

fn reply_string(value: &Value) -> Result<String, ExtractionError> {
    match value {
        Value::BulkString(bytes) => std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ExtractionError::InvalidUtf8),
        Value::SimpleString(text) => Ok(text.clone()),
        _ => Err(ExtractionError::UnexpectedShape {
            expected: "string reply element",
        }),
    }
}

/// Converts a reply-shape failure into the error the typed call surface
/// returns.
///
/// Only used when the application asked for the typed reply itself; extractor
/// failures never take this path.
pub(crate) fn invalid_reply_error(err: ExtractionError) -> redis::RedisError {
    redis::RedisError::from((
        redis::ErrorKind::TypeError,
        "invalid search reply",
        err.to_string(),
    ))
}

/// Whether a raw `PING` reply means the server answered.
///
/// The server replies `PONG` as a simple string, or echoes a payload as a
/// bulk string. Anything else counts as a dead reply.
pub(crate) fn pong(value: &Value) -> bool {
    match value {
        Value::SimpleString(text) => text == "PONG",
        Value::BulkString(bytes) => bytes == b"PONG",
        Value::Okay => true,
        _ => false,
    }
}

/// Builds the `PING` command.
pub(crate) fn ping_cmd() -> Cmd {
    let mut cmd = Cmd::new();
    cmd.arg("PING");
    cmd
}

/// Builds the `FT.SEARCH` command for a query against an index.
pub(crate) fn search_cmd(index: &str, query: &SearchQuery) -> Cmd {
    let mut cmd = Cmd::new();
    cmd.arg("FT.SEARCH").arg(index).arg(query.query_string());
    cmd
}

/// Builds the `FT.CREATE` command from the typed schema arguments.
pub(crate) fn create_index_cmd(
    index: &str,
    fields: &[FieldSpec],
    definition: &IndexDefinition,
) -> Cmd {
    let mut cmd = Cmd::new();
    cmd.arg("FT.CREATE").arg(index).arg("ON").arg(definition.target.token());
    if !definition.prefixes.is_empty() {
        cmd.arg("PREFIX").arg(definition.prefixes.len());
        for prefix in &definition.prefixes {
            cmd.arg(prefix.as_str());
        }
    }
    cmd.arg("SCHEMA");
    for field in fields {
        cmd.arg(field.name()).arg(field.type_token());
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd_args(cmd: &Cmd) -> Vec<String> {
        cmd.args_iter()
            .map(|arg| match arg {
                redis::Arg::Simple(bytes) => String::from_utf8(bytes.to_vec()).unwrap(),
                redis::Arg::Cursor => "<cursor>".to_string(),
            })
            .collect()
    }

    #[test]
    fn query_string_accessor() {
        let query = SearchQuery::new("@title:hello");
        assert_eq!(query.query_string(), "@title:hello");
    }

    #[test]
    fn search_cmd_renders_index_and_query() {
        let cmd = search_cmd("idx:books", &SearchQuery::new("@title:hello"));
        assert_eq!(cmd_args(&cmd), ["FT.SEARCH", "idx:books", "@title:hello"]);
    }

    #[test]
    fn create_index_cmd_renders_schema() {
        let fields = vec![
            FieldSpec::Text("title".into()),
            FieldSpec::Numeric("price".into()),
        ];
        let definition = IndexDefinition::new().prefix("doc:");
        let cmd = create_index_cmd("idx:books", &fields, &definition);
        assert_eq!(
            cmd_args(&cmd),
            [
                "FT.CREATE", "idx:books", "ON", "HASH", "PREFIX", "1", "doc:", "SCHEMA", "title",
                "TEXT", "price", "NUMERIC",
            ]
        );
    }

    #[test]
    fn create_index_cmd_without_prefixes_skips_prefix_clause() {
        let fields = vec![FieldSpec::Tag("genre".into())];
        let cmd = create_index_cmd("idx:tags", &fields, &IndexDefinition::new());
        assert_eq!(
            cmd_args(&cmd),
            ["FT.CREATE", "idx:tags", "ON", "HASH", "SCHEMA", "genre", "TAG"]
        );
    }

    #[test]
    fn definition_display_includes_prefixes() {
        let definition = IndexDefinition::new()
            .on(IndexTarget::Json)
            .prefix("doc:")
            .prefix("book:");
        assert_eq!(definition.to_string(), "ON JSON PREFIX doc: book:");
    }

    #[test]
    fn field_display_pairs_name_and_type() {
        assert_eq!(FieldSpec::Text("title".into()).to_string(), "title TEXT");
        assert_eq!(render_fields(&[
            FieldSpec::Text("title".into()),
            FieldSpec::Tag("genre".into()),
        ]), "[title TEXT, genre TAG]");
    }

    #[test]
    fn parses_search_reply_with_content() {
        let value = Value::Array(vec![
            Value::Int(3),
            Value::BulkString(b"doc:1".to_vec()),
            Value::Array(vec![
                Value::BulkString(b"title".to_vec()),
                Value::BulkString(b"hello".to_vec()),
            ]),
        ]);
        let reply = SearchReply::from_value(&value, 12.0).unwrap();
        assert_eq!(reply.total, 3);
        assert_eq!(reply.duration, 12.0);
        assert_eq!(reply.docs.len(), 1);
        assert_eq!(reply.docs[0].id, "doc:1");
        assert_eq!(reply.docs[0].fields, [("title".to_string(), "hello".to_string())]);
    }

    #[test]
    fn parses_nocontent_reply() {
        let value = Value::Array(vec![
            Value::Int(2),
            Value::BulkString(b"doc:1".to_vec()),
            Value::BulkString(b"doc:2".to_vec()),
        ]);
        let reply = SearchReply::from_value(&value, 0.5).unwrap();
        assert_eq!(reply.total, 2);
        let ids: Vec<_> = reply.docs.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, ["doc:1", "doc:2"]);
        assert!(reply.docs.iter().all(|doc| doc.fields.is_empty()));
    }

    #[test]
    fn rejects_non_array_reply() {
        let err = SearchReply::from_value(&Value::Int(1), 0.0).unwrap_err();
        assert!(matches!(err, ExtractionError::UnexpectedShape { .. }));
    }

    #[test]
    fn rejects_reply_missing_total() {
        let err = SearchReply::from_value(&Value::Array(vec![]), 0.0).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingField("total")));
    }

    #[test]
    fn pong_recognizes_live_replies() {
        assert!(pong(&Value::SimpleString("PONG".to_string())));
        assert!(pong(&Value::BulkString(b"PONG".to_vec())));
        assert!(pong(&Value::Okay));
        assert!(!pong(&Value::Nil));
        assert!(!pong(&Value::SimpleString("NOPE".to_string())));
    }

    #[test]
    fn rejects_unpaired_document_fields() {
        let value = Value::Array(vec![
            Value::Int(1),
            Value::BulkString(b"doc:1".to_vec()),
            Value::Array(vec![Value::BulkString(b"title".to_vec())]),
        ]);
        let err = SearchReply::from_value(&value, 0.0).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingField("field value")));
    }
}
