//! OpenTelemetry instrumentation for redis-rs search workloads
//!
//! This crate attaches distributed-tracing spans to calls made through the
//! redis-rs client without requiring the application to modify its own call
//! sites. The instrumented methods `ping`, `search` (`FT.SEARCH`) and
//! `create_index` (`FT.CREATE`) each carry method-specific span attributes;
//! every other command goes through a generic traced passthrough.
//!
//! The instrumentation captures:
//! - Database system information (`db.system.name = "redis"`) and the
//!   operation name for every traced call
//! - The query string of a search, and the total/duration/documents shape of
//!   its result
//! - The stringified schema arguments of an index creation
//! - A `redis.ping` event when the server answers a ping
//! - Error information when operations fail
//!
//! Instead of patching the client type, the layer is an explicit wrapper
//! composed at the call site: [`RedisInstrumentor::instrument`] wraps a
//! `redis::Client`, and `into_inner()` hands the untouched original back.
//! Service names should be configured at the application level through the
//! OpenTelemetry SDK configuration, not within this library.
//!
//! # Features
//!
//! - `sync` (default): synchronous connection instrumentation
//! - `aio`: asynchronous (multiplexed) connection instrumentation
//!
//! # Examples
//!
//! ## Synchronous usage
//!
//! ```rust,ignore
//! use otel_instrumentation_redisearch::{
//!     FieldSpec, IndexDefinition, RedisInstrumentor, SearchQuery,
//! };
//!
//! let instrumentor = RedisInstrumentor::new();
//! let client = redis::Client::open("redis://127.0.0.1/")?;
//! let instrumented = instrumentor.instrument(client);
//!
//! let mut conn = instrumented.get_connection()?;
//! conn.ping()?;
//!
//! conn.create_index(
//!     "idx:books",
//!     &[FieldSpec::Text("title".into())],
//!     &IndexDefinition::new().prefix("book:"),
//! )?;
//! let reply = conn.search("idx:books", &SearchQuery::new("@title:hello"))?;
//! println!("{} hits in {:.1}ms", reply.total, reply.duration);
//! # Ok::<(), redis::RedisError>(())
//! ```
//!
//! ## Asynchronous usage
//!
//! ```rust,ignore
//! use otel_instrumentation_redisearch::{RedisInstrumentor, SearchQuery};
//!
//! let client = redis::Client::open("redis://127.0.0.1/")?;
//! let instrumented = RedisInstrumentor::new().instrument(client);
//!
//! let mut conn = instrumented.get_multiplexed_async_connection().await?;
//! conn.ping().await?;
//! let reply = conn.search("idx:books", &SearchQuery::new("@title:hello")).await?;
//! # Ok::<(), redis::RedisError>(())
//! ```
//!
//! ## Suppressing instrumentation
//!
//! When instrumented code internally drives the client, hand the connection a
//! suppressed context so nested calls stay out of the trace:
//!
//! ```rust
//! use otel_instrumentation_redisearch::CallContext;
//!
//! let ctx = CallContext::suppressed();
//! assert!(ctx.is_suppressed());
//! ```
//!
//! # Span attributes
//!
//! The following attributes are set on spans, when applicable:
//!
//! - `db.system.name`: always `"redis"`
//! - `db.operation.name`: the operation name (`ping`, `search`, `GET`, ...)
//! - `redis.generic`: `1` for calls without method-specific attributes
//! - `redis.commands.search.query`: the search query string
//! - `redis.commands.search.total`: total matching documents
//! - `redis.commands.search.duration`: call latency in milliseconds
//! - `redis.commands.search.docs`: the stringified result documents
//! - `redis.create_index.fields` / `redis.create_index.definition`: the
//!   stringified schema arguments
//! - `error`, `error.message`, `error.type`, `otel.status_code`,
//!   `otel.status_description`: outcome recording
//!
//! # Error handling
//!
//! Errors from the underlying call always propagate unchanged after the span
//! is marked failed. Failures inside attribute extraction never do: they are
//! stopped at a best-effort boundary and at most forwarded to the exception
//! logger configured on [`RedisInstrumentor::with_exception_logger`].

pub mod client;
pub mod commands;
pub mod common;
pub mod instrumentor;
pub mod registry;

#[cfg(feature = "sync")]
pub mod sync;

#[cfg(feature = "aio")]
pub mod aio;

pub use client::InstrumentedClient;
pub use commands::{
    ExtractionError, FieldSpec, IndexDefinition, IndexTarget, SearchDoc, SearchQuery, SearchReply,
};
pub use instrumentor::{CallContext, ExceptionLogger, InstrumentorConfig, RedisInstrumentor};
pub use registry::{CommandKind, MethodDescriptor, WRAPPED_METHODS};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::InstrumentedClient;
    pub use crate::commands::{FieldSpec, IndexDefinition, SearchQuery, SearchReply};
    pub use crate::instrumentor::{CallContext, RedisInstrumentor};

    #[cfg(feature = "sync")]
    pub use crate::sync::*;

    #[cfg(feature = "aio")]
    pub use crate::aio::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrumented_client_creation() {
        let client = redis::Client::open("redis://127.0.0.1/").unwrap();
        let _instrumented = InstrumentedClient::new(client);
    }

    #[test]
    fn instrumentor_passes_its_config_to_clients() {
        let instrumentor = RedisInstrumentor::new();
        let client = redis::Client::open("redis://127.0.0.1/").unwrap();
        let instrumented = instrumentor
            .instrument(client)
            .with_context(CallContext::suppressed());
        let _restored = instrumented.into_inner();
    }

    #[cfg(feature = "sync")]
    #[test]
    fn sync_connection_wrapper() {
        // Connecting requires a running server; the method surface is what is
        // under test here.
        let client = redis::Client::open("redis://127.0.0.1/").unwrap();
        let instrumented = InstrumentedClient::new(client);

        let result = instrumented.get_connection();
        assert!(result.is_err());
    }

    #[cfg(feature = "aio")]
    #[tokio::test]
    async fn async_connection_wrapper() {
        let client = redis::Client::open("redis://127.0.0.1/").unwrap();
        let instrumented = InstrumentedClient::new(client);

        let result = instrumented.get_multiplexed_async_connection().await;
        assert!(result.is_err());
    }
}
