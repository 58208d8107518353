//! Instrumentation lifecycle and configuration.
//!
//! [`RedisInstrumentor`] is the entry point an application composes at startup:
//! it owns the [`InstrumentorConfig`] and wraps plain `redis::Client` values
//! into their instrumented counterparts. Unwrapping via
//! [`InstrumentedClient::into_inner`](crate::client::InstrumentedClient::into_inner)
//! hands the untouched original back, so attaching and detaching the tracing
//! layer never mutates shared state.

use crate::client::InstrumentedClient;
use crate::commands::ExtractionError;
use std::fmt;
use std::sync::Arc;

/// Callback invoked when an attribute extractor fails internally.
///
/// Extraction failures never reach the application call path; this hook is the
/// only place they surface.
pub type ExceptionLogger = Arc<dyn Fn(&ExtractionError) + Send + Sync>;

/// Configuration shared by every instrumented connection.
///
/// Constructor-injected and cloned into each wrapper rather than living in a
/// process-wide slot. The only knob is the optional exception logger consumed
/// by the telemetry error boundary.
#[derive(Clone, Default)]
pub struct InstrumentorConfig {
    exception_logger: Option<ExceptionLogger>,
}

impl InstrumentorConfig {
    /// Configuration with no exception logger: extraction failures are
    /// silently discarded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration forwarding extraction failures to `logger`.
    pub fn with_exception_logger(logger: ExceptionLogger) -> Self {
        Self {
            exception_logger: Some(logger),
        }
    }

    /// Forwards an extraction failure to the configured logger, if any.
    pub(crate) fn notify_extraction_error(&self, err: &ExtractionError) {
        if let Some(logger) = &self.exception_logger {
            logger(err);
        }
    }
}

impl fmt::Debug for InstrumentorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentorConfig")
            .field("exception_logger", &self.exception_logger.is_some())
            .finish()
    }
}

/// Per-call context carried by every instrumented connection.
///
/// The suppress-instrumentation marker tells the interception pipeline to skip
/// tracing entirely and call straight through, used to avoid nested spans when
/// instrumented code internally drives the client. It is explicit injected
/// state: construct a suppressed context and hand it to the connection, there
/// is no ambient flag to flip.
///
/// # Examples
///
/// ```rust
/// use otel_instrumentation_redisearch::CallContext;
///
/// let ctx = CallContext::new();
/// assert!(!ctx.is_suppressed());
/// assert!(CallContext::suppressed().is_suppressed());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallContext {
    suppress_instrumentation: bool,
}

impl CallContext {
    /// Context with instrumentation enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that turns every intercepted call into a plain passthrough.
    pub fn suppressed() -> Self {
        Self {
            suppress_instrumentation: true,
        }
    }

    /// Whether tracing is suppressed for calls under this context.
    pub fn is_suppressed(&self) -> bool {
        self.suppress_instrumentation
    }
}

/// Installs and removes the tracing layer around Redis clients.
///
/// The wrap/unwrap pair replaces the activate/deactivate lifecycle of
/// method-table patching instrumentors: wrapping composes the proxy, and
/// unwrapping returns the exact client that went in.
///
/// # Examples
///
/// ```rust,ignore
/// use otel_instrumentation_redisearch::RedisInstrumentor;
///
/// let instrumentor = RedisInstrumentor::new();
/// let client = redis::Client::open("redis://127.0.0.1/")?;
/// let instrumented = instrumentor.instrument(client);
///
/// let mut conn = instrumented.get_connection()?;
/// conn.ping()?;
///
/// // Detach the layer again; `client` is the original, untouched value.
/// let client = instrumented.into_inner();
/// # Ok::<(), redis::RedisError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct RedisInstrumentor {
    config: InstrumentorConfig,
}

impl RedisInstrumentor {
    /// Instrumentor with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Instrumentor forwarding extraction failures to `logger`.
    pub fn with_exception_logger(logger: ExceptionLogger) -> Self {
        Self {
            config: InstrumentorConfig::with_exception_logger(logger),
        }
    }

    /// The configuration handed to every wrapped client.
    pub fn config(&self) -> &InstrumentorConfig {
        &self.config
    }

    /// Wraps a client with the tracing layer.
    pub fn instrument(&self, client: redis::Client) -> InstrumentedClient {
        InstrumentedClient::with_config(client, self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn default_context_is_not_suppressed() {
        assert!(!CallContext::new().is_suppressed());
        assert!(!CallContext::default().is_suppressed());
    }

    #[test]
    fn suppressed_context_reports_suppression() {
        assert!(CallContext::suppressed().is_suppressed());
    }

    #[test]
    fn config_without_logger_discards_errors() {
        let config = InstrumentorConfig::new();
        // Must not panic with no logger installed.
        config.notify_extraction_error(&ExtractionError::MissingField("total"));
    }

    #[test]
    fn config_forwards_errors_to_logger() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let config = InstrumentorConfig::with_exception_logger(Arc::new(move |_err| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        config.notify_extraction_error(&ExtractionError::InvalidUtf8);
        config.notify_extraction_error(&ExtractionError::MissingField("total"));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn instrumentor_wrap_unwrap_roundtrip() {
        let client = redis::Client::open("redis://127.0.0.1/").unwrap();
        let addr = client.get_connection_info().addr.clone();

        let instrumented = RedisInstrumentor::new().instrument(client);
        let restored = instrumented.into_inner();
        assert_eq!(restored.get_connection_info().addr, addr);
    }
}
