//! The instrumented wrapper around a Redis client.

use crate::instrumentor::{CallContext, InstrumentorConfig};
use redis::{Client, RedisError};
use tracing::instrument;

/// A `redis::Client` wrapped with the tracing layer.
///
/// The wrapper carries the instrumentor configuration and a default
/// [`CallContext`] and hands both down to every connection it opens, so all
/// calls made through those connections go through the interception pipeline.
/// The inner client is held untouched; [`into_inner`](Self::into_inner)
/// returns it exactly as it was wrapped.
///
/// # Example
///
/// ```rust,ignore
/// use otel_instrumentation_redisearch::{InstrumentedClient, SearchQuery};
///
/// let client = redis::Client::open("redis://127.0.0.1/")?;
/// let instrumented = InstrumentedClient::new(client);
///
/// let mut conn = instrumented.get_connection()?;
/// conn.ping()?;
/// let reply = conn.search("idx:books", &SearchQuery::new("@title:hello"))?;
/// # Ok::<(), redis::RedisError>(())
/// ```
#[derive(Debug, Clone)]
pub struct InstrumentedClient {
    inner: Client,
    config: InstrumentorConfig,
    context: CallContext,
}

impl InstrumentedClient {
    /// Wraps a client with default configuration.
    #[instrument(skip(client))]
    pub fn new(client: Client) -> Self {
        Self::with_config(client, InstrumentorConfig::default())
    }

    /// Wraps a client with the given configuration.
    ///
    /// This is what [`RedisInstrumentor::instrument`] calls; use it directly
    /// when you build the configuration yourself.
    ///
    /// [`RedisInstrumentor::instrument`]: crate::instrumentor::RedisInstrumentor::instrument
    pub fn with_config(client: Client, config: InstrumentorConfig) -> Self {
        Self {
            inner: client,
            config,
            context: CallContext::default(),
        }
    }

    /// Replaces the default call context handed to new connections.
    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = context;
        self
    }

    /// A reference to the wrapped client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Removes the tracing layer and returns the original client.
    pub fn into_inner(self) -> Client {
        self.inner
    }

    /// Opens a synchronous instrumented connection.
    ///
    /// The connection inherits this wrapper's configuration and call context.
    ///
    /// # Errors
    ///
    /// Returns a `RedisError` when the underlying `get_connection` fails.
    #[cfg(feature = "sync")]
    #[instrument(skip(self))]
    pub fn get_connection(&self) -> Result<crate::sync::InstrumentedConnection, RedisError> {
        let conn = self.inner.get_connection()?;
        Ok(crate::sync::InstrumentedConnection::with_config(
            conn,
            self.config.clone(),
            self.context,
        ))
    }

    /// Opens a multiplexed asynchronous instrumented connection.
    #[cfg(feature = "aio")]
    #[instrument(skip(self))]
    pub async fn get_multiplexed_async_connection(
        &self,
    ) -> Result<crate::aio::InstrumentedMultiplexedConnection, RedisError> {
        let conn = self.inner.get_multiplexed_async_connection().await?;
        Ok(crate::aio::InstrumentedMultiplexedConnection::with_config(
            conn,
            self.config.clone(),
            self.context,
        ))
    }
}
