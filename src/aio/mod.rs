//! Asynchronous connection instrumentation.
//!
//! The async pipeline mirrors [`crate::sync`] over a multiplexed connection.
//! Spans are attached to the command futures with `Instrument` so the scope
//! survives suspension points.

use crate::commands::{
    create_index_cmd, invalid_reply_error, ping_cmd, pong, search_cmd, FieldSpec, IndexDefinition,
    SearchQuery, SearchReply,
};
use crate::common::{
    apply_span_attributes, best_effort, command_span, generic_command_span, record_command_result,
    record_error_on_span, record_ping_outcome, record_search_reply, set_create_index_attributes,
    set_generic_attributes, set_search_attributes,
};
use crate::instrumentor::{CallContext, InstrumentorConfig};
use crate::registry::{descriptor_for, CommandKind};
use redis::aio::MultiplexedConnection;
use redis::{Cmd, RedisResult, Value};
use std::time::Instant;
use tracing::Instrument;

/// An instrumented wrapper around `redis::aio::MultiplexedConnection`.
#[derive(Clone)]
pub struct InstrumentedMultiplexedConnection {
    inner: MultiplexedConnection,
    config: InstrumentorConfig,
    context: CallContext,
}

impl InstrumentedMultiplexedConnection {
    /// Wraps a connection with default configuration and context.
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self::with_config(connection, InstrumentorConfig::default(), CallContext::default())
    }

    /// Wraps a connection with explicit configuration and call context.
    pub fn with_config(
        connection: MultiplexedConnection,
        config: InstrumentorConfig,
        context: CallContext,
    ) -> Self {
        Self {
            inner: connection,
            config,
            context,
        }
    }

    /// Replaces the call context for subsequent calls.
    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = context;
        self
    }

    /// The call context currently in effect.
    pub fn context(&self) -> CallContext {
        self.context
    }

    /// A reference to the wrapped connection.
    pub fn inner(&self) -> &MultiplexedConnection {
        &self.inner
    }

    /// Removes the tracing layer and returns the original connection.
    pub fn into_inner(self) -> MultiplexedConnection {
        self.inner
    }

    /// `PING` the server, returning whether it answered.
    pub async fn ping(&mut self) -> RedisResult<bool> {
        let cmd = ping_cmd();
        let descriptor =
            descriptor_for(CommandKind::Ping).filter(|_| !self.context.is_suppressed());
        let Some(descriptor) = descriptor else {
            let value: Value = cmd.query_async(&mut self.inner).await?;
            return Ok(pong(&value));
        };

        let span = command_span(descriptor);
        let result: RedisResult<Value> = cmd
            .query_async(&mut self.inner)
            .instrument(span.clone())
            .await;
        record_command_result(&span, &result);
        let value = result?;

        let alive = pong(&value);
        best_effort(&self.config, || record_ping_outcome(&span, alive));
        Ok(alive)
    }

    /// Runs an `FT.SEARCH` query against an index.
    pub async fn search(&mut self, index: &str, query: &SearchQuery) -> RedisResult<SearchReply> {
        let cmd = search_cmd(index, query);
        let descriptor =
            descriptor_for(CommandKind::Search).filter(|_| !self.context.is_suppressed());
        let Some(descriptor) = descriptor else {
            let started = Instant::now();
            let value: Value = cmd.query_async(&mut self.inner).await?;
            let elapsed = started.elapsed().as_secs_f64() * 1000.0;
            return SearchReply::from_value(&value, elapsed).map_err(invalid_reply_error);
        };

        let span = command_span(descriptor);
        best_effort(&self.config, || set_search_attributes(&span, query));

        let started = Instant::now();
        let result: RedisResult<Value> = cmd
            .query_async(&mut self.inner)
            .instrument(span.clone())
            .await;
        let elapsed = started.elapsed().as_secs_f64() * 1000.0;
        record_command_result(&span, &result);
        let value = result?;

        let reply = match SearchReply::from_value(&value, elapsed) {
            Ok(reply) => reply,
            Err(err) => {
                let err = invalid_reply_error(err);
                record_error_on_span(&span, &err);
                return Err(err);
            }
        };
        best_effort(&self.config, || record_search_reply(&span, &reply));
        Ok(reply)
    }

    /// Creates a search index with `FT.CREATE`.
    pub async fn create_index(
        &mut self,
        index: &str,
        fields: &[FieldSpec],
        definition: &IndexDefinition,
    ) -> RedisResult<()> {
        let cmd = create_index_cmd(index, fields, definition);
        let descriptor =
            descriptor_for(CommandKind::CreateIndex).filter(|_| !self.context.is_suppressed());
        let Some(descriptor) = descriptor else {
            return cmd.query_async(&mut self.inner).await;
        };

        let span = command_span(descriptor);
        best_effort(&self.config, || {
            set_create_index_attributes(&span, fields, definition)
        });

        let result: RedisResult<()> = cmd
            .query_async(&mut self.inner)
            .instrument(span.clone())
            .await;
        record_command_result(&span, &result);
        result
    }

    /// Sends an arbitrary command through the generic pipeline.
    pub async fn req_command(&mut self, cmd: &Cmd) -> RedisResult<Value> {
        if self.context.is_suppressed() {
            return cmd.query_async(&mut self.inner).await;
        }

        let (span, attributes) = generic_command_span(cmd);
        apply_span_attributes(&span, &attributes);
        best_effort(&self.config, || set_generic_attributes(&span));

        let result = cmd
            .query_async(&mut self.inner)
            .instrument(span.clone())
            .await;
        record_command_result(&span, &result);
        result
    }

    /// Convenience method: GET a key through the generic pipeline.
    pub async fn get<K: redis::ToRedisArgs, RV: redis::FromRedisValue>(
        &mut self,
        key: K,
    ) -> RedisResult<RV> {
        let mut cmd = Cmd::new();
        cmd.arg("GET").arg(key);
        let result = self.req_command(&cmd).await?;
        redis::FromRedisValue::from_redis_value(&result)
    }

    /// Convenience method: SET a key through the generic pipeline.
    pub async fn set<K: redis::ToRedisArgs, V: redis::ToRedisArgs>(
        &mut self,
        key: K,
        value: V,
    ) -> RedisResult<()> {
        let mut cmd = Cmd::new();
        cmd.arg("SET").arg(key).arg(value);
        let result = self.req_command(&cmd).await?;
        redis::FromRedisValue::from_redis_value(&result)
    }

    /// Convenience method: DEL keys through the generic pipeline.
    pub async fn del<K: redis::ToRedisArgs>(&mut self, keys: K) -> RedisResult<i64> {
        let mut cmd = Cmd::new();
        cmd.arg("DEL").arg(keys);
        let result = self.req_command(&cmd).await?;
        redis::FromRedisValue::from_redis_value(&result)
    }
}
