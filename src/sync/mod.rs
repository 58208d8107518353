//! Synchronous connection instrumentation.
//!
//! [`InstrumentedConnection`] wraps a `redis::Connection` and runs every call
//! through the interception pipeline: check the call context for suppression,
//! open the span, set request attributes, invoke the underlying command
//! exactly once, record the outcome, set response attributes, and hand the
//! result back unchanged.

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
use redis::{Cmd, Connection, ConnectionLike, RedisResult, Value};
use std::time::Instant;

/// A synchronous Redis connection with the tracing layer attached.
///
/// The registered methods (`ping`, `search`, `create_index`) carry
/// method-specific span attributes; everything else goes through
/// [`req_command`](Self::req_command) and only gets the generic baseline.
/// A suppressed [`CallContext`] turns every method into a plain passthrough
/// with no span at all.
pub struct InstrumentedConnection {
    inner: Connection,
    config: InstrumentorConfig,
    context: CallContext,
}

impl InstrumentedConnection {
    /// Wraps a connection with default configuration and context.
    pub fn new(connection: Connection) -> Self {
        Self::with_config(connection, InstrumentorConfig::default(), CallContext::default())
    }

    /// Wraps a connection with explicit configuration and call context.
    pub fn with_config(
        connection: Connection,
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
    ///
    /// Pass [`CallContext::suppressed`] when this connection is driven from
    /// code that is already traced, to keep nested calls out of the trace.
    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = context;
        self
    }

    /// The call context currently in effect.
    pub fn context(&self) -> CallContext {
        self.context
    }

    /// A reference to the wrapped connection.
    pub fn inner(&self) -> &Connection {
        &self.inner
    }

    /// Mutable access to the wrapped connection.
    pub fn inner_mut(&mut self) -> &mut Connection {
        &mut self.inner
    }

    /// Removes the tracing layer and returns the original connection.
    pub fn into_inner(self) -> Connection {
        self.inner
    }

    /// `PING` the server, returning whether it answered.
    ///
    /// Post-call, a truthy reply adds a `redis.ping` event to the span; the
    /// generic marker attribute is set either way.
    pub fn ping(&mut self) -> RedisResult<bool> {
        let cmd = ping_cmd();
        let descriptor =
            descriptor_for(CommandKind::Ping).filter(|_| !self.context.is_suppressed());
        let Some(descriptor) = descriptor else {
            let value: Value = cmd.query(&mut self.inner)?;
            return Ok(pong(&value));
        };

        let span = command_span(descriptor);
        let _enter = span.enter();

        let result: RedisResult<Value> = cmd.query(&mut self.inner);
        record_command_result(&span, &result);
        let value = result?;

        let alive = pong(&value);
        best_effort(&self.config, || record_ping_outcome(&span, alive));
        Ok(alive)
    }

    /// Runs an `FT.SEARCH` query against an index.
    ///
    /// The query string is recorded before the call
    /// (`redis.commands.search.query`); total, duration and the stringified
    /// documents are recorded after a successful one.
    ///
    /// # Errors
    ///
    /// Propagates the underlying `RedisError`, or a type error when the reply
    /// does not have the documented search shape.
    pub fn search(&mut self, index: &str, query: &SearchQuery) -> RedisResult<SearchReply> {
        let cmd = search_cmd(index, query);
        let descriptor =
            descriptor_for(CommandKind::Search).filter(|_| !self.context.is_suppressed());
        let Some(descriptor) = descriptor else {
            let started = Instant::now();
            let value: Value = cmd.query(&mut self.inner)?;
            let elapsed = started.elapsed().as_secs_f64() * 1000.0;
            return SearchReply::from_value(&value, elapsed).map_err(invalid_reply_error);
        };

        let span = command_span(descriptor);
        let _enter = span.enter();
        best_effort(&self.config, || set_search_attributes(&span, query));

        let started = Instant::now();
        let result: RedisResult<Value> = cmd.query(&mut self.inner);
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
    ///
    /// The stringified schema arguments are recorded before the call under
    /// `redis.create_index.fields` and `redis.create_index.definition`.
    pub fn create_index(
        &mut self,
        index: &str,
        fields: &[FieldSpec],
        definition: &IndexDefinition,
    ) -> RedisResult<()> {
        let cmd = create_index_cmd(index, fields, definition);
        let descriptor =
            descriptor_for(CommandKind::CreateIndex).filter(|_| !self.context.is_suppressed());
        let Some(descriptor) = descriptor else {
            return cmd.query(&mut self.inner);
        };

        let span = command_span(descriptor);
        let _enter = span.enter();
        best_effort(&self.config, || {
            set_create_index_attributes(&span, fields, definition)
        });

        let result: RedisResult<()> = cmd.query(&mut self.inner);
        record_command_result(&span, &result);
        result
    }

    /// Sends an arbitrary command through the generic pipeline.
    ///
    /// The span carries the system/operation baseline extracted from
    /// the command plus the generic marker attribute; the reply is returned
    /// unchanged.
    pub fn req_command(&mut self, cmd: &Cmd) -> RedisResult<Value> {
        if self.context.is_suppressed() {
            return self.inner.req_command(cmd);
        }

        let (span, attributes) = generic_command_span(cmd);
        let _enter = span.enter();
        apply_span_attributes(&span, &attributes);
        best_effort(&self.config, || set_generic_attributes(&span));

        let result = self.inner.req_command(cmd);
        record_command_result(&span, &result);
        result
    }

    /// Convenience method: GET a key through the generic pipeline.
    pub fn get<K: redis::ToRedisArgs, RV: redis::FromRedisValue>(
        &mut self,
        key: K,
    ) -> RedisResult<RV> {
        let mut cmd = Cmd::new();
        cmd.arg("GET").arg(key);
        let result = self.req_command(&cmd)?;
        redis::FromRedisValue::from_redis_value(&result)
    }

    /// Convenience method: SET a key through the generic pipeline.
    pub fn set<K: redis::ToRedisArgs, V: redis::ToRedisArgs>(
        &mut self,
        key: K,
        value: V,
    ) -> RedisResult<()> {
        let mut cmd = Cmd::new();
        cmd.arg("SET").arg(key).arg(value);
        let result = self.req_command(&cmd)?;
        redis::FromRedisValue::from_redis_value(&result)
    }

    /// Convenience method: DEL keys through the generic pipeline.
    pub fn del<K: redis::ToRedisArgs>(&mut self, keys: K) -> RedisResult<i64> {
        let mut cmd = Cmd::new();
        cmd.arg("DEL").arg(keys);
        let result = self.req_command(&cmd)?;
        redis::FromRedisValue::from_redis_value(&result)
    }
}
