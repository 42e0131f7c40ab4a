//! The middleware chain: named hook objects the pipeline drives around
//! every transformer call
//!
//! Request-oriented hooks run in declared (FIFO) order; response/stream/
//! error hooks run in reverse (LIFO) order, so the first middleware to see
//! an outbound request is the last to see its response — the same
//! symmetric-wrapping shape `tower`/axum middleware stacks use, generalized
//! here to a plain `Vec` since the pipeline (not an HTTP framework) owns
//! the call sequence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use portal_core::model::{Request, Response};
use portal_core::transport::{EventStream, HttpRequest, HttpResponse};
use portal_core::RequestContext;
use portal_transform::ResponseStreamChunks;

use crate::error::{MiddlewareError, PipelineError};

/// Per-iteration state threaded through every middleware hook
///
/// Carries the bookkeeping middlewares need (which channel this attempt
/// targets, the persisted row ids) without requiring every hook signature
/// to grow a new parameter each time one middleware needs one more fact.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// Id of the persisted `Request` row, once `request_log` has created one
    pub persist_request_id: Option<String>,
    /// Id of the persisted `Execution` row for the current attempt
    pub execution_id: Option<String>,
    /// Channel the current attempt targets, if the outbound reports one
    pub channel_id: Option<String>,
    /// 0-based attempt counter, incremented once per retry-loop iteration
    pub attempt_index: u32,
    /// Channels that have already failed this request, oldest first
    pub failed_channels: Vec<String>,
}

/// A named hook object the pipeline drives around every transformer call
///
/// All hooks default to pass-through. Implement only the ones a concrete
/// middleware needs to act on.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Stable name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Runs once, after `Inbound::transform_request`, in declared order
    async fn on_inbound_llm_request(&self, _ctx: &RequestContext, _state: &mut PipelineState, _request: &mut Request) -> Result<(), MiddlewareError> {
        Ok(())
    }

    /// Runs once per retry-loop iteration, after `Outbound::transform_request`
    async fn on_outbound_raw_request(
        &self,
        _ctx: &RequestContext,
        _state: &mut PipelineState,
        _request: &mut HttpRequest,
    ) -> Result<(), MiddlewareError> {
        Ok(())
    }

    /// Runs in reverse order, after a non-streaming HTTP response arrives
    async fn on_outbound_raw_response(
        &self,
        _ctx: &RequestContext,
        _state: &mut PipelineState,
        _response: &mut HttpResponse,
    ) -> Result<(), MiddlewareError> {
        Ok(())
    }

    /// Runs in reverse order, after `Outbound::transform_response`
    async fn on_outbound_llm_response(
        &self,
        _ctx: &RequestContext,
        _state: &mut PipelineState,
        _response: &mut Response,
    ) -> Result<(), MiddlewareError> {
        Ok(())
    }

    /// Runs in declared order, after `Inbound::transform_response`, over the
    /// client-encoded bytes about to be returned
    async fn on_inbound_raw_response(
        &self,
        _ctx: &RequestContext,
        _state: &mut PipelineState,
        _encoded: &mut Vec<u8>,
    ) -> Result<(), MiddlewareError> {
        Ok(())
    }

    /// Runs in reverse order, wrapping the raw event stream before
    /// `Outbound::transform_stream` decodes it
    async fn on_outbound_raw_stream(&self, _ctx: &RequestContext, _state: &mut PipelineState, events: EventStream) -> Result<EventStream, MiddlewareError> {
        Ok(events)
    }

    /// Runs in reverse order, wrapping the decoded unified stream before
    /// `Inbound::transform_stream` re-encodes it
    async fn on_outbound_llm_stream(
        &self,
        _ctx: &RequestContext,
        _state: &mut PipelineState,
        chunks: ResponseStreamChunks,
    ) -> Result<ResponseStreamChunks, MiddlewareError> {
        Ok(chunks)
    }

    /// Runs in reverse order whenever a pipeline iteration fails, before the
    /// retry/failover decision is made. Observational only — cannot itself
    /// change the retry outcome.
    async fn on_outbound_raw_error(&self, _ctx: &RequestContext, _state: &mut PipelineState, _error: &PipelineError) {}
}

/// An ordered, immutable-after-construction list of middlewares
///
/// Safe for concurrent reads across requests: the middleware list never
/// changes once a pipeline is constructed.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Build a chain from an ordered list of middlewares
    #[must_use]
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    /// Request-oriented hooks run FIFO
    pub async fn on_inbound_llm_request(&self, ctx: &RequestContext, state: &mut PipelineState, request: &mut Request) -> Result<(), MiddlewareError> {
        for mw in &self.middlewares {
            mw.on_inbound_llm_request(ctx, state, request).await?;
        }
        Ok(())
    }

    /// Request-oriented hooks run FIFO
    pub async fn on_outbound_raw_request(&self, ctx: &RequestContext, state: &mut PipelineState, request: &mut HttpRequest) -> Result<(), MiddlewareError> {
        for mw in &self.middlewares {
            mw.on_outbound_raw_request(ctx, state, request).await?;
        }
        Ok(())
    }

    /// Response-oriented hooks run LIFO
    pub async fn on_outbound_raw_response(&self, ctx: &RequestContext, state: &mut PipelineState, response: &mut HttpResponse) -> Result<(), MiddlewareError> {
        for mw in self.middlewares.iter().rev() {
            mw.on_outbound_raw_response(ctx, state, response).await?;
        }
        Ok(())
    }

    /// Response-oriented hooks run LIFO
    pub async fn on_outbound_llm_response(&self, ctx: &RequestContext, state: &mut PipelineState, response: &mut Response) -> Result<(), MiddlewareError> {
        for mw in self.middlewares.iter().rev() {
            mw.on_outbound_llm_response(ctx, state, response).await?;
        }
        Ok(())
    }

    /// Request-oriented hooks run FIFO
    pub async fn on_inbound_raw_response(&self, ctx: &RequestContext, state: &mut PipelineState, encoded: &mut Vec<u8>) -> Result<(), MiddlewareError> {
        for mw in &self.middlewares {
            mw.on_inbound_raw_response(ctx, state, encoded).await?;
        }
        Ok(())
    }

    /// Response-oriented hooks run LIFO
    pub async fn on_outbound_raw_stream(&self, ctx: &RequestContext, state: &mut PipelineState, mut events: EventStream) -> Result<EventStream, MiddlewareError> {
        for mw in self.middlewares.iter().rev() {
            events = mw.on_outbound_raw_stream(ctx, state, events).await?;
        }
        Ok(events)
    }

    /// Response-oriented hooks run LIFO
    pub async fn on_outbound_llm_stream(
        &self,
        ctx: &RequestContext,
        state: &mut PipelineState,
        mut chunks: ResponseStreamChunks,
    ) -> Result<ResponseStreamChunks, MiddlewareError> {
        for mw in self.middlewares.iter().rev() {
            chunks = mw.on_outbound_llm_stream(ctx, state, chunks).await?;
        }
        Ok(chunks)
    }

    /// Error hooks run LIFO, matching the response-phase convention
    pub async fn on_outbound_raw_error(&self, ctx: &RequestContext, state: &mut PipelineState, error: &PipelineError) {
        for mw in self.middlewares.iter().rev() {
            mw.on_outbound_raw_error(ctx, state, error).await;
        }
    }
}

/// Sets `max_tokens` to a default when missing, and clamps it down to the
/// default when the caller asked for more
pub struct MaxTokensMiddleware {
    default_max_tokens: u32,
}

impl MaxTokensMiddleware {
    /// Build with the default/ceiling token budget
    #[must_use]
    pub const fn new(default_max_tokens: u32) -> Self {
        Self { default_max_tokens }
    }
}

#[async_trait]
impl Middleware for MaxTokensMiddleware {
    fn name(&self) -> &'static str {
        "max_tokens"
    }

    async fn on_inbound_llm_request(&self, _ctx: &RequestContext, _state: &mut PipelineState, request: &mut Request) -> Result<(), MiddlewareError> {
        match request.params.max_tokens {
            None => request.params.max_tokens = Some(self.default_max_tokens),
            Some(requested) if requested > self.default_max_tokens => request.params.max_tokens = Some(self.default_max_tokens),
            Some(_) => {}
        }
        Ok(())
    }
}

/// Reads usage from the final response (or the aggregated stream) and
/// emits a counter event
///
/// Grounded on `portal-telemetry`'s metric-name constants; uses the
/// process-wide OpenTelemetry meter rather than threading a `Meter`
/// through every call site, the same global-provider pattern
/// `portal-telemetry::init` installs.
pub struct UsageMiddleware;

#[async_trait]
impl Middleware for UsageMiddleware {
    fn name(&self) -> &'static str {
        "usage"
    }

    async fn on_outbound_llm_response(&self, _ctx: &RequestContext, _state: &mut PipelineState, response: &mut Response) -> Result<(), MiddlewareError> {
        if let Some(usage) = &response.usage {
            record_usage(&response.model, usage);
        }
        Ok(())
    }
}

fn record_usage(model: &str, usage: &portal_core::model::Usage) {
    let meter = opentelemetry::global::meter("portal-pipeline");
    let counter = meter.u64_counter(portal_telemetry::metrics::LLM_TOKEN_USAGE).build();
    counter.add(
        u64::from(usage.prompt_tokens),
        &[opentelemetry::KeyValue::new("model", model.to_owned()), opentelemetry::KeyValue::new("kind", "prompt")],
    );
    counter.add(
        u64::from(usage.completion_tokens),
        &[opentelemetry::KeyValue::new("model", model.to_owned()), opentelemetry::KeyValue::new("kind", "completion")],
    );
}

/// Persists the `Request`/`Execution`/`StreamChunk` audit rows
///
/// `attempt_index` is tracked per request via [`PipelineState`], which the
/// pipeline carries (and resets to 0) for a fresh request and increments on
/// every retry-loop iteration, giving `portal_persist`'s idempotency key
/// `(request_id, attempt_index)` a stable value across same-channel retries
/// and cross-channel failovers alike.
pub struct RequestLogMiddleware {
    bridge: Arc<portal_persist::PersistenceBridge>,
    /// Stream-chunk arrival counters, keyed by `(request_id, execution_id)`
    chunk_counters: Arc<Mutex<HashMap<(String, String), u32>>>,
}

impl RequestLogMiddleware {
    /// Build a middleware backed by the given persistence bridge
    #[must_use]
    pub fn new(bridge: Arc<portal_persist::PersistenceBridge>) -> Self {
        Self {
            bridge,
            chunk_counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl Middleware for RequestLogMiddleware {
    fn name(&self) -> &'static str {
        "request_log"
    }

    async fn on_inbound_llm_request(&self, _ctx: &RequestContext, state: &mut PipelineState, request: &mut Request) -> Result<(), MiddlewareError> {
        let request_type = match request.kind {
            portal_core::model::RequestKind::Chat => "chat",
            portal_core::model::RequestKind::Image => "image",
            portal_core::model::RequestKind::Embedding => "embedding",
            portal_core::model::RequestKind::Rerank => "rerank",
        };
        let api_format = request.raw_api_format.clone().unwrap_or_else(|| "unknown".to_owned());
        let body = request.raw_request.clone().unwrap_or(serde_json::Value::Null).to_string();

        let record = self
            .bridge
            .record_request(portal_persist::NewRequest {
                project_id: None,
                principal: "client".to_owned(),
                model: request.model.clone(),
                request_type: request_type.to_owned(),
                api_format,
                stored_body_key: body,
            })
            .await
            .map_err(|err| MiddlewareError::new(self.name(), err.to_string()))?;

        state.persist_request_id = Some(record.id);
        Ok(())
    }

    async fn on_outbound_raw_request(&self, _ctx: &RequestContext, state: &mut PipelineState, _request: &mut HttpRequest) -> Result<(), MiddlewareError> {
        let Some(request_id) = state.persist_request_id.clone() else {
            return Ok(());
        };
        let channel_id = state.channel_id.clone().unwrap_or_else(|| "default".to_owned());

        let execution = self
            .bridge
            .record_execution_created(portal_persist::NewExecution {
                request_id,
                attempt_index: state.attempt_index,
                channel_id,
            })
            .await
            .map_err(|err| MiddlewareError::new(self.name(), err.to_string()))?;

        state.execution_id = Some(execution.id);
        Ok(())
    }

    async fn on_outbound_llm_response(&self, _ctx: &RequestContext, state: &mut PipelineState, response: &mut Response) -> Result<(), MiddlewareError> {
        let Some(execution_id) = state.execution_id.clone() else {
            return Ok(());
        };
        let metrics = portal_persist::ExecutionMetrics {
            latency_ms: None,
            first_token_latency_ms: None,
            bytes_in: 0,
            bytes_out: 0,
        };
        self.bridge
            .mark_completed(&execution_id, metrics)
            .await
            .map_err(|err| MiddlewareError::new(self.name(), err.to_string()))?;
        let _ = response;
        Ok(())
    }

    async fn on_outbound_raw_error(&self, _ctx: &RequestContext, state: &mut PipelineState, error: &PipelineError) {
        let Some(execution_id) = state.execution_id.clone() else {
            return;
        };
        let metrics = portal_persist::ExecutionMetrics::default();
        if let Err(err) = self.bridge.mark_failed(&execution_id, error.error_type().to_owned(), metrics).await {
            tracing::warn!(execution_id, error = %err, "failed to record execution failure");
        }
    }
}

impl RequestLogMiddleware {
    /// Append one decoded stream chunk under the current execution
    ///
    /// Exposed separately from the `Middleware` hooks because stream-chunk
    /// persistence happens per-item as the stream is drained, not at a
    /// single fixed point in the retry loop.
    ///
    /// # Errors
    /// Propagates the persistence bridge's error.
    pub async fn record_stream_chunk(&self, request_id: &str, execution_id: &str, bytes: Vec<u8>) -> Result<(), portal_persist::PersistError> {
        let index = {
            let mut counters = self.chunk_counters.lock().expect("chunk counter mutex is never poisoned");
            let key = (request_id.to_owned(), execution_id.to_owned());
            let next = counters.entry(key).or_insert(0);
            let index = *next;
            *next += 1;
            index
        };
        self.bridge
            .record_stream_chunk(portal_persist::NewStreamChunk {
                request_id: request_id.to_owned(),
                execution_id: execution_id.to_owned(),
                index,
                bytes,
            })
            .await?;
        Ok(())
    }
}

/// Reacts to `OnOutboundRawError` by recording which channel failed and
/// annotating the bookkeeping the next `Execution` row reads from
pub struct ChannelSwitchMiddleware;

#[async_trait]
impl Middleware for ChannelSwitchMiddleware {
    fn name(&self) -> &'static str {
        "channel_switch"
    }

    async fn on_outbound_raw_error(&self, _ctx: &RequestContext, state: &mut PipelineState, error: &PipelineError) {
        if let Some(channel_id) = state.channel_id.clone() {
            tracing::warn!(channel_id, error = %error, "channel attempt failed");
            state.failed_channels.push(channel_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use portal_core::model::CompletionParams;

    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::empty()
    }

    #[tokio::test]
    async fn max_tokens_fills_in_default_when_missing() {
        let chain = MiddlewareChain::new(vec![Arc::new(MaxTokensMiddleware::new(4096))]);
        let mut request = Request::chat("gpt-4o", vec![]);
        let mut state = PipelineState::default();
        chain.on_inbound_llm_request(&ctx(), &mut state, &mut request).await.unwrap();
        assert_eq!(request.params.max_tokens, Some(4096));
    }

    #[tokio::test]
    async fn max_tokens_clamps_down_but_never_up() {
        let chain = MiddlewareChain::new(vec![Arc::new(MaxTokensMiddleware::new(4096))]);
        let mut request = Request::chat("gpt-4o", vec![]);
        request.params = CompletionParams {
            max_tokens: Some(100_000),
            ..Default::default()
        };
        let mut state = PipelineState::default();
        chain.on_inbound_llm_request(&ctx(), &mut state, &mut request).await.unwrap();
        assert_eq!(request.params.max_tokens, Some(4096));

        let mut request = Request::chat("gpt-4o", vec![]);
        request.params = CompletionParams {
            max_tokens: Some(100),
            ..Default::default()
        };
        let mut state = PipelineState::default();
        chain.on_inbound_llm_request(&ctx(), &mut state, &mut request).await.unwrap();
        assert_eq!(request.params.max_tokens, Some(100));
    }

    #[tokio::test]
    async fn request_log_creates_a_request_row_and_stashes_its_id() {
        let sink = Arc::new(portal_persist::InMemorySink::new());
        let bridge = Arc::new(portal_persist::PersistenceBridge::new(sink));
        let mw = RequestLogMiddleware::new(bridge);

        let mut request = Request::chat("gpt-4o", vec![]);
        let mut state = PipelineState::default();
        mw.on_inbound_llm_request(&ctx(), &mut state, &mut request).await.unwrap();
        assert!(state.persist_request_id.is_some());
    }

    #[tokio::test]
    async fn request_log_creates_one_execution_per_attempt() {
        let sink = Arc::new(portal_persist::InMemorySink::new());
        let bridge = Arc::new(portal_persist::PersistenceBridge::new(sink));
        let mw = RequestLogMiddleware::new(bridge.clone());

        let mut request = Request::chat("gpt-4o", vec![]);
        let mut state = PipelineState::default();
        mw.on_inbound_llm_request(&ctx(), &mut state, &mut request).await.unwrap();

        let mut http_request = HttpRequest::post_json("https://example.test", http::HeaderMap::new(), vec![]);
        state.channel_id = Some("chan_a".to_owned());
        mw.on_outbound_raw_request(&ctx(), &mut state, &mut http_request).await.unwrap();
        let first_execution = state.execution_id.clone().unwrap();

        state.attempt_index = 1;
        state.execution_id = None;
        mw.on_outbound_raw_request(&ctx(), &mut state, &mut http_request).await.unwrap();
        let second_execution = state.execution_id.clone().unwrap();

        assert_ne!(first_execution, second_execution);

        let request_id = state.persist_request_id.clone().unwrap();
        let executions = bridge
            .list_executions(&request_id, portal_persist::PageBounds { first: Some(10), last: None })
            .await
            .unwrap();
        assert_eq!(executions.len(), 2);
    }

    #[tokio::test]
    async fn channel_switch_records_failed_channels_in_order() {
        let mw = ChannelSwitchMiddleware;
        let mut state = PipelineState {
            channel_id: Some("chan_a".to_owned()),
            ..Default::default()
        };
        let error = PipelineError::Cancelled;
        mw.on_outbound_raw_error(&ctx(), &mut state, &error).await;
        assert_eq!(state.failed_channels, vec!["chan_a".to_owned()]);
    }

    #[tokio::test]
    async fn chain_runs_response_hooks_in_reverse_of_request_hooks() {
        struct Recorder(&'static str, Arc<Mutex<Vec<&'static str>>>);

        #[async_trait]
        impl Middleware for Recorder {
            fn name(&self) -> &'static str {
                self.0
            }

            async fn on_inbound_llm_request(&self, _ctx: &RequestContext, _state: &mut PipelineState, _request: &mut Request) -> Result<(), MiddlewareError> {
                self.1.lock().unwrap().push(self.0);
                Ok(())
            }

            async fn on_outbound_llm_response(&self, _ctx: &RequestContext, _state: &mut PipelineState, _response: &mut Response) -> Result<(), MiddlewareError> {
                self.1.lock().unwrap().push(self.0);
                Ok(())
            }
        }

        let order = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new(vec![
            Arc::new(Recorder("a", order.clone())),
            Arc::new(Recorder("b", order.clone())),
        ]);

        let mut request = Request::chat("gpt-4o", vec![]);
        let mut state = PipelineState::default();
        chain.on_inbound_llm_request(&ctx(), &mut state, &mut request).await.unwrap();

        let mut response = Response::text("r1", "gpt-4o", 0, "hi".to_owned());
        chain.on_outbound_llm_response(&ctx(), &mut state, &mut response).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "b", "a"]);
    }
}
