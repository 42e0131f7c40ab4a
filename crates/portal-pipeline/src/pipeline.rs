//! The orchestrator: inbound -> middleware -> outbound -> HTTP -> response,
//! with dual-axis retry and the middleware chain wrapped around every edge
//!
//! The retry loop generalizes a single alternative-channel list into the
//! capability-discovered `ChannelRetryable`/`Retryable` dual-axis budget:
//! same-channel retries and cross-channel failover are tracked and reset
//! independently.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use http::HeaderName;
use portal_config::PipelineConfig;
use portal_core::model::{Request, Response, ResponseStreamItem};
use portal_core::transport::{EventStream, HttpRequest};
use portal_core::{Executor, RequestContext, headers};
use portal_transform::{ApiFormat, Inbound, Outbound, TransformError};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::executor::{parse_retry_delay, sleep_retry_delay};
use crate::middleware::{MiddlewareChain, PipelineState};

/// What a pipeline run produces: a complete body, or a stream of
/// client-encoded frames
pub enum PipelineOutcome {
    /// Non-streaming: the fully encoded response body
    Complete(Vec<u8>),
    /// Streaming: client-format-encoded frames, in arrival order
    Stream(Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>),
}

/// Drives one request from raw client bytes through to a response,
/// applying the middleware chain and the dual-axis retry loop around every
/// upstream attempt
pub struct Pipeline {
    config: PipelineConfig,
    middlewares: MiddlewareChain,
    executor: Arc<dyn Executor>,
}

impl Pipeline {
    /// Build a pipeline from configuration, a middleware chain, and the
    /// default HTTP executor
    #[must_use]
    pub fn new(config: PipelineConfig, middlewares: MiddlewareChain, executor: Arc<dyn Executor>) -> Self {
        Self {
            config,
            middlewares,
            executor,
        }
    }

    fn append_header_names(&self) -> Vec<HeaderName> {
        self.config
            .headers
            .append
            .iter()
            .filter_map(|name| HeaderName::try_from(name.as_str()).ok())
            .collect()
    }

    /// Run the full pipeline for one inbound request
    ///
    /// # Errors
    /// Returns [`PipelineError`] if a request-phase middleware rejects the
    /// request, every retry/failover strategy is exhausted, or the context
    /// is cancelled before an attempt completes.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        cancellation: &CancellationToken,
        inbound: &Arc<dyn Inbound>,
        outbound: &Arc<dyn Outbound>,
        raw: &[u8],
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut request = inbound.transform_request(raw).map_err(PipelineError::Transform)?;
        let mut state = PipelineState::default();

        self.middlewares.on_inbound_llm_request(ctx, &mut state, &mut request).await?;

        request.raw_request = serde_json::from_slice(raw).ok();
        request.raw_api_format = Some(format!("{:?}", inbound.api_format()));

        let streaming = request.stream;
        let append_names = self.append_header_names();

        let mut same_channel_retries: u32 = 0;
        let mut channel_switches: u32 = 0;
        let mut last_error: Option<PipelineError> = None;

        loop {
            if cancellation.is_cancelled() {
                return Err(last_error.unwrap_or(PipelineError::Cancelled));
            }

            state.channel_id = Some(channel_name(outbound.as_ref(), channel_switches));

            let attempt = self
                .run_attempt(ctx, &mut state, inbound, outbound, &request, &append_names, streaming)
                .await;

            match attempt {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    self.middlewares.on_outbound_raw_error(ctx, &mut state, &err).await;

                    if cancellation.is_cancelled() {
                        return Err(err);
                    }

                    let Some(probe) = retry_probe(&err) else {
                        return Err(err);
                    };

                    let retry = self.config.retry.clone();
                    let can_same_channel_retry = outbound
                        .as_channel_retryable()
                        .filter(|_| same_channel_retries < retry.max_same_channel_retries)
                        .filter(|r| r.can_retry(&probe))
                        .is_some_and(|r| r.prepare_for_retry(ctx).is_ok());

                    if can_same_channel_retry {
                        same_channel_retries += 1;
                        state.attempt_index += 1;
                        last_error = Some(err);
                        self.sleep_between_retries().await;
                        continue;
                    }

                    let can_failover = outbound
                        .as_retryable()
                        .filter(|_| channel_switches < retry.max_channel_retries)
                        .filter(|r| r.has_more_channels())
                        .is_some_and(|r| r.next_channel(ctx).is_ok());

                    if can_failover {
                        channel_switches += 1;
                        same_channel_retries = 0;
                        state.attempt_index += 1;
                        last_error = Some(err);
                        self.sleep_between_retries().await;
                        continue;
                    }

                    return Err(err);
                }
            }
        }
    }

    async fn sleep_between_retries(&self) {
        if let Ok(Some(delay)) = parse_retry_delay(&self.config.retry.delay) {
            sleep_retry_delay(Some(delay)).await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_attempt(
        &self,
        ctx: &RequestContext,
        state: &mut PipelineState,
        inbound: &Arc<dyn Inbound>,
        outbound: &Arc<dyn Outbound>,
        request: &Request,
        append_names: &[HeaderName],
        streaming: bool,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut http_request = outbound.transform_request(ctx, request).await?;
        http_request.headers = headers::merge_headers(&http_request.headers, ctx.headers(), append_names);

        self.middlewares.on_outbound_raw_request(ctx, state, &mut http_request).await?;

        let exec = outbound
            .as_customized_executor()
            .map_or_else(|| self.executor.clone(), |c| c.customize_executor(self.executor.clone()));

        if streaming {
            self.run_streaming_attempt(ctx, state, inbound, outbound, exec, http_request).await
        } else {
            self.run_complete_attempt(ctx, state, inbound, outbound, exec, http_request).await
        }
    }

    async fn run_complete_attempt(
        &self,
        ctx: &RequestContext,
        state: &mut PipelineState,
        inbound: &Arc<dyn Inbound>,
        outbound: &Arc<dyn Outbound>,
        exec: Arc<dyn Executor>,
        http_request: HttpRequest,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut http_response = exec.do_request(ctx, http_request).await.map_err(|e| PipelineError::Transform(e.into()))?;
        self.middlewares
            .on_outbound_raw_response(ctx, state, &mut http_response)
            .await
            .map_err(PipelineError::ResponsePhaseRejected)?;

        let mut response = outbound.transform_response(ctx, http_response).await?;
        self.middlewares
            .on_outbound_llm_response(ctx, state, &mut response)
            .await
            .map_err(PipelineError::ResponsePhaseRejected)?;

        let mut encoded = inbound.transform_response(ctx, &response).map_err(PipelineError::Transform)?;
        self.middlewares
            .on_inbound_raw_response(ctx, state, &mut encoded)
            .await
            .map_err(PipelineError::ResponsePhaseRejected)?;

        Ok(PipelineOutcome::Complete(encoded))
    }

    async fn run_streaming_attempt(
        &self,
        ctx: &RequestContext,
        state: &mut PipelineState,
        inbound: &Arc<dyn Inbound>,
        outbound: &Arc<dyn Outbound>,
        exec: Arc<dyn Executor>,
        http_request: HttpRequest,
    ) -> Result<PipelineOutcome, PipelineError> {
        let raw_events: EventStream = exec.do_stream(ctx, http_request).await.map_err(|e| PipelineError::Transform(e.into()))?;
        let raw_events = self
            .middlewares
            .on_outbound_raw_stream(ctx, state, raw_events)
            .await
            .map_err(PipelineError::ResponsePhaseRejected)?;

        let chunks = outbound.transform_stream(ctx, raw_events).await?;
        let chunks = self
            .middlewares
            .on_outbound_llm_stream(ctx, state, chunks)
            .await
            .map_err(PipelineError::ResponsePhaseRejected)?;

        let inbound = inbound.clone();
        let ctx = ctx.clone();
        let encoded = chunks.map(move |item| match item {
            Ok(item) => inbound.transform_stream(&ctx, &item),
            Err(err) => inbound.transform_stream(&ctx, &ResponseStreamItem::Chunk(error_chunk(&err))),
        });

        Ok(PipelineOutcome::Stream(Box::pin(encoded)))
    }
}

/// Whether `err` is eligible to spend the retry/failover budget on, and the
/// `TransformError` probe to hand the outbound's `ChannelRetryable::can_retry`
///
/// A `Transform` error is eligible per its own [`TransformError::is_retryable`]
/// classification. A `ResponsePhaseRejected` middleware error is folded into
/// a synthetic `Upstream` probe instead — per §4.7 a response-phase rejection
/// is "handled as a pipeline error, subject to retry policy", unlike
/// `RequestRejected`, which never reaches this point because no upstream
/// attempt has happened yet for a retry to act on. Every other variant is a
/// kernel/cancellation/persistence error and is never retried.
fn retry_probe(err: &PipelineError) -> Option<TransformError> {
    match err {
        PipelineError::Transform(transform_err) if transform_err.is_retryable() => Some(TransformError::Upstream(transform_err.to_string())),
        PipelineError::ResponsePhaseRejected(middleware_err) => Some(TransformError::Upstream(middleware_err.to_string())),
        _ => None,
    }
}

fn error_chunk(err: &TransformError) -> Response {
    let mut response = Response::text("error", "unknown", 0, String::new());
    response.choices.clear();
    response.error = Some(portal_core::model::UnifiedError {
        message: err.to_string(),
        error_type: "upstream_error".to_owned(),
        code: None,
        request_id: None,
    });
    response
}

fn channel_name(outbound: &dyn Outbound, attempt: u32) -> String {
    match outbound.api_format() {
        ApiFormat::OpenAi => "openai",
        ApiFormat::Anthropic => "anthropic",
        ApiFormat::Google => "google",
        ApiFormat::OpenRouter => "openrouter",
        ApiFormat::DeepSeek => "deepseek",
        ApiFormat::Longcat => "longcat",
        ApiFormat::Bailian => "bailian",
        ApiFormat::Doubao => "doubao",
    }
    .to_owned()
        + "#"
        + &attempt.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_header_names_skips_unparseable_entries() {
        let config = PipelineConfig {
            headers: portal_config::PipelineHeadersConfig {
                append: vec!["User-Agent".to_owned(), "not a header".to_owned()],
            },
            ..Default::default()
        };
        let pipeline = Pipeline::new(config, MiddlewareChain::default(), Arc::new(NoopExecutor));
        let names = pipeline.append_header_names();
        assert_eq!(names, vec![http::header::USER_AGENT]);
    }

    struct NoopExecutor;

    #[async_trait::async_trait]
    impl Executor for NoopExecutor {
        async fn do_request(&self, _ctx: &RequestContext, _request: HttpRequest) -> Result<portal_core::transport::HttpResponse, portal_core::KernelError> {
            Err(portal_core::KernelError::Transport("noop".to_owned()))
        }

        async fn do_stream(&self, _ctx: &RequestContext, _request: HttpRequest) -> Result<EventStream, portal_core::KernelError> {
            Err(portal_core::KernelError::Transport("noop".to_owned()))
        }
    }

    mod execute_retry_budget {
        //! End-to-end `Pipeline::execute` runs against an in-memory executor,
        //! covering the dual-axis retry loop's same-channel-retry,
        //! cross-channel-failover, and budget-exhaustion paths.

        use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

        use portal_core::model::Response;
        use portal_core::transport::HttpResponse;
        use portal_core::KernelError;
        use portal_transform::capability::{ChannelRetryable, Retryable};
        use portal_transform::{Inbound, ResponseStreamChunks};

        use super::*;

        fn ctx() -> RequestContext {
            RequestContext::empty()
        }

        struct EchoInbound;

        #[async_trait::async_trait]
        impl Inbound for EchoInbound {
            fn api_format(&self) -> ApiFormat {
                ApiFormat::OpenAi
            }

            fn transform_request(&self, _raw: &[u8]) -> Result<Request, TransformError> {
                Ok(Request::chat("gpt-4o", vec![]))
            }

            fn transform_response(&self, _ctx: &RequestContext, _response: &Response) -> Result<Vec<u8>, TransformError> {
                Ok(b"ok".to_vec())
            }

            fn transform_stream(&self, _ctx: &RequestContext, _item: &portal_core::model::ResponseStreamItem) -> Vec<u8> {
                Vec::new()
            }
        }

        /// An executor whose `do_request` responses are scripted up front;
        /// each call consumes the next scripted result and counts itself.
        struct ScriptedExecutor {
            calls: AtomicU32,
            responses: std::sync::Mutex<std::collections::VecDeque<Result<HttpResponse, KernelError>>>,
        }

        impl ScriptedExecutor {
            fn new(responses: Vec<Result<HttpResponse, KernelError>>) -> Self {
                Self {
                    calls: AtomicU32::new(0),
                    responses: std::sync::Mutex::new(responses.into()),
                }
            }

            fn call_count(&self) -> u32 {
                self.calls.load(Ordering::SeqCst)
            }
        }

        #[async_trait::async_trait]
        impl Executor for ScriptedExecutor {
            async fn do_request(&self, _ctx: &RequestContext, _request: HttpRequest) -> Result<HttpResponse, KernelError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.responses.lock().unwrap().pop_front().expect("scenario under-scripted: executor called more times than expected")
            }

            async fn do_stream(&self, _ctx: &RequestContext, _request: HttpRequest) -> Result<EventStream, KernelError> {
                unreachable!("these scenarios only exercise the non-streaming path")
            }
        }

        fn ok_response() -> Result<HttpResponse, KernelError> {
            Ok(HttpResponse {
                status: http::StatusCode::OK,
                headers: http::HeaderMap::new(),
                body: b"{}".to_vec(),
            })
        }

        fn unauthorized_response() -> Result<HttpResponse, KernelError> {
            Ok(HttpResponse {
                status: http::StatusCode::UNAUTHORIZED,
                headers: http::HeaderMap::new(),
                body: b"{}".to_vec(),
            })
        }

        /// Decodes a 200 into a canned response and anything else into a
        /// retryable `Upstream` error, the same non-2xx-is-upstream-error
        /// convention a real provider outbound follows.
        struct StatusSensitiveOutbound {
            channel_retryable: bool,
            retryable: bool,
            has_more_channels: AtomicBool,
            next_channel_calls: AtomicU32,
            prepare_for_retry_calls: AtomicU32,
        }

        impl StatusSensitiveOutbound {
            fn new(channel_retryable: bool, retryable: bool, has_more_channels: bool) -> Self {
                Self {
                    channel_retryable,
                    retryable,
                    has_more_channels: AtomicBool::new(has_more_channels),
                    next_channel_calls: AtomicU32::new(0),
                    prepare_for_retry_calls: AtomicU32::new(0),
                }
            }
        }

        #[async_trait::async_trait]
        impl Outbound for StatusSensitiveOutbound {
            fn api_format(&self) -> ApiFormat {
                ApiFormat::OpenAi
            }

            async fn transform_request(&self, _ctx: &RequestContext, _request: &Request) -> Result<HttpRequest, TransformError> {
                Ok(HttpRequest::post_json("https://example.test", http::HeaderMap::new(), vec![]))
            }

            async fn transform_response(&self, _ctx: &RequestContext, response: HttpResponse) -> Result<Response, TransformError> {
                if response.status.is_success() {
                    Ok(Response::text("r1", "gpt-4o", 0, "hi".to_owned()))
                } else {
                    Err(TransformError::Upstream(format!("status {}", response.status)))
                }
            }

            async fn transform_stream(&self, _ctx: &RequestContext, _events: portal_core::transport::EventStream) -> Result<ResponseStreamChunks, TransformError> {
                unreachable!("these scenarios only exercise the non-streaming path")
            }

            fn transform_error(&self, status: http::StatusCode, _body: &[u8]) -> TransformError {
                TransformError::Upstream(format!("status {status}"))
            }

            fn aggregate_stream_chunks(&self, _chunks: &[portal_core::model::ResponseStreamItem]) -> (Vec<u8>, portal_transform::ResponseMeta) {
                (Vec::new(), portal_transform::ResponseMeta::default())
            }

            fn as_channel_retryable(&self) -> Option<&dyn ChannelRetryable> {
                self.channel_retryable.then_some(self as &dyn ChannelRetryable)
            }

            fn as_retryable(&self) -> Option<&dyn Retryable> {
                self.retryable.then_some(self as &dyn Retryable)
            }
        }

        impl ChannelRetryable for StatusSensitiveOutbound {
            fn can_retry(&self, _err: &TransformError) -> bool {
                true
            }

            fn prepare_for_retry(&self, _ctx: &RequestContext) -> Result<(), TransformError> {
                self.prepare_for_retry_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        impl Retryable for StatusSensitiveOutbound {
            fn has_more_channels(&self) -> bool {
                self.has_more_channels.load(Ordering::SeqCst)
            }

            fn next_channel(&self, _ctx: &RequestContext) -> Result<(), TransformError> {
                self.next_channel_calls.fetch_add(1, Ordering::SeqCst);
                self.has_more_channels.store(false, Ordering::SeqCst);
                Ok(())
            }
        }

        fn config(max_same_channel_retries: u32, max_channel_retries: u32) -> PipelineConfig {
            PipelineConfig {
                retry: portal_config::RetryConfig {
                    max_channel_retries,
                    max_same_channel_retries,
                    delay: None,
                },
                ..Default::default()
            }
        }

        /// E1: a transport failure on the same channel is retried and the
        /// second attempt succeeds.
        #[tokio::test]
        async fn same_channel_retry_succeeds_on_second_attempt() {
            let executor = Arc::new(ScriptedExecutor::new(vec![Err(KernelError::Transport("connection reset".to_owned())), ok_response()]));
            let outbound: Arc<dyn Outbound> = Arc::new(StatusSensitiveOutbound::new(true, false, false));
            let inbound: Arc<dyn Inbound> = Arc::new(EchoInbound);
            let pipeline = Pipeline::new(config(2, 0), MiddlewareChain::default(), executor.clone());

            let outcome = pipeline.execute(&ctx(), &CancellationToken::new(), &inbound, &outbound, b"{}").await.unwrap();

            assert!(matches!(outcome, PipelineOutcome::Complete(_)));
            assert_eq!(executor.call_count(), 2);
        }

        /// E2: an auth failure on the current channel is not retried
        /// same-channel (no `ChannelRetryable` capability) but fails over to
        /// the next channel, which succeeds.
        #[tokio::test]
        async fn failover_on_auth_failure_succeeds_on_next_channel() {
            let executor = Arc::new(ScriptedExecutor::new(vec![unauthorized_response(), ok_response()]));
            let outbound: Arc<dyn Outbound> = Arc::new(StatusSensitiveOutbound::new(false, true, true));
            let inbound: Arc<dyn Inbound> = Arc::new(EchoInbound);
            let pipeline = Pipeline::new(config(0, 1), MiddlewareChain::default(), executor.clone());

            let outcome = pipeline.execute(&ctx(), &CancellationToken::new(), &inbound, &outbound, b"{}").await.unwrap();

            assert!(matches!(outcome, PipelineOutcome::Complete(_)));
            assert_eq!(executor.call_count(), 2);
        }

        /// E3: same-channel retry and failover budgets are both 1 and every
        /// attempt fails; the loop spends exactly same(1) + switch + same(1)
        /// = 4 executor calls before returning the last error.
        #[tokio::test]
        async fn mixed_exhaustion_stops_after_exactly_four_attempts() {
            let executor = Arc::new(ScriptedExecutor::new(vec![
                unauthorized_response(),
                unauthorized_response(),
                unauthorized_response(),
                unauthorized_response(),
            ]));
            let outbound: Arc<dyn Outbound> = Arc::new(StatusSensitiveOutbound::new(true, true, true));
            let inbound: Arc<dyn Inbound> = Arc::new(EchoInbound);
            let pipeline = Pipeline::new(config(1, 1), MiddlewareChain::default(), executor.clone());

            let result = pipeline.execute(&ctx(), &CancellationToken::new(), &inbound, &outbound, b"{}").await;

            assert!(result.is_err());
            assert_eq!(executor.call_count(), 4);
        }
    }
}
