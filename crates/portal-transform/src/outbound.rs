//! The Outbound half of the transformer registry: unified model <-> provider

use async_trait::async_trait;
use portal_core::model::{Request, Response, ResponseStreamItem};
use portal_core::transport::{EventStream, HttpRequest, HttpResponse};
use portal_core::RequestContext;

use crate::capability::{ChannelRetryable, CustomizedExecutor, Retryable};
use crate::error::TransformError;

/// The wire format a transformer speaks, used as the registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiFormat {
    /// `OpenAI` chat completions
    OpenAi,
    /// Anthropic Messages API
    Anthropic,
    /// Google Generative Language `generateContent`
    Google,
    /// `OpenRouter`, an `OpenAI`-compatible aggregator with `reasoning_details`
    OpenRouter,
    /// `DeepSeek`, `OpenAI`-compatible with a json_schema quirk
    DeepSeek,
    /// Longcat, `OpenAI`-compatible with a null-content quirk
    Longcat,
    /// Alibaba Bailian, `OpenAI`-compatible with message-merging quirks
    Bailian,
    /// `ByteDance` Doubao, `OpenAI`-compatible with request-id hoisting
    Doubao,
}

/// Converts the unified request/response model to and from a specific
/// upstream provider's wire format, and drives that provider's HTTP calls
///
/// `transform_request` builds an [`HttpRequest`] rather than sending it: the
/// pipeline's [`portal_core::Executor`] is the only thing that performs I/O,
/// which keeps retries and header discipline centralized.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// The wire format this outbound speaks
    fn api_format(&self) -> ApiFormat;

    /// Build the outgoing HTTP request for `request`
    ///
    /// Validates `model` is non-empty and, for chat requests, that
    /// `messages` is non-empty; applies provider-specific content
    /// normalization; attaches auth headers; computes the target URL.
    async fn transform_request(&self, ctx: &RequestContext, request: &Request) -> Result<HttpRequest, TransformError>;

    /// Decode a completed HTTP response into the unified model
    ///
    /// Non-2xx responses are reported as [`TransformError::Upstream`] with
    /// the provider's error detail folded into the unified error.
    async fn transform_response(&self, ctx: &RequestContext, response: HttpResponse) -> Result<Response, TransformError>;

    /// Decode a raw event stream into a stream of unified response chunks
    async fn transform_stream(&self, ctx: &RequestContext, events: EventStream) -> Result<ResponseStreamChunks, TransformError>;

    /// Lift a transport-level HTTP error into a unified error response
    fn transform_error(&self, status: http::StatusCode, body: &[u8]) -> TransformError;

    /// Replay a stored stream into a single non-streaming body, for the
    /// persistence layer's audit materialization
    fn aggregate_stream_chunks(&self, chunks: &[ResponseStreamItem]) -> (Vec<u8>, ResponseMeta);

    /// This outbound's same-channel retry capability, if implemented
    fn as_channel_retryable(&self) -> Option<&dyn ChannelRetryable> {
        None
    }

    /// This outbound's cross-channel failover capability, if implemented
    fn as_retryable(&self) -> Option<&dyn Retryable> {
        None
    }

    /// This outbound's custom executor wrapper, if implemented
    fn as_customized_executor(&self) -> Option<&dyn CustomizedExecutor> {
        None
    }
}

/// A boxed, pinned stream of decoded unified response items
pub type ResponseStreamChunks = std::pin::Pin<Box<dyn futures_util::Stream<Item = Result<ResponseStreamItem, TransformError>> + Send>>;

/// Metadata produced alongside an aggregated stream replay
#[derive(Debug, Clone, Default)]
pub struct ResponseMeta {
    /// Final model identifier reported by the provider
    pub model: Option<String>,
    /// Aggregated token usage, if any chunk reported it
    pub usage: Option<portal_core::model::Usage>,
    /// Why generation stopped
    pub finish_reason: Option<portal_core::model::FinishReason>,
}
