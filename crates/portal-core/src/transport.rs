//! Shared HTTP transport primitives
//!
//! `Outbound::transform_request` builds an [`HttpRequest`] rather than
//! sending it directly; the concrete [`Executor`] implementation (reqwest-
//! backed, living in `portal-pipeline`) is the only thing that actually
//! performs I/O. Keeping these types here lets `portal-transform` describe
//! what to send without depending on the crate that knows how to send it.

use std::collections::HashMap;
use std::pin::Pin;

use futures_util::Stream;
use http::{HeaderMap, Method, StatusCode};

use crate::model::StreamEvent;

/// A request built by an Outbound transformer, ready for the executor
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Fully-qualified target URL
    pub url: String,
    /// Outgoing headers, after header discipline has been applied
    pub headers: HeaderMap,
    /// Serialized request body
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Build a `POST` request with a JSON body
    #[must_use]
    pub fn post_json(url: impl Into<String>, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers,
            body,
        }
    }
}

/// A completed, fully-buffered HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Response status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body bytes
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether this status is retryable: 5xx or 429
    #[must_use]
    pub fn is_retryable_status(&self) -> bool {
        self.status.is_server_error() || self.status == StatusCode::TOO_MANY_REQUESTS
    }
}

/// A boxed, pinned stream of decoded [`StreamEvent`]s
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, crate::error::KernelError>> + Send>>;

/// A boxed, pinned stream of raw response body chunks, as delivered by the
/// transport layer before any content-type-specific framing is applied
pub type ByteChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, crate::error::KernelError>> + Send>>;

/// Builds an [`EventStream`] from raw body chunks and the configured max
/// event size (32 MiB, to accommodate image-data events)
pub type DecoderFactory = fn(ByteChunkStream, usize) -> EventStream;

/// Per-content-type decoder factories, keyed by MIME type (without
/// parameters, e.g. `"text/event-stream"`)
pub type DecoderRegistry = HashMap<&'static str, DecoderFactory>;

/// Issues HTTP requests and decodes streaming responses
///
/// Implemented once, concretely, by `portal-pipeline`'s reqwest-backed
/// executor. `CustomizedExecutor` outbounds (AWS SigV4, etc.) wrap an
/// `Arc<dyn Executor>` rather than implementing HTTP I/O themselves.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// A single request/response round trip
    async fn do_request(&self, ctx: &crate::context::RequestContext, request: HttpRequest) -> Result<HttpResponse, crate::error::KernelError>;

    /// Open a long-lived streaming request
    async fn do_stream(&self, ctx: &crate::context::RequestContext, request: HttpRequest) -> Result<EventStream, crate::error::KernelError>;
}
