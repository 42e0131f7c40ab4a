//! `DeepSeek`: an `OpenAI`-compatible API that has no support for the
//! `json_schema` response format variant, only the looser `json_object`.
//! A client asking for a structured-output schema still gets well-formed
//! JSON back, just without schema enforcement on the provider side.

use async_trait::async_trait;
use http::StatusCode;
use portal_config::LlmProviderConfig;
use portal_core::model::{Request, Response, ResponseFormat, ResponseStreamItem};
use portal_core::transport::{EventStream, HttpRequest, HttpResponse};
use portal_core::RequestContext;

use super::openai::OpenAiOutbound;
use crate::error::TransformError;
use crate::outbound::{ApiFormat, Outbound, ResponseMeta, ResponseStreamChunks};

/// `DeepSeek` outbound: wraps [`OpenAiOutbound`] and coerces
/// `response_format: json_schema` down to `json_object`
pub struct DeepSeekOutbound {
    inner: OpenAiOutbound,
}

impl DeepSeekOutbound {
    /// Build an outbound from provider configuration
    #[must_use]
    pub fn new(name: String, config: &LlmProviderConfig) -> Self {
        Self {
            inner: OpenAiOutbound::new(name, config),
        }
    }

    fn coerce_response_format(request: &Request) -> Option<Request> {
        if !matches!(request.response_format, Some(ResponseFormat::JsonSchema { .. })) {
            return None;
        }
        let mut coerced = request.clone();
        coerced.response_format = Some(ResponseFormat::JsonObject);
        Some(coerced)
    }
}

#[async_trait]
impl Outbound for DeepSeekOutbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::DeepSeek
    }

    async fn transform_request(&self, ctx: &RequestContext, request: &Request) -> Result<HttpRequest, TransformError> {
        match Self::coerce_response_format(request) {
            Some(coerced) => self.inner.transform_request(ctx, &coerced).await,
            None => self.inner.transform_request(ctx, request).await,
        }
    }

    async fn transform_response(&self, ctx: &RequestContext, response: HttpResponse) -> Result<Response, TransformError> {
        self.inner.transform_response(ctx, response).await
    }

    async fn transform_stream(&self, ctx: &RequestContext, events: EventStream) -> Result<ResponseStreamChunks, TransformError> {
        self.inner.transform_stream(ctx, events).await
    }

    fn transform_error(&self, status: StatusCode, body: &[u8]) -> TransformError {
        self.inner.transform_error(status, body)
    }

    fn aggregate_stream_chunks(&self, chunks: &[ResponseStreamItem]) -> (Vec<u8>, ResponseMeta) {
        self.inner.aggregate_stream_chunks(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_schema_is_coerced_to_json_object() {
        let mut request = Request::chat("deepseek-chat", vec![]);
        request.response_format = Some(ResponseFormat::JsonSchema {
            json_schema: serde_json::json!({"name": "answer", "schema": {"type": "object"}}),
        });

        let coerced = DeepSeekOutbound::coerce_response_format(&request).unwrap();
        assert!(matches!(coerced.response_format, Some(ResponseFormat::JsonObject)));
    }

    #[test]
    fn non_schema_requests_are_untouched() {
        let mut request = Request::chat("deepseek-chat", vec![]);
        request.response_format = Some(ResponseFormat::JsonObject);
        assert!(DeepSeekOutbound::coerce_response_format(&request).is_none());

        request.response_format = None;
        assert!(DeepSeekOutbound::coerce_response_format(&request).is_none());
    }
}
