//! Longcat: an `OpenAI`-compatible endpoint that rejects a `null` message
//! `content` field outright. The unified model never constructs `null`
//! content, but a client can still submit an assistant message whose only
//! payload is tool calls, which collapses to an empty string on this
//! provider rather than being omitted.

use async_trait::async_trait;
use http::StatusCode;
use portal_config::LlmProviderConfig;
use portal_core::model::{Request, Response, ResponseStreamItem};
use portal_core::transport::{EventStream, HttpRequest, HttpResponse};
use portal_core::RequestContext;

use super::openai::OpenAiOutbound;
use crate::error::TransformError;
use crate::outbound::{ApiFormat, Outbound, ResponseMeta, ResponseStreamChunks};

/// Longcat outbound: wraps [`OpenAiOutbound`] and normalizes null/missing
/// message content to an empty string before sending
pub struct LongcatOutbound {
    inner: OpenAiOutbound,
}

impl LongcatOutbound {
    /// Build an outbound from provider configuration
    #[must_use]
    pub fn new(name: String, config: &LlmProviderConfig) -> Self {
        Self {
            inner: OpenAiOutbound::new(name, config),
        }
    }

    fn normalize_null_content(body: &[u8]) -> Result<Vec<u8>, TransformError> {
        let mut value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| TransformError::InvalidRequest(e.to_string()))?;

        if let Some(messages) = value.get_mut("messages").and_then(serde_json::Value::as_array_mut) {
            for message in messages {
                let Some(obj) = message.as_object_mut() else { continue };
                let is_null_or_missing = obj.get("content").is_none_or(serde_json::Value::is_null);
                if is_null_or_missing {
                    obj.insert("content".to_owned(), serde_json::Value::String(String::new()));
                }
            }
        }

        serde_json::to_vec(&value).map_err(|e| TransformError::InvalidRequest(e.to_string()))
    }
}

#[async_trait]
impl Outbound for LongcatOutbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::Longcat
    }

    async fn transform_request(&self, ctx: &RequestContext, request: &Request) -> Result<HttpRequest, TransformError> {
        let mut http_req = self.inner.transform_request(ctx, request).await?;
        http_req.body = Self::normalize_null_content(&http_req.body)?;
        Ok(http_req)
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

    fn config() -> LlmProviderConfig {
        LlmProviderConfig {
            provider_type: portal_config::LlmProviderType::Longcat,
            api_key: None,
            base_url: None,
            models: portal_config::ModelConfig::default(),
            headers: vec![],
            forward_authorization: false,
            rate_limit: None,
        }
    }

    #[tokio::test]
    async fn missing_content_becomes_empty_string() {
        let outbound = LongcatOutbound::new("longcat".to_owned(), &config());
        let mut req = Request::chat("longcat-chat", vec![]);
        req.messages.push(portal_core::model::Message {
            role: portal_core::model::Role::Assistant,
            content: portal_core::model::Content::Text(String::new()),
            name: None,
            tool_calls: Some(vec![]),
            tool_call_id: None,
        });

        let body = br#"{"model":"longcat-chat","messages":[{"role":"assistant","tool_calls":[]}]}"#;
        let normalized = LongcatOutbound::normalize_null_content(body).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&normalized).unwrap();
        assert_eq!(value["messages"][0]["content"], serde_json::Value::String(String::new()));
        let _ = outbound;
        let _ = req;
    }

    #[test]
    fn present_content_is_left_untouched() {
        let body = br#"{"messages":[{"role":"user","content":"hi"}]}"#;
        let normalized = LongcatOutbound::normalize_null_content(body).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&normalized).unwrap();
        assert_eq!(value["messages"][0]["content"], "hi");
    }
}
