//! `OpenRouter`: an `OpenAI`-compatible aggregator that attaches a
//! `reasoning_details` array to assistant messages and stream deltas,
//! carrying each upstream model's private reasoning trace. Neither the
//! unified model nor the base `OpenAI` wire format has a field for this, so
//! it is stashed in `Response::transformer_metadata` rather than dropped.

use async_trait::async_trait;
use futures_util::StreamExt;
use http::StatusCode;
use portal_config::LlmProviderConfig;
use portal_core::model::{Request, Response, ResponseStreamItem};
use portal_core::transport::{EventStream, HttpRequest, HttpResponse};
use portal_core::RequestContext;
use url::Url;

use super::openai::OpenAiOutbound;
use crate::error::TransformError;
use crate::outbound::{ApiFormat, Outbound, ResponseMeta, ResponseStreamChunks};

/// Default `OpenRouter` API base URL
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Scratch key under which the aggregated reasoning trace text is stashed
pub const REASONING_METADATA_KEY: &str = "openrouter_reasoning";

/// `OpenRouter` outbound: wraps [`OpenAiOutbound`] and overrides only the
/// `reasoning_details` aggregation behavior
pub struct OpenRouterOutbound {
    inner: OpenAiOutbound,
}

impl OpenRouterOutbound {
    /// Build an outbound from provider configuration, defaulting to
    /// `OpenRouter`'s base URL when the config leaves it unset
    #[must_use]
    pub fn new(name: String, config: &LlmProviderConfig) -> Self {
        let mut config = config.clone();
        if config.base_url.is_none() {
            config.base_url = Url::parse(DEFAULT_BASE_URL).ok();
        }
        Self {
            inner: OpenAiOutbound::new(name, &config),
        }
    }

    /// Pull `reasoning_details[].text` out of a raw provider JSON value and
    /// join the fragments in order
    fn extract_reasoning(value: &serde_json::Value) -> Option<String> {
        let details = value
            .get("choices")?
            .get(0)?
            .get("message")
            .or_else(|| value.get("choices")?.get(0)?.get("delta"))?
            .get("reasoning_details")?
            .as_array()?;

        let joined: String = details.iter().filter_map(|d| d.get("text")?.as_str()).collect();
        if joined.is_empty() { None } else { Some(joined) }
    }
}

#[async_trait]
impl Outbound for OpenRouterOutbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::OpenRouter
    }

    async fn transform_request(&self, ctx: &RequestContext, request: &Request) -> Result<HttpRequest, TransformError> {
        self.inner.transform_request(ctx, request).await
    }

    async fn transform_response(&self, ctx: &RequestContext, response: HttpResponse) -> Result<Response, TransformError> {
        let raw: serde_json::Value = serde_json::from_slice(&response.body).unwrap_or(serde_json::Value::Null);
        let reasoning = Self::extract_reasoning(&raw);

        let mut unified = self.inner.transform_response(ctx, response).await?;
        if let Some(text) = reasoning {
            unified.transformer_metadata.insert(REASONING_METADATA_KEY, &text);
        }
        Ok(unified)
    }

    async fn transform_stream(&self, ctx: &RequestContext, events: EventStream) -> Result<ResponseStreamChunks, TransformError> {
        let mapped = events.map(|result| {
            let event = result.map_err(TransformError::Transport)?;
            if event.is_done_sentinel() {
                return Ok(ResponseStreamItem::Done);
            }

            let raw: serde_json::Value = serde_json::from_slice(&event.data).unwrap_or(serde_json::Value::Null);
            let reasoning = Self::extract_reasoning(&raw);

            let chunk: crate::protocol::openai::OpenAiStreamChunk =
                serde_json::from_slice(&event.data).map_err(|e| TransformError::Streaming(e.to_string()))?;
            let mut response = crate::convert::openai::openai_chunk_to_response(&chunk);
            if let Some(text) = reasoning {
                response.transformer_metadata.insert(REASONING_METADATA_KEY, &text);
            }
            Ok(ResponseStreamItem::Chunk(response))
        });

        Ok(Box::pin(mapped))
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
            provider_type: portal_config::LlmProviderType::OpenRouter,
            api_key: None,
            base_url: None,
            models: portal_config::ModelConfig::default(),
            headers: vec![],
            forward_authorization: false,
            rate_limit: None,
        }
    }

    #[test]
    fn defaults_to_openrouter_base_url() {
        let outbound = OpenRouterOutbound::new("openrouter".to_owned(), &config());
        assert_eq!(outbound.inner.completions_url(), "https://openrouter.ai/api/v1/chat/completions");
    }

    #[test]
    fn extracts_reasoning_text_from_message() {
        let raw = serde_json::json!({
            "choices": [{
                "message": {
                    "reasoning_details": [{"text": "step one. "}, {"text": "step two."}]
                }
            }]
        });
        let text = OpenRouterOutbound::extract_reasoning(&raw).unwrap();
        assert_eq!(text, "step one. step two.");
    }

    #[test]
    fn missing_reasoning_details_yields_none() {
        let raw = serde_json::json!({"choices": [{"message": {}}]});
        assert!(OpenRouterOutbound::extract_reasoning(&raw).is_none());
    }
}
