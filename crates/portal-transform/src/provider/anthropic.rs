//! Anthropic Messages provider: native wire format for both directions

use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::StreamExt;
use http::{HeaderValue, StatusCode, header};
use portal_config::LlmProviderConfig;
use portal_core::headers::{apply_header_rules, merge_headers};
use portal_core::model::{Request, Response, ResponseStreamItem};
use portal_core::transport::{EventStream, HttpRequest, HttpResponse};
use portal_core::RequestContext;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::parse_header_rules;
use crate::convert::anthropic::{AnthropicEncodeState, AnthropicStreamState};
use crate::error::TransformError;
use crate::inbound::Inbound;
use crate::outbound::{ApiFormat, Outbound, ResponseMeta, ResponseStreamChunks};
use crate::protocol::anthropic::{AnthropicErrorResponse, AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};

/// Default Anthropic API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value, pinned to the wire format this
/// transformer speaks
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages `Inbound` + `Outbound`
pub struct AnthropicOutbound {
    base_url: Url,
    api_key: Option<SecretString>,
    header_rules: Vec<portal_core::headers::HeaderRule>,
    forward_authorization: bool,
    /// `Inbound::transform_stream` re-encodes unified items into Anthropic's
    /// block-indexed SSE shape one item at a time; this tracks that encoding
    /// across calls behind `&self`, mirroring `RequestContext`'s interior
    /// mutability rather than threading `&mut self` through the trait.
    encode_state: Mutex<AnthropicEncodeState>,
}

impl AnthropicOutbound {
    /// Build an outbound from provider configuration
    #[must_use]
    pub fn new(config: &LlmProviderConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL"));

        Self {
            header_rules: parse_header_rules(&config.headers),
            base_url,
            api_key: config.api_key.clone(),
            forward_authorization: config.forward_authorization,
            encode_state: Mutex::new(AnthropicEncodeState::new()),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.base_url.as_str().trim_end_matches('/'))
    }

    fn resolve_api_key(&self, ctx: &RequestContext) -> Option<SecretString> {
        if self.forward_authorization && let Some(key) = &ctx.api_key {
            return Some(key.clone());
        }
        self.api_key.clone()
    }

    fn build_headers(&self, ctx: &RequestContext, api_key: Option<&SecretString>) -> http::HeaderMap {
        let mut base = http::HeaderMap::new();
        base.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        base.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        if let Some(key) = api_key
            && let Ok(value) = HeaderValue::from_str(key.expose_secret())
        {
            base.insert("x-api-key", value);
        }

        let forwarded = apply_header_rules(ctx.headers(), &self.header_rules);
        merge_headers(&base, &forwarded, &[])
    }
}

#[async_trait]
impl Inbound for AnthropicOutbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::Anthropic
    }

    fn transform_request(&self, raw: &[u8]) -> Result<Request, TransformError> {
        let wire: AnthropicRequest = serde_json::from_slice(raw).map_err(|e| TransformError::InvalidRequest(e.to_string()))?;
        let mut req: Request = wire.into();
        req.validate().map_err(|e| TransformError::InvalidRequest(e.to_owned()))?;
        Ok(req)
    }

    fn transform_response(&self, _ctx: &RequestContext, response: &Response) -> Result<Vec<u8>, TransformError> {
        let wire: AnthropicResponse = response.into();
        serde_json::to_vec(&wire).map_err(|e| TransformError::Streaming(e.to_string()))
    }

    fn transform_stream(&self, _ctx: &RequestContext, item: &ResponseStreamItem) -> Vec<u8> {
        let mut encoder = self.encode_state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let response_id = item_response_id(item).unwrap_or_default();
        let model = item_model(item).unwrap_or_default();
        let events = encoder.encode_item(item, &response_id, &model);

        let mut out = Vec::new();
        for event in &events {
            out.extend_from_slice(encode_sse_event(event).as_bytes());
        }
        out
    }
}

/// Extract the response id carried on a stream chunk, for re-synthesizing
/// `message_start` on the first item observed
fn item_response_id(item: &ResponseStreamItem) -> Option<String> {
    match item {
        ResponseStreamItem::Chunk(response) => Some(response.id.clone()),
        ResponseStreamItem::Done => None,
    }
}

fn item_model(item: &ResponseStreamItem) -> Option<String> {
    match item {
        ResponseStreamItem::Chunk(response) => Some(response.model.clone()),
        ResponseStreamItem::Done => None,
    }
}

fn encode_sse_event(event: &AnthropicStreamEvent) -> String {
    let event_name = match event {
        AnthropicStreamEvent::MessageStart { .. } => "message_start",
        AnthropicStreamEvent::ContentBlockStart { .. } => "content_block_start",
        AnthropicStreamEvent::ContentBlockDelta { .. } => "content_block_delta",
        AnthropicStreamEvent::ContentBlockStop { .. } => "content_block_stop",
        AnthropicStreamEvent::MessageDelta { .. } => "message_delta",
        AnthropicStreamEvent::MessageStop => "message_stop",
        AnthropicStreamEvent::Ping => "ping",
    };
    let data = serde_json::to_string(event).unwrap_or_default();
    format!("event: {event_name}\ndata: {data}\n\n")
}

#[async_trait]
impl Outbound for AnthropicOutbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::Anthropic
    }

    async fn transform_request(&self, ctx: &RequestContext, request: &Request) -> Result<HttpRequest, TransformError> {
        request.validate().map_err(|e| TransformError::InvalidRequest(e.to_owned()))?;

        let mut wire: AnthropicRequest = request.into();
        if request.stream {
            wire.stream = Some(true);
        }

        let api_key = self.resolve_api_key(ctx);
        let headers = self.build_headers(ctx, api_key.as_ref());
        let body = serde_json::to_vec(&wire).map_err(|e| TransformError::InvalidRequest(e.to_string()))?;

        Ok(HttpRequest::post_json(self.messages_url(), headers, body))
    }

    async fn transform_response(&self, _ctx: &RequestContext, response: HttpResponse) -> Result<Response, TransformError> {
        if !response.status.is_success() {
            return Err(self.transform_error(response.status, &response.body));
        }

        let wire: AnthropicResponse =
            serde_json::from_slice(&response.body).map_err(|e| TransformError::Upstream(format!("failed to parse response: {e}")))?;
        Ok(wire.into())
    }

    async fn transform_stream(&self, _ctx: &RequestContext, events: EventStream) -> Result<ResponseStreamChunks, TransformError> {
        let state = Mutex::new(AnthropicStreamState::new());
        let mapped = events.flat_map(move |result| {
            let items = match result {
                Ok(event) => match serde_json::from_slice::<AnthropicStreamEvent>(&event.data) {
                    Ok(parsed) => {
                        let mut state = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                        state
                            .convert_event(&parsed)
                            .into_iter()
                            .map(Ok)
                            .collect::<Vec<Result<ResponseStreamItem, TransformError>>>()
                    }
                    Err(e) => vec![Err(TransformError::Streaming(e.to_string()))],
                },
                Err(e) => vec![Err(TransformError::Transport(e))],
            };
            futures_util::stream::iter(items)
        });

        Ok(Box::pin(mapped))
    }

    fn transform_error(&self, status: StatusCode, body: &[u8]) -> TransformError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return TransformError::RateLimited { retry_after: None };
        }

        let detail = serde_json::from_slice::<AnthropicErrorResponse>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());
        TransformError::Upstream(format!("{status}: {detail}"))
    }

    fn aggregate_stream_chunks(&self, chunks: &[ResponseStreamItem]) -> (Vec<u8>, ResponseMeta) {
        let (text, meta) = crate::aggregate::fold_text_and_meta(chunks);
        let mut response = Response::text("aggregated", meta.model.clone().unwrap_or_default(), 0, text);
        response.usage = meta.usage.clone();
        response.choices[0].finish_reason = meta.finish_reason;
        let wire: AnthropicResponse = (&response).into();
        let body = serde_json::to_vec(&wire).unwrap_or_default();
        (body, meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmProviderConfig {
        LlmProviderConfig {
            provider_type: portal_config::LlmProviderType::Anthropic,
            api_key: None,
            base_url: None,
            models: portal_config::ModelConfig::default(),
            headers: vec![],
            forward_authorization: false,
            rate_limit: None,
        }
    }

    #[test]
    fn parses_minimal_client_request() {
        let outbound = AnthropicOutbound::new(&config());
        let raw = br#"{"model":"claude-3-opus","max_tokens":128,"messages":[{"role":"user","content":"hi"}]}"#;
        let req = outbound.transform_request(raw).unwrap();
        assert_eq!(req.model, "claude-3-opus");
        assert_eq!(req.messages.len(), 1);
    }

    #[test]
    fn empty_messages_rejected() {
        let outbound = AnthropicOutbound::new(&config());
        let raw = br#"{"model":"claude-3-opus","max_tokens":128,"messages":[]}"#;
        assert!(outbound.transform_request(raw).is_err());
    }

    #[test]
    fn builds_api_key_header_from_config() {
        let mut cfg = config();
        cfg.api_key = Some(SecretString::from("sk-ant-test"));
        let outbound = AnthropicOutbound::new(&cfg);
        let ctx = RequestContext::empty();
        let headers = outbound.build_headers(&ctx, outbound.api_key.as_ref());
        assert_eq!(headers.get("x-api-key").unwrap(), "sk-ant-test");
        assert_eq!(headers.get("anthropic-version").unwrap(), ANTHROPIC_VERSION);
    }
}
