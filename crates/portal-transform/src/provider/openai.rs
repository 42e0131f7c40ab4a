//! `OpenAI`-compatible provider: native wire format for both directions

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use http::{HeaderValue, StatusCode, header};
use portal_config::LlmProviderConfig;
use portal_core::headers::{apply_header_rules, merge_headers};
use portal_core::model::{Request, Response, ResponseStreamItem};
use portal_core::transport::{EventStream, HttpRequest, HttpResponse};
use portal_core::{CredentialProvider, RequestContext, StaticCredentialProvider};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::parse_header_rules;
use crate::convert::openai::{openai_chunk_to_response, response_to_openai_chunk};
use crate::error::TransformError;
use crate::inbound::Inbound;
use crate::outbound::{ApiFormat, Outbound, ResponseMeta, ResponseStreamChunks};
use crate::protocol::openai::{OpenAiErrorResponse, OpenAiRequest, OpenAiResponse, OpenAiStreamChunk, OpenAiStreamOptions};

/// Default `OpenAI` API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Whether `base_url` points at the canonical `OpenAI` API, which is the
/// only backend known to accept `stream_options.include_usage` — many
/// compatible third parties reject the unrecognized field outright.
fn is_canonical_openai(base_url: &Url) -> bool {
    base_url.host_str().is_some_and(|h| h == "api.openai.com")
}

/// `OpenAI` chat-completions `Inbound` + `Outbound`
pub struct OpenAiOutbound {
    name: String,
    base_url: Url,
    credential: Option<Arc<dyn CredentialProvider>>,
    header_rules: Vec<portal_core::headers::HeaderRule>,
    forward_authorization: bool,
    send_stream_options: bool,
}

impl OpenAiOutbound {
    /// Build an outbound from provider configuration
    #[must_use]
    pub fn new(name: String, config: &LlmProviderConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL"));
        let send_stream_options = is_canonical_openai(&base_url);
        let credential = config
            .api_key
            .clone()
            .map(|key| Arc::new(StaticCredentialProvider::new(key)) as Arc<dyn CredentialProvider>);

        Self {
            name,
            header_rules: parse_header_rules(&config.headers),
            send_stream_options,
            base_url,
            credential,
            forward_authorization: config.forward_authorization,
        }
    }

    /// Build an outbound over an explicit credential provider, bypassing
    /// the single-key config shape (used for a pool of equivalent upstream
    /// accounts via [`portal_core::RandomCredentialProvider`])
    #[must_use]
    pub fn with_credential_provider(name: String, config: &LlmProviderConfig, credential: Arc<dyn CredentialProvider>) -> Self {
        Self {
            credential: Some(credential),
            ..Self::new(name, config)
        }
    }

    pub(crate) fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.as_str().trim_end_matches('/'))
    }

    fn resolve_api_key(&self, ctx: &RequestContext) -> Option<SecretString> {
        if self.forward_authorization && let Some(key) = &ctx.api_key {
            return Some(key.clone());
        }
        self.credential.as_ref().map(|provider| provider.get(ctx))
    }

    fn build_headers(&self, ctx: &RequestContext, api_key: Option<&SecretString>) -> http::HeaderMap {
        let mut base = http::HeaderMap::new();
        base.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key
            && let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", key.expose_secret()))
        {
            base.insert(header::AUTHORIZATION, value);
        }

        let forwarded = apply_header_rules(ctx.headers(), &self.header_rules);
        merge_headers(&base, &forwarded, &[])
    }
}

#[async_trait]
impl Inbound for OpenAiOutbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::OpenAi
    }

    fn transform_request(&self, raw: &[u8]) -> Result<Request, TransformError> {
        let wire: OpenAiRequest = serde_json::from_slice(raw).map_err(|e| TransformError::InvalidRequest(e.to_string()))?;
        let mut req: Request = wire.into();
        req.validate().map_err(|e| TransformError::InvalidRequest(e.to_owned()))?;
        Ok(req)
    }

    fn transform_response(&self, _ctx: &RequestContext, response: &Response) -> Result<Vec<u8>, TransformError> {
        let wire: OpenAiResponse = response.into();
        serde_json::to_vec(&wire).map_err(|e| TransformError::Streaming(e.to_string()))
    }

    fn transform_stream(&self, _ctx: &RequestContext, item: &ResponseStreamItem) -> Vec<u8> {
        match item {
            ResponseStreamItem::Chunk(response) => {
                let chunk = response_to_openai_chunk(response);
                let json = serde_json::to_string(&chunk).unwrap_or_default();
                format!("data: {json}\n\n").into_bytes()
            }
            ResponseStreamItem::Done => b"data: [DONE]\n\n".to_vec(),
        }
    }
}

#[async_trait]
impl Outbound for OpenAiOutbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::OpenAi
    }

    async fn transform_request(&self, ctx: &RequestContext, request: &Request) -> Result<HttpRequest, TransformError> {
        request.validate().map_err(|e| TransformError::InvalidRequest(e.to_owned()))?;

        let mut wire: OpenAiRequest = request.into();
        if request.wants_image_output() {
            if let Some(image) = &request.image {
                wire.messages = vec![crate::convert::openai::image_request_to_openai_message(image)];
            }
            wire.modalities = Some(vec!["image".to_owned(), "text".to_owned()]);
            wire.stream = None;
            wire.stream_options = None;
        } else if request.stream {
            wire.stream = Some(true);
            wire.stream_options = if self.send_stream_options {
                Some(OpenAiStreamOptions { include_usage: true })
            } else {
                None
            };
        }

        let api_key = self.resolve_api_key(ctx);
        let headers = self.build_headers(ctx, api_key.as_ref());
        let body = serde_json::to_vec(&wire).map_err(|e| TransformError::InvalidRequest(e.to_string()))?;

        Ok(HttpRequest::post_json(self.completions_url(), headers, body))
    }

    async fn transform_response(&self, _ctx: &RequestContext, response: HttpResponse) -> Result<Response, TransformError> {
        if !response.status.is_success() {
            return Err(self.transform_error(response.status, &response.body));
        }

        let wire: OpenAiResponse =
            serde_json::from_slice(&response.body).map_err(|e| TransformError::Upstream(format!("failed to parse response: {e}")))?;
        Ok(wire.into())
    }

    async fn transform_stream(&self, _ctx: &RequestContext, events: EventStream) -> Result<ResponseStreamChunks, TransformError> {
        let mapped = events.map(|result| match result {
            Ok(event) => {
                if event.is_done_sentinel() {
                    return Ok(ResponseStreamItem::Done);
                }
                serde_json::from_slice::<OpenAiStreamChunk>(&event.data)
                    .map(|chunk| ResponseStreamItem::Chunk(openai_chunk_to_response(&chunk)))
                    .map_err(|e| TransformError::Streaming(e.to_string()))
            }
            Err(e) => Err(TransformError::Transport(e)),
        });

        Ok(Box::pin(mapped))
    }

    fn transform_error(&self, status: StatusCode, body: &[u8]) -> TransformError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return TransformError::RateLimited { retry_after: None };
        }

        let detail = serde_json::from_slice::<OpenAiErrorResponse>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());
        TransformError::Upstream(format!("{status}: {detail}"))
    }

    fn aggregate_stream_chunks(&self, chunks: &[ResponseStreamItem]) -> (Vec<u8>, ResponseMeta) {
        let (text, meta) = crate::aggregate::fold_text_and_meta(chunks);
        let mut response = Response::text("aggregated", meta.model.clone().unwrap_or_default(), 0, text);
        response.usage = meta.usage.clone();
        response.choices[0].finish_reason = meta.finish_reason;
        let wire: OpenAiResponse = (&response).into();
        let body = serde_json::to_vec(&wire).unwrap_or_default();
        (body, meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmProviderConfig {
        LlmProviderConfig {
            provider_type: portal_config::LlmProviderType::Openai,
            api_key: None,
            base_url: None,
            models: portal_config::ModelConfig::default(),
            headers: vec![],
            forward_authorization: false,
            rate_limit: None,
        }
    }

    #[test]
    fn canonical_openai_gets_stream_options() {
        let outbound = OpenAiOutbound::new("openai".to_owned(), &config());
        assert!(outbound.send_stream_options);
    }

    #[test]
    fn compatible_backend_skips_stream_options() {
        let mut cfg = config();
        cfg.base_url = Some(Url::parse("https://api.together.xyz/v1").unwrap());
        let outbound = OpenAiOutbound::new("together".to_owned(), &cfg);
        assert!(!outbound.send_stream_options);
    }

    #[test]
    fn parses_minimal_client_request() {
        let outbound = OpenAiOutbound::new("openai".to_owned(), &config());
        let raw = br#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}]}"#;
        let req = outbound.transform_request(raw).unwrap();
        assert_eq!(req.model, "gpt-4o");
        assert_eq!(req.messages.len(), 1);
    }

    #[test]
    fn empty_messages_rejected() {
        let outbound = OpenAiOutbound::new("openai".to_owned(), &config());
        let raw = br#"{"model":"gpt-4o","messages":[]}"#;
        assert!(outbound.transform_request(raw).is_err());
    }

    #[tokio::test]
    async fn image_request_becomes_multimodal_chat_body() {
        let outbound = OpenAiOutbound::new("openai".to_owned(), &config());
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

        let mut request = portal_core::model::Request::chat("gpt-4o", vec![]);
        request.kind = portal_core::model::RequestKind::Image;
        request.image = Some(portal_core::model::ImageRequest {
            prompt: "a cat".to_owned(),
            images: vec![png.to_vec()],
            n: None,
            size: None,
            quality: None,
        });

        let ctx = portal_core::RequestContext::empty();
        let http_request = outbound.transform_request(&ctx, &request).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&http_request.body).unwrap();

        assert_eq!(body["modalities"], serde_json::json!(["image", "text"]));
        assert!(body.get("stream").is_none());
        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "image_url");
        assert!(parts[0]["image_url"]["url"].as_str().unwrap().starts_with("data:image/png;base64,"));
        assert_eq!(parts[1]["type"], "text");
        assert_eq!(parts[1]["text"], "a cat");
    }
}
