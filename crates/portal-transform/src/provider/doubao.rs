//! `ByteDance` Doubao: an `OpenAI`-compatible endpoint that expects a
//! tracing `request_id` and an optional `user_id` as top-level fields on
//! the request body rather than nested inside an opaque metadata bag.
//! When the caller didn't supply a `request_id`, one is generated so the
//! upstream call always carries one for support/troubleshooting purposes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use http::StatusCode;
use portal_config::LlmProviderConfig;
use portal_core::model::{Request, Response, ResponseStreamItem};
use portal_core::transport::{EventStream, HttpRequest, HttpResponse};
use portal_core::RequestContext;

use super::openai::OpenAiOutbound;
use crate::error::TransformError;
use crate::outbound::{ApiFormat, Outbound, ResponseMeta, ResponseStreamChunks};

/// Process-wide counter appended to generated request ids to keep them
/// unique even when two requests land in the same millisecond
static REQUEST_ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Doubao outbound: wraps [`OpenAiOutbound`] and hoists `request_id`/
/// `user_id` out of request metadata to the top level of the body
pub struct DoubaoOutbound {
    inner: OpenAiOutbound,
}

impl DoubaoOutbound {
    /// Build an outbound from provider configuration
    #[must_use]
    pub fn new(name: String, config: &LlmProviderConfig) -> Self {
        Self {
            inner: OpenAiOutbound::new(name, config),
        }
    }

    /// Generate a `request_id` of the form `req_{unix_millis}_{sequence}`
    ///
    /// The upstream reference implementation seeds this from a
    /// second-resolution timestamp alone, which collides under load;
    /// millisecond resolution plus a per-process sequence number avoids
    /// that without reaching for a full UUID.
    fn generate_request_id() -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let seq = REQUEST_ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        format!("req_{millis}_{seq}")
    }

    fn hoist_metadata(body: &[u8], request_id: &str, user_id: Option<&str>) -> Result<Vec<u8>, TransformError> {
        let mut value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| TransformError::InvalidRequest(e.to_string()))?;

        if let Some(obj) = value.as_object_mut() {
            obj.insert("request_id".to_owned(), serde_json::Value::String(request_id.to_owned()));
            if let Some(user_id) = user_id {
                obj.insert("user_id".to_owned(), serde_json::Value::String(user_id.to_owned()));
            }
        }

        serde_json::to_vec(&value).map_err(|e| TransformError::InvalidRequest(e.to_string()))
    }
}

#[async_trait]
impl Outbound for DoubaoOutbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::Doubao
    }

    async fn transform_request(&self, ctx: &RequestContext, request: &Request) -> Result<HttpRequest, TransformError> {
        let mut http_req = self.inner.transform_request(ctx, request).await?;

        let request_id = request
            .metadata
            .as_ref()
            .and_then(|m| m.get("request_id"))
            .cloned()
            .unwrap_or_else(Self::generate_request_id);
        let user_id = request.metadata.as_ref().and_then(|m| m.get("user_id")).cloned();

        http_req.body = Self::hoist_metadata(&http_req.body, &request_id, user_id.as_deref())?;
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

    #[test]
    fn hoists_provided_request_id_and_user_id() {
        let body = br#"{"model":"doubao-pro"}"#;
        let hoisted = DoubaoOutbound::hoist_metadata(body, "req_abc", Some("user-42")).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&hoisted).unwrap();
        assert_eq!(value["request_id"], "req_abc");
        assert_eq!(value["user_id"], "user-42");
    }

    #[test]
    fn generated_request_ids_are_unique_and_prefixed() {
        let first = DoubaoOutbound::generate_request_id();
        let second = DoubaoOutbound::generate_request_id();
        assert_ne!(first, second);
        assert!(first.starts_with("req_"));
    }

    #[test]
    fn omits_user_id_when_absent() {
        let body = br#"{"model":"doubao-pro"}"#;
        let hoisted = DoubaoOutbound::hoist_metadata(body, "req_abc", None).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&hoisted).unwrap();
        assert!(value.get("user_id").is_none());
    }
}
