//! Alibaba Bailian: an `OpenAI`-compatible endpoint with two message-shape
//! quirks. It has no concept of the `developer` role, and it rejects an
//! assistant message that carries `tool_calls` back-to-back with another
//! assistant message of empty content, so consecutive assistant-only
//! tool-call messages must be merged into one before sending.

use async_trait::async_trait;
use http::StatusCode;
use portal_config::LlmProviderConfig;
use portal_core::model::{Content, Message, Request, Response, ResponseStreamItem, Role};
use portal_core::transport::{EventStream, HttpRequest, HttpResponse};
use portal_core::RequestContext;

use super::openai::OpenAiOutbound;
use crate::error::TransformError;
use crate::outbound::{ApiFormat, Outbound, ResponseMeta, ResponseStreamChunks};

/// Bailian outbound: wraps [`OpenAiOutbound`] and normalizes message shape
/// before delegating
pub struct BailianOutbound {
    inner: OpenAiOutbound,
}

impl BailianOutbound {
    /// Build an outbound from provider configuration
    #[must_use]
    pub fn new(name: String, config: &LlmProviderConfig) -> Self {
        Self {
            inner: OpenAiOutbound::new(name, config),
        }
    }

    /// Whether a message is an assistant message with no text content,
    /// carrying only tool calls
    fn is_empty_tool_call_message(message: &Message) -> bool {
        message.role == Role::Assistant
            && message.content.as_text().is_empty()
            && message.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }

    /// Map `developer` to `system`, and merge runs of consecutive
    /// assistant/tool-calls-only messages into a single message
    fn normalize_messages(messages: &[Message]) -> Vec<Message> {
        let mut out: Vec<Message> = Vec::with_capacity(messages.len());

        for message in messages {
            let mut message = message.clone();
            if message.role == Role::Developer {
                message.role = Role::System;
            }

            if Self::is_empty_tool_call_message(&message) {
                if let Some(prev) = out.last_mut() {
                    if Self::is_empty_tool_call_message(prev) {
                        let mut merged = prev.tool_calls.take().unwrap_or_default();
                        merged.extend(message.tool_calls.clone().unwrap_or_default());
                        prev.tool_calls = Some(merged);
                        continue;
                    }
                }
            }

            out.push(message);
        }

        out
    }

    fn normalize_request(request: &Request) -> Request {
        let mut normalized = request.clone();
        normalized.messages = Self::normalize_messages(&request.messages);
        normalized
    }
}

#[async_trait]
impl Outbound for BailianOutbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::Bailian
    }

    async fn transform_request(&self, ctx: &RequestContext, request: &Request) -> Result<HttpRequest, TransformError> {
        let normalized = Self::normalize_request(request);
        self.inner.transform_request(ctx, &normalized).await
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
    use portal_core::model::ToolCall;

    fn tool_call_message(id: &str) -> Message {
        Message {
            role: Role::Assistant,
            content: Content::Text(String::new()),
            name: None,
            tool_calls: Some(vec![ToolCall {
                id: id.to_owned(),
                function: portal_core::model::FunctionCall {
                    name: "lookup".to_owned(),
                    arguments: "{}".to_owned(),
                },
            }]),
            tool_call_id: None,
        }
    }

    #[test]
    fn developer_role_becomes_system() {
        let messages = vec![Message {
            role: Role::Developer,
            content: Content::Text("be terse".to_owned()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }];
        let normalized = BailianOutbound::normalize_messages(&messages);
        assert_eq!(normalized[0].role, Role::System);
    }

    #[test]
    fn consecutive_tool_call_messages_are_merged() {
        let messages = vec![tool_call_message("call_1"), tool_call_message("call_2")];
        let normalized = BailianOutbound::normalize_messages(&messages);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].tool_calls.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn unrelated_messages_are_not_merged() {
        let messages = vec![
            Message {
                role: Role::User,
                content: Content::Text("hi".to_owned()),
                name: None,
                tool_calls: None,
                tool_call_id: None,
            },
            tool_call_message("call_1"),
        ];
        let normalized = BailianOutbound::normalize_messages(&messages);
        assert_eq!(normalized.len(), 2);
    }
}
