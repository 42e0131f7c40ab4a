use serde::{Deserialize, Serialize};

use super::message::{FunctionCall, ToolCall};
use super::stream::StreamDelta;
use super::request::TransformerMetadata;

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the `max_tokens` limit
    Length,
    /// Model decided to call a tool
    ToolCalls,
    /// Content was filtered by safety systems
    ContentFilter,
}

/// Breakdown of prompt-side token usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptTokensDetails {
    /// Tokens served from a prompt cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u32>,
    /// Tokens attributable to audio input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_tokens: Option<u32>,
}

/// Breakdown of completion-side token usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionTokensDetails {
    /// Tokens spent on hidden reasoning before the visible completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
    /// Tokens attributable to audio output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_tokens: Option<u32>,
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion)
    pub total_tokens: u32,
    /// Detailed prompt-token breakdown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    /// Detailed completion-token breakdown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

/// Message content within a non-streaming response choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    /// Role is always assistant for completions
    pub role: String,
    /// Text content
    pub content: Option<String>,
    /// Tool calls requested by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChoiceMessage {
    /// Create a simple text message from the assistant
    #[must_use]
    pub fn text(content: String) -> Self {
        Self {
            role: "assistant".to_owned(),
            content: Some(content),
            tool_calls: None,
        }
    }

    /// Create a tool-calling message from the assistant
    #[must_use]
    pub fn with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_owned(),
            content: None,
            tool_calls: Some(tool_calls),
        }
    }
}

/// A single completion choice: `message` is populated for a non-streaming
/// response, `delta` for a streaming chunk. Exactly one is expected to be
/// `Some` at a time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Choice {
    /// Index of this choice
    pub index: u32,
    /// Full message (non-streaming)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChoiceMessage>,
    /// Incremental delta (streaming)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<StreamDelta>,
    /// Why generation stopped; absent on non-final streaming chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Token-level log probabilities, passed through opaquely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
}

/// Unified error payload, lifted from a provider's error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedError {
    /// Human-readable message
    pub message: String,
    /// Machine-readable error type
    #[serde(rename = "type")]
    pub error_type: String,
    /// Provider error code, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Provider request id, if any, for cross-referencing support tickets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Internal canonical response, spanning non-streaming and streaming
/// chat shapes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Unique response identifier
    pub id: String,
    /// Object type (e.g. `"chat.completion"`, `"chat.completion.chunk"`)
    pub object: String,
    /// Unix timestamp of creation
    pub created: u64,
    /// Model used for generation
    pub model: String,
    /// Generated choices
    pub choices: Vec<Choice>,
    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Service tier the request was served at, if the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_tier: Option<String>,
    /// Backend configuration fingerprint, if the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    /// Present when the provider reported an error instead of a completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<UnifiedError>,

    /// Opaque provider body, kept for audit; never sent back upstream
    #[serde(skip)]
    pub provider_data: Option<serde_json::Value>,
    /// Transformer-private scratch data; never serialized
    #[serde(skip)]
    pub transformer_metadata: TransformerMetadata,
}

impl Response {
    /// Build a minimal non-streaming text response
    #[must_use]
    pub fn text(id: impl Into<String>, model: impl Into<String>, created: u64, content: String) -> Self {
        Self {
            id: id.into(),
            object: "chat.completion".to_owned(),
            created,
            model: model.into(),
            choices: vec![Choice {
                index: 0,
                message: Some(ChoiceMessage::text(content)),
                delta: None,
                finish_reason: Some(FinishReason::Stop),
                logprobs: None,
            }],
            usage: None,
            service_tier: None,
            system_fingerprint: None,
            error: None,
            provider_data: None,
            transformer_metadata: TransformerMetadata::default(),
        }
    }
}

/// Embedding vector, accepted/produced as raw floats or a base64-encoded
/// blob (providers differ on `encoding_format`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingVector {
    /// Raw floating-point vector
    Floats(Vec<f32>),
    /// Base64-encoded packed floats
    Base64(String),
}

/// A single embedding result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingData {
    /// Index into the original input batch
    pub index: u32,
    /// The embedding vector
    pub embedding: EmbeddingVector,
}

/// Embedding response payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// Model used
    pub model: String,
    /// One entry per input
    pub data: Vec<EmbeddingData>,
    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A single ranked document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankResult {
    /// Index into the original document list
    pub index: u32,
    /// Relevance score, higher is more relevant
    pub relevance_score: f64,
}

/// Rerank response payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankResponse {
    /// Model used
    pub model: String,
    /// Results, ordered by `relevance_score` descending
    pub results: Vec<RerankResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_response_has_one_choice_with_message() {
        let resp = Response::text("resp_1", "gpt-4o", 0, "hi".to_owned());
        assert_eq!(resp.choices.len(), 1);
        assert!(resp.choices[0].message.is_some());
        assert!(resp.choices[0].delta.is_none());
    }

    #[test]
    fn internal_fields_never_serialize() {
        let mut resp = Response::text("resp_1", "gpt-4o", 0, "hi".to_owned());
        resp.provider_data = Some(serde_json::json!({"raw": true}));
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("provider_data").is_none());
        assert!(json.get("transformer_metadata").is_none());
    }

    #[test]
    fn embedding_vector_accepts_either_shape() {
        let floats: EmbeddingVector = serde_json::from_str("[0.1,0.2]").unwrap();
        assert!(matches!(floats, EmbeddingVector::Floats(_)));
        let b64: EmbeddingVector = serde_json::from_str("\"AAAA\"").unwrap();
        assert!(matches!(b64, EmbeddingVector::Base64(_)));
    }
}
