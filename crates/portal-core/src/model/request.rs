use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::message::Message;
use super::tool::{ToolChoice, ToolDefinition};

/// Which wire shape a `Request` carries
///
/// One `Request` spans all four request types spec.md §1 lists; callers
/// branch on `kind` to find the populated payload (`messages` for `Chat`,
/// `image` for `Image`, `embedding_input` for `Embedding`, `rerank` for
/// `Rerank`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Chat completion
    Chat,
    /// Image generation
    Image,
    /// Text/token embedding
    Embedding,
    /// Document rerank
    Rerank,
}

/// Stop sequences, accepted as either a bare string or an array
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    /// A single stop sequence
    One(String),
    /// Multiple stop sequences
    Many(Vec<String>),
}

impl StopSequences {
    /// View as a slice regardless of the original wire shape
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::One(s) => std::slice::from_ref(s),
            Self::Many(v) => v,
        }
    }
}

/// `embedding_input`: string, array of strings, array of token ids, or a
/// batch of token-id arrays
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    /// A single string to embed
    Text(String),
    /// Multiple strings to embed
    Texts(Vec<String>),
    /// Pre-tokenized input
    Tokens(Vec<i64>),
    /// A batch of pre-tokenized inputs
    TokenBatches(Vec<Vec<i64>>),
}

/// Requested output format for the model's reply
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free-form text
    Text,
    /// Must be syntactically valid JSON, schema unconstrained
    JsonObject,
    /// Must validate against the supplied JSON Schema
    JsonSchema {
        /// The schema descriptor, provider-shaped
        json_schema: serde_json::Value,
    },
}

/// Options controlling how a streaming response is delivered
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Include a final usage-only chunk before `[DONE]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_usage: Option<bool>,
}

/// Image-generation request payload (populated when `kind == Image`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequest {
    /// Text prompt describing the desired image
    pub prompt: String,
    /// Reference images supplied by the caller (raw bytes, pre-decode)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Vec<u8>>,
    /// Requested output count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    /// Requested size, e.g. `"1024x1024"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Requested quality tier, e.g. `"hd"`/`"standard"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
}

/// Rerank request payload (populated when `kind == Rerank`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankRequest {
    /// The search query
    pub query: String,
    /// Candidate documents to rank against the query
    pub documents: Vec<String>,
    /// Cap the number of ranked results returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_n: Option<u32>,
}

/// A typed bag of per-transformer scratch data
///
/// Never serialized: it exists only to pass transformer-private state
/// (e.g. a generated `request_id`) between `transform_request` and
/// `transform_response` within a single pipeline iteration.
#[derive(Debug, Clone, Default)]
pub struct TransformerMetadata(HashMap<&'static str, serde_json::Value>);

impl TransformerMetadata {
    /// Store a value under `key`
    pub fn insert<T: Serialize>(&mut self, key: &'static str, value: &T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.0.insert(key, v);
        }
    }

    /// Retrieve and deserialize a value stored under `key`
    #[must_use]
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.0.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Whether any entry is stored under `key`
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

/// Sampling parameters shared across chat and rerank requests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Sampling temperature (0.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequences>,
    /// Frequency penalty (-2.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    /// Presence penalty (-2.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Random seed for deterministic generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Internal canonical request, spanning chat/image/embedding/rerank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Which wire shape this request carries
    pub kind: RequestKind,
    /// Model identifier
    pub model: String,
    /// Conversation messages (populated for `Chat`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    /// Image-generation payload (populated for `Image`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRequest>,
    /// Embedding input (populated for `Embedding`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_input: Option<EmbeddingInput>,
    /// Rerank payload (populated for `Rerank`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank: Option<RerankRequest>,
    /// Sampling parameters
    #[serde(default)]
    pub params: CompletionParams,
    /// Tool definitions available to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// How the model should select tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Requested output format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// Requested output modalities, e.g. `["image", "text"]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,
    /// Reasoning-effort hint (`"low"`/`"medium"`/`"high"`, provider-defined)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    /// Bounded string-to-string metadata bag, forwarded opaquely by most
    /// providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
    /// Whether the response should be streamed
    #[serde(default)]
    pub stream: bool,
    /// Streaming delivery options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,

    /// The original client-submitted body, kept for audit; never sent
    /// upstream and never serialized back out
    #[serde(skip)]
    pub raw_request: Option<serde_json::Value>,
    /// The wire format the client submitted in, e.g. `"openai"`
    #[serde(skip)]
    pub raw_api_format: Option<String>,
    /// Transformer-private scratch data; never serialized
    #[serde(skip)]
    pub transformer_metadata: TransformerMetadata,
    /// Provider-specific reasoning token budget, set by middleware
    #[serde(skip)]
    pub reasoning_budget: Option<u32>,
}

impl Request {
    /// Build a minimal chat request
    #[must_use]
    pub fn chat(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            kind: RequestKind::Chat,
            model: model.into(),
            messages,
            image: None,
            embedding_input: None,
            rerank: None,
            params: CompletionParams::default(),
            tools: None,
            tool_choice: None,
            response_format: None,
            modalities: None,
            reasoning_effort: None,
            metadata: None,
            stream: false,
            stream_options: None,
            raw_request: None,
            raw_api_format: None,
            transformer_metadata: TransformerMetadata::default(),
            reasoning_budget: None,
        }
    }

    /// Validate the mandatory-field invariants required of
    /// `Outbound::transform_request`: `model` non-empty, `messages`
    /// non-empty for chat requests
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.model.is_empty() {
            return Err("model is required");
        }
        if self.kind == RequestKind::Chat && self.messages.is_empty() {
            return Err("messages is required for chat requests");
        }
        Ok(())
    }

    /// Whether the client asked for image output either explicitly
    /// (`kind == Image`) or via `modalities ⊇ {"image"}`
    #[must_use]
    pub fn wants_image_output(&self) -> bool {
        self.kind == RequestKind::Image || self.modalities.as_ref().is_some_and(|m| m.iter().any(|x| x == "image"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_model() {
        let req = Request::chat("", vec![]);
        assert_eq!(req.validate(), Err("model is required"));
    }

    #[test]
    fn validate_rejects_empty_chat_messages() {
        let req = Request::chat("gpt-4o", vec![]);
        assert_eq!(req.validate(), Err("messages is required for chat requests"));
    }

    #[test]
    fn transformer_metadata_round_trips_typed_values() {
        let mut meta = TransformerMetadata::default();
        meta.insert("doubao_request_id", &"req_123".to_owned());
        assert_eq!(meta.get::<String>("doubao_request_id").as_deref(), Some("req_123"));
        assert!(meta.contains("doubao_request_id"));
        assert!(!meta.contains("missing"));
    }

    #[test]
    fn request_is_never_serialized_with_internal_fields() {
        let mut req = Request::chat("gpt-4o", vec![]);
        req.raw_request = Some(serde_json::json!({"leak": true}));
        req.transformer_metadata.insert("secret", &"value".to_owned());
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("raw_request").is_none());
        assert!(json.get("transformer_metadata").is_none());
    }
}
