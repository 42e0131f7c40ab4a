use serde::{Deserialize, Serialize};

use super::message::FunctionCall;
use super::response::{FinishReason, Response};

/// One wire-level server-sent event: `{ last_event_id, type, data }`
///
/// The carrier for a lazy, finite, non-restartable stream between the
/// HTTP executor and a transformer's `transform_stream`. A sentinel
/// `[DONE]` event (provider-native shape) marks completion.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    /// SSE `id:` field, if present
    pub last_event_id: Option<String>,
    /// SSE `event:` field, or `"message"` when absent
    pub event_type: String,
    /// Raw event payload bytes (the SSE `data:` field, concatenated across
    /// multi-line data fields)
    pub data: Vec<u8>,
}

impl StreamEvent {
    /// Whether this event is the provider's `[DONE]` sentinel
    #[must_use]
    pub fn is_done_sentinel(&self) -> bool {
        self.data.as_slice() == b"[DONE]"
    }
}

/// Incremental update within a streaming response choice
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamDelta {
    /// Incremental text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Role, present only on the first delta of a choice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Incremental tool call data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<StreamToolCall>>,
}

/// Partial tool call data within a stream delta
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamToolCall {
    /// Index of this tool call in the `tool_calls` array
    pub index: u32,
    /// Tool call ID (present on first chunk only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Partial function call data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<StreamFunctionCall>,
}

/// Partial function call data within a streaming tool call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamFunctionCall {
    /// Function name (present on first chunk only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Incremental arguments JSON fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl StreamFunctionCall {
    /// Convert to a complete `FunctionCall` if both name and arguments are
    /// present
    #[must_use]
    pub fn into_function_call(self) -> Option<FunctionCall> {
        match (self.name, self.arguments) {
            (Some(name), Some(arguments)) => Some(FunctionCall { name, arguments }),
            _ => None,
        }
    }
}

/// One item of the decoded, unified stream: `Outbound::transform_stream`
/// yields these from raw `StreamEvent`s, and `Inbound::transform_stream`
/// consumes them to re-encode into the client's wire format.
#[derive(Debug, Clone)]
pub enum ResponseStreamItem {
    /// A response chunk with `delta`-populated choices
    Chunk(Response),
    /// The stream has ended; no further chunks follow
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_sentinel_is_recognized_by_data() {
        let event = StreamEvent {
            last_event_id: None,
            event_type: "message".to_owned(),
            data: b"[DONE]".to_vec(),
        };
        assert!(event.is_done_sentinel());
    }

    #[test]
    fn partial_function_call_requires_both_fields() {
        let partial = StreamFunctionCall {
            name: Some("lookup".to_owned()),
            arguments: None,
        };
        assert!(partial.into_function_call().is_none());

        let complete = StreamFunctionCall {
            name: Some("lookup".to_owned()),
            arguments: Some("{}".to_owned()),
        };
        assert!(complete.into_function_call().is_some());
    }
}
