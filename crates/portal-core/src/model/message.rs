use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// A non-system instruction channel some providers distinguish from
    /// `System` (normalized to `System` by outbounds that don't support it)
    Developer,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool/function result
    Tool,
}

/// Message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Message content
    pub content: Content,
    /// Optional participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message is a response to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Message content, either plain text or structured parts
///
/// Serialization always collapses a single text part down to a bare JSON
/// string: providers rely on this shape, and several reject an array for
/// plain text. Deserialization accepts both a bare string and an array.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Plain text content
    Text(String),
    /// Array of content parts (text, images, etc.)
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Extract text content, joining parts if necessary
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Whether this content is logically equivalent to `other`, ignoring
    /// whether it was represented as `Text` or a single-element `Parts`
    #[must_use]
    pub fn logically_eq(&self, other: &Self) -> bool {
        match (self.as_single_text(), other.as_single_text()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    fn as_single_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t.as_str()),
            Self::Parts(parts) => match parts.as_slice() {
                [ContentPart::Text { text }] => Some(text.as_str()),
                _ => None,
            },
        }
    }
}

impl Serialize for Content {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => serializer.serialize_str(text),
            Self::Parts(parts) => match parts.as_slice() {
                [ContentPart::Text { text }] => serializer.serialize_str(text),
                _ => parts.serialize(serializer),
            },
        }
    }
}

struct ContentVisitor;

impl<'de> Visitor<'de> for ContentVisitor {
    type Value = Content;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a string or an array of content parts")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Content::Text(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(Content::Text(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut parts = Vec::new();
        while let Some(part) = seq.next_element::<ContentPart>()? {
            parts.push(part);
        }
        Ok(Content::Parts(parts))
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ContentVisitor)
    }
}

/// Individual part within a multipart message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content block
    Text {
        /// The text string
        text: String,
    },
    /// Image reference
    Image {
        /// URL or base64 data URI for the image
        url: String,
        /// Detail level hint (e.g. "auto", "low", "high")
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

/// A tool/function call requested by the assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the function to call
    pub function: FunctionCall,
}

/// Function name and arguments within a tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

/// Result of a tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the tool call this result responds to
    pub tool_call_id: String,
    /// Output content from the tool
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_round_trips_as_text() {
        let content = Content::Text("hi".to_owned());
        let json = serde_json::to_string(&content).unwrap();
        assert_eq!(json, "\"hi\"");
        let decoded: Content = serde_json::from_str(&json).unwrap();
        assert!(decoded.logically_eq(&content));
    }

    #[test]
    fn single_text_part_array_collapses_to_bare_string_on_encode() {
        let content = Content::Parts(vec![ContentPart::Text { text: "hi".to_owned() }]);
        let json = serde_json::to_string(&content).unwrap();
        assert_eq!(json, "\"hi\"", "single text part must serialize as a bare string");
        let decoded: Content = serde_json::from_str(&json).unwrap();
        assert!(decoded.logically_eq(&content));
        assert_eq!(decoded.as_text(), "hi");
    }

    #[test]
    fn multi_part_array_serializes_as_array() {
        let content = Content::Parts(vec![
            ContentPart::Text { text: "hi".to_owned() },
            ContentPart::Image {
                url: "https://example.com/a.png".to_owned(),
                detail: None,
            },
        ]);
        let json = serde_json::to_value(&content).unwrap();
        assert!(json.is_array());
    }

    #[test]
    fn array_decodes_back_into_parts() {
        let json = r#"[{"type":"text","text":"hi"}]"#;
        let decoded: Content = serde_json::from_str(json).unwrap();
        assert_eq!(decoded.as_text(), "hi");
    }
}
