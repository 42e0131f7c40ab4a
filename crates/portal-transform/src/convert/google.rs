//! Conversion between the unified model and Google Generative Language wire format

use portal_core::model::{
    Choice, ChoiceMessage, Content, ContentPart, FinishReason, FunctionCall, Message, Response, ResponseStreamItem,
    Role, StreamDelta, StreamFunctionCall, StreamToolCall, ToolCall, ToolChoice, ToolChoiceMode, Usage,
};

use crate::protocol::google::{
    GoogleCandidate, GoogleContent, GoogleFunctionCall, GoogleFunctionCallingConfig, GoogleFunctionDeclaration,
    GoogleFunctionResponse, GoogleGenerationConfig, GoogleInlineData, GooglePart, GoogleRequest, GoogleResponse,
    GoogleTool, GoogleToolConfig,
};

// -- Outbound: unified model -> Google wire request --

impl From<&portal_core::model::Request> for GoogleRequest {
    fn from(req: &portal_core::model::Request) -> Self {
        let mut system_instruction = None;
        let mut contents = Vec::new();

        for msg in &req.messages {
            match msg.role {
                Role::System | Role::Developer => {
                    system_instruction = Some(GoogleContent {
                        role: None,
                        parts: vec![GooglePart::Text(msg.content.as_text())],
                    });
                }
                Role::User => contents.push(internal_message_to_google(msg, "user")),
                Role::Assistant => contents.push(internal_message_to_google(msg, "model")),
                Role::Tool => {
                    if let Some(tool_call_id) = &msg.tool_call_id {
                        let response_value = serde_json::from_str(&msg.content.as_text())
                            .unwrap_or_else(|_| serde_json::json!({"result": msg.content.as_text()}));
                        contents.push(GoogleContent {
                            role: Some("function".to_owned()),
                            parts: vec![GooglePart::FunctionResponse(GoogleFunctionResponse {
                                name: tool_call_id.clone(),
                                response: response_value,
                            })],
                        });
                    }
                }
            }
        }

        let generation_config = Some(GoogleGenerationConfig {
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            top_k: None,
            max_output_tokens: req.params.max_tokens,
            stop_sequences: req.params.stop.as_ref().map(|s| s.as_slice().to_vec()),
            candidate_count: None,
        });

        let tools = req.tools.as_ref().map(|tools| {
            vec![GoogleTool {
                function_declarations: tools
                    .iter()
                    .map(|t| GoogleFunctionDeclaration {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone(),
                    })
                    .collect(),
            }]
        });

        let tool_config = req.tool_choice.as_ref().map(|tc| {
            let (mode, allowed_names) = match tc {
                ToolChoice::Mode(ToolChoiceMode::None) => ("NONE".to_owned(), None),
                ToolChoice::Mode(ToolChoiceMode::Auto) => ("AUTO".to_owned(), None),
                ToolChoice::Mode(ToolChoiceMode::Required) => ("ANY".to_owned(), None),
                ToolChoice::Function(func) => ("ANY".to_owned(), Some(vec![func.function.name.clone()])),
            };
            GoogleToolConfig {
                function_calling_config: GoogleFunctionCallingConfig {
                    mode,
                    allowed_function_names: allowed_names,
                },
            }
        });

        Self {
            contents,
            system_instruction,
            generation_config,
            tools,
            tool_config,
        }
    }
}

fn internal_message_to_google(msg: &Message, role: &str) -> GoogleContent {
    let mut parts = Vec::new();

    match &msg.content {
        Content::Text(text) => {
            if !text.is_empty() {
                parts.push(GooglePart::Text(text.clone()));
            }
        }
        Content::Parts(content_parts) => {
            for part in content_parts {
                match part {
                    ContentPart::Text { text } => parts.push(GooglePart::Text(text.clone())),
                    ContentPart::Image { url, .. } => {
                        if let Some(rest) = url.strip_prefix("data:")
                            && let Some((mime_and_encoding, data)) = rest.split_once(',')
                        {
                            let mime_type = mime_and_encoding.strip_suffix(";base64").unwrap_or(mime_and_encoding);
                            parts.push(GooglePart::InlineData(GoogleInlineData {
                                mime_type: mime_type.to_owned(),
                                data: data.to_owned(),
                            }));
                        }
                    }
                }
            }
        }
    }

    if let Some(tool_calls) = &msg.tool_calls {
        for tc in tool_calls {
            let args = serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| serde_json::json!({}));
            parts.push(GooglePart::FunctionCall(GoogleFunctionCall {
                name: tc.function.name.clone(),
                args,
            }));
        }
    }

    if parts.is_empty() {
        parts.push(GooglePart::Text(String::new()));
    }

    GoogleContent {
        role: Some(role.to_owned()),
        parts,
    }
}

fn parse_google_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "STOP" => Some(FinishReason::Stop),
        "MAX_TOKENS" => Some(FinishReason::Length),
        "SAFETY" | "RECITATION" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

// -- Inbound: Google wire response -> unified model --

impl From<GoogleResponse> for Response {
    fn from(resp: GoogleResponse) -> Self {
        let now = now_unix();

        #[allow(clippy::cast_possible_truncation)]
        let choices = resp
            .candidates
            .into_iter()
            .enumerate()
            .map(|(i, candidate)| google_candidate_to_choice(&candidate, i as u32))
            .collect();

        let usage = resp.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
            prompt_tokens_details: None,
            completion_tokens_details: None,
        });

        Self {
            id: format!("google-{now}"),
            object: "chat.completion".to_owned(),
            created: now,
            model: String::new(),
            choices,
            usage,
            service_tier: None,
            system_fingerprint: None,
            error: None,
            provider_data: None,
            transformer_metadata: portal_core::model::TransformerMetadata::default(),
        }
    }
}

fn google_candidate_to_choice(candidate: &GoogleCandidate, default_index: u32) -> Choice {
    let index = candidate.index.unwrap_or(default_index);

    let mut text_content = String::new();
    let mut tool_calls = Vec::new();

    for part in &candidate.content.parts {
        match part {
            GooglePart::Text(text) => text_content.push_str(text.as_str()),
            GooglePart::FunctionCall(fc) => {
                let arguments = serde_json::to_string(&fc.args).unwrap_or_else(|_| "{}".to_owned());
                tool_calls.push(ToolCall {
                    id: format!("call_{}", fc.name),
                    function: FunctionCall {
                        name: fc.name.clone(),
                        arguments,
                    },
                });
            }
            GooglePart::InlineData(_) | GooglePart::FunctionResponse(_) => {}
        }
    }

    let finish_reason = candidate.finish_reason.as_deref().and_then(parse_google_finish_reason);

    let message = if tool_calls.is_empty() {
        ChoiceMessage {
            role: "assistant".to_owned(),
            content: Some(text_content),
            tool_calls: None,
        }
    } else {
        ChoiceMessage {
            role: "assistant".to_owned(),
            content: if text_content.is_empty() { None } else { Some(text_content) },
            tool_calls: Some(tool_calls),
        }
    };

    Choice {
        index,
        message: Some(message),
        delta: None,
        finish_reason,
        logprobs: None,
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// -- Inbound response: unified model -> Google wire response --
//
// Used when Google's `generateContent` shape is the client-facing format
// rather than the upstream one: the unified response still needs to be
// re-expressed in Google's candidate/part shape for the client.

impl From<&Response> for GoogleResponse {
    fn from(resp: &Response) -> Self {
        let candidates = resp.choices.iter().map(choice_to_google_candidate).collect();
        let usage_metadata = resp.usage.as_ref().map(|u| GoogleUsageMetadata {
            prompt_token_count: u.prompt_tokens,
            candidates_token_count: u.completion_tokens,
            total_token_count: u.total_tokens,
        });

        Self {
            candidates,
            usage_metadata,
        }
    }
}

fn choice_to_google_candidate(choice: &Choice) -> GoogleCandidate {
    let mut parts = Vec::new();

    if let Some(message) = &choice.message {
        if let Some(text) = &message.content
            && !text.is_empty()
        {
            parts.push(GooglePart::Text(text.clone()));
        }
        if let Some(tool_calls) = &message.tool_calls {
            for tc in tool_calls {
                let args = serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| serde_json::json!({}));
                parts.push(GooglePart::FunctionCall(GoogleFunctionCall {
                    name: tc.function.name.clone(),
                    args,
                }));
            }
        }
    }
    if let Some(delta) = &choice.delta {
        if let Some(text) = &delta.content
            && !text.is_empty()
        {
            parts.push(GooglePart::Text(text.clone()));
        }
        if let Some(tool_calls) = &delta.tool_calls {
            for tc in tool_calls {
                if let Some(func) = &tc.function {
                    let args = func
                        .arguments
                        .as_deref()
                        .and_then(|a| serde_json::from_str(a).ok())
                        .unwrap_or_else(|| serde_json::json!({}));
                    parts.push(GooglePart::FunctionCall(GoogleFunctionCall {
                        name: func.name.clone().unwrap_or_default(),
                        args,
                    }));
                }
            }
        }
    }
    if parts.is_empty() {
        parts.push(GooglePart::Text(String::new()));
    }

    GoogleCandidate {
        content: GoogleContent {
            role: Some("model".to_owned()),
            parts,
        },
        finish_reason: choice.finish_reason.map(finish_reason_to_google),
        index: Some(choice.index),
    }
}

fn finish_reason_to_google(fr: FinishReason) -> String {
    match fr {
        FinishReason::Stop | FinishReason::ToolCalls => "STOP",
        FinishReason::Length => "MAX_TOKENS",
        FinishReason::ContentFilter => "SAFETY",
    }
    .to_owned()
}

/// Re-encode a unified stream item as a Google wire chunk
///
/// Google's SSE stream has no `[DONE]` sentinel, so `ResponseStreamItem::Done`
/// has no wire representation and encodes to `None`.
#[must_use]
pub fn response_stream_item_to_google_chunk(item: &ResponseStreamItem) -> Option<GoogleResponse> {
    match item {
        ResponseStreamItem::Chunk(response) => Some(GoogleResponse::from(response)),
        ResponseStreamItem::Done => None,
    }
}

// -- Stream conversion: Google wire chunk -> unified stream items --

/// Google streams complete `GoogleResponse` objects rather than incremental
/// deltas; each chunk is re-expressed as a single unified response chunk
/// plus a trailing `Done` once the chunk's sole candidate reports a finish
/// reason.
pub fn google_chunk_to_stream_items(chunk: GoogleResponse, response_id: &str, model: &str) -> Vec<ResponseStreamItem> {
    let now = now_unix();
    let mut saw_finish = false;

    #[allow(clippy::cast_possible_truncation)]
    let choices: Vec<Choice> = chunk
        .candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| {
            let index = candidate.index.unwrap_or(i as u32);
            let mut content = String::new();
            let mut tool_calls = Vec::new();

            for part in &candidate.content.parts {
                match part {
                    GooglePart::Text(text) => content.push_str(text),
                    GooglePart::FunctionCall(fc) => {
                        let arguments = serde_json::to_string(&fc.args).unwrap_or_else(|_| "{}".to_owned());
                        tool_calls.push(StreamToolCall {
                            index: 0,
                            id: Some(format!("call_{}", fc.name)),
                            function: Some(StreamFunctionCall {
                                name: Some(fc.name.clone()),
                                arguments: Some(arguments),
                            }),
                        });
                    }
                    GooglePart::InlineData(_) | GooglePart::FunctionResponse(_) => {}
                }
            }

            let finish_reason = candidate.finish_reason.as_deref().and_then(parse_google_finish_reason);
            saw_finish |= finish_reason.is_some();

            Choice {
                index,
                message: None,
                delta: Some(StreamDelta {
                    content: if content.is_empty() { None } else { Some(content) },
                    role: None,
                    tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                }),
                finish_reason,
                logprobs: None,
            }
        })
        .collect();

    let usage = chunk.usage_metadata.map(|u| Usage {
        prompt_tokens: u.prompt_token_count,
        completion_tokens: u.candidates_token_count,
        total_tokens: u.total_token_count,
        prompt_tokens_details: None,
        completion_tokens_details: None,
    });

    let response = Response {
        id: response_id.to_owned(),
        object: "chat.completion.chunk".to_owned(),
        created: now,
        model: model.to_owned(),
        choices,
        usage,
        service_tier: None,
        system_fingerprint: None,
        error: None,
        provider_data: None,
        transformer_metadata: portal_core::model::TransformerMetadata::default(),
    };

    let mut items = vec![ResponseStreamItem::Chunk(response)];
    if saw_finish {
        items.push(ResponseStreamItem::Done);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_ends_the_stream() {
        let chunk = GoogleResponse {
            candidates: vec![GoogleCandidate {
                content: GoogleContent {
                    role: Some("model".to_owned()),
                    parts: vec![GooglePart::Text("hi".to_owned())],
                },
                finish_reason: Some("STOP".to_owned()),
                index: Some(0),
            }],
            usage_metadata: None,
        };
        let items = google_chunk_to_stream_items(chunk, "resp_1", "gemini-pro");
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], ResponseStreamItem::Done));
    }

    #[test]
    fn function_call_becomes_tool_call_with_synthetic_id() {
        let candidate = GoogleCandidate {
            content: GoogleContent {
                role: Some("model".to_owned()),
                parts: vec![GooglePart::FunctionCall(GoogleFunctionCall {
                    name: "lookup".to_owned(),
                    args: serde_json::json!({"q": "rust"}),
                })],
            },
            finish_reason: None,
            index: Some(0),
        };
        let choice = google_candidate_to_choice(&candidate, 0);
        let message = choice.message.unwrap();
        assert_eq!(message.tool_calls.unwrap()[0].id, "call_lookup");
    }
}
