//! Conversion between the unified model and `OpenAI` chat completion wire format

use portal_core::model::{
    Choice, ChoiceMessage, CompletionParams, Content, ContentPart, FinishReason, FunctionCall, FunctionDefinition,
    Message, Request, Response, Role, StopSequences, StreamDelta, StreamFunctionCall, StreamToolCall, ToolCall,
    ToolChoice, ToolChoiceFunction, ToolChoiceMode, ToolDefinition, Usage,
};

use crate::protocol::openai::{
    OpenAiChoice, OpenAiChoiceMessage, OpenAiContent, OpenAiContentPart, OpenAiFunction, OpenAiFunctionCall,
    OpenAiImageUrl, OpenAiMessage, OpenAiRequest, OpenAiResponse, OpenAiStreamChoice, OpenAiStreamChunk,
    OpenAiStreamDelta, OpenAiStreamFunctionCall, OpenAiStreamToolCall, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};

// -- Inbound: OpenAI wire format -> unified model --

impl From<OpenAiRequest> for Request {
    fn from(req: OpenAiRequest) -> Self {
        let mut unified = Self::chat(req.model, req.messages.into_iter().map(Into::into).collect());
        unified.params = CompletionParams {
            temperature: req.temperature,
            top_p: req.top_p,
            max_tokens: req.max_tokens,
            stop: req.stop.map(StopSequences::Many),
            frequency_penalty: req.frequency_penalty,
            presence_penalty: req.presence_penalty,
            seed: req.seed,
        };
        unified.tools = req.tools.map(|tools| tools.into_iter().map(Into::into).collect());
        unified.tool_choice = req.tool_choice.and_then(|v| parse_openai_tool_choice(&v));
        unified.stream = req.stream.unwrap_or(false);
        unified.raw_api_format = Some("openai".to_owned());
        unified
    }
}

impl From<OpenAiMessage> for Message {
    fn from(msg: OpenAiMessage) -> Self {
        let role = match msg.role.as_str() {
            "system" => Role::System,
            "developer" => Role::Developer,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            _ => Role::User,
        };

        let content = match msg.content {
            Some(OpenAiContent::Text(text)) => Content::Text(text),
            Some(OpenAiContent::Parts(parts)) => Content::Parts(parts.into_iter().map(Into::into).collect()),
            None => Content::Text(String::new()),
        };

        let tool_calls = msg.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|tc| ToolCall {
                    id: tc.id,
                    function: FunctionCall {
                        name: tc.function.name,
                        arguments: tc.function.arguments,
                    },
                })
                .collect()
        });

        Self {
            role,
            content,
            name: msg.name,
            tool_calls,
            tool_call_id: msg.tool_call_id,
        }
    }
}

impl From<OpenAiContentPart> for ContentPart {
    fn from(part: OpenAiContentPart) -> Self {
        match part {
            OpenAiContentPart::Text { text } => Self::Text { text },
            OpenAiContentPart::ImageUrl { image_url } => Self::Image {
                url: image_url.url,
                detail: image_url.detail,
            },
        }
    }
}

impl From<OpenAiTool> for ToolDefinition {
    fn from(tool: OpenAiTool) -> Self {
        Self {
            tool_type: tool.tool_type,
            function: FunctionDefinition {
                name: tool.function.name,
                description: tool.function.description,
                parameters: tool.function.parameters,
            },
        }
    }
}

/// Parse `OpenAI`'s flexible `tool_choice` field into the unified type
fn parse_openai_tool_choice(value: &serde_json::Value) -> Option<ToolChoice> {
    match value {
        serde_json::Value::String(s) => match s.as_str() {
            "none" => Some(ToolChoice::Mode(ToolChoiceMode::None)),
            "auto" => Some(ToolChoice::Mode(ToolChoiceMode::Auto)),
            "required" => Some(ToolChoice::Mode(ToolChoiceMode::Required)),
            _ => None,
        },
        serde_json::Value::Object(_) => serde_json::from_value::<ToolChoiceFunction>(value.clone())
            .ok()
            .map(ToolChoice::Function),
        _ => None,
    }
}

// -- Outbound response: unified model -> OpenAI wire format --

impl From<&Response> for OpenAiResponse {
    fn from(resp: &Response) -> Self {
        Self {
            id: resp.id.clone(),
            object: resp.object.clone(),
            created: resp.created,
            model: resp.model.clone(),
            choices: resp.choices.iter().map(Into::into).collect(),
            usage: resp.usage.clone().map(Into::into),
        }
    }
}

impl From<&Choice> for OpenAiChoice {
    fn from(choice: &Choice) -> Self {
        let message = choice.message.clone().unwrap_or_else(|| ChoiceMessage::text(String::new()));
        let finish_reason = choice.finish_reason.map(finish_reason_to_openai);

        Self {
            index: choice.index,
            message: OpenAiChoiceMessage {
                role: message.role,
                content: message.content,
                tool_calls: message.tool_calls.map(|calls| calls.into_iter().map(tool_call_to_openai).collect()),
            },
            finish_reason,
        }
    }
}

impl From<Usage> for OpenAiUsage {
    fn from(usage: Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

fn tool_call_to_openai(tc: ToolCall) -> OpenAiToolCall {
    OpenAiToolCall {
        id: tc.id,
        tool_type: "function".to_owned(),
        function: OpenAiFunctionCall {
            name: tc.function.name,
            arguments: tc.function.arguments,
        },
    }
}

fn finish_reason_to_openai(fr: FinishReason) -> String {
    match fr {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
        FinishReason::ToolCalls => "tool_calls",
        FinishReason::ContentFilter => "content_filter",
    }
    .to_owned()
}

// -- Outbound request: unified model -> OpenAI wire request (for sending upstream) --

impl From<&Request> for OpenAiRequest {
    fn from(req: &Request) -> Self {
        Self {
            model: req.model.clone(),
            messages: req.messages.iter().map(Into::into).collect(),
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            max_tokens: req.params.max_tokens,
            stop: req.params.stop.as_ref().map(|s| s.as_slice().to_vec()),
            frequency_penalty: req.params.frequency_penalty,
            presence_penalty: req.params.presence_penalty,
            seed: req.params.seed,
            stream: if req.stream { Some(true) } else { None },
            tools: req.tools.as_ref().map(|tools| {
                tools
                    .iter()
                    .map(|t| OpenAiTool {
                        tool_type: t.tool_type.clone(),
                        function: OpenAiFunction {
                            name: t.function.name.clone(),
                            description: t.function.description.clone(),
                            parameters: t.function.parameters.clone(),
                        },
                    })
                    .collect()
            }),
            tool_choice: req.tool_choice.as_ref().map(tool_choice_to_openai_value),
            stream_options: if req.stream {
                Some(crate::protocol::openai::OpenAiStreamOptions { include_usage: true })
            } else {
                None
            },
            modalities: None,
        }
    }
}

/// Build the single user message an `OpenAI`-compatible multimodal chat
/// endpoint expects for image generation: reference images first (as
/// base64 data URLs with a sniffed MIME type), then the text prompt
#[must_use]
pub fn image_request_to_openai_message(image: &portal_core::model::ImageRequest) -> OpenAiMessage {
    let mut parts: Vec<OpenAiContentPart> = image
        .images
        .iter()
        .map(|bytes| {
            let mime = crate::image::detect_mime_type(bytes);
            OpenAiContentPart::ImageUrl {
                image_url: OpenAiImageUrl {
                    url: crate::image::image_bytes_to_data_url(bytes, mime),
                    detail: None,
                },
            }
        })
        .collect();
    parts.push(OpenAiContentPart::Text { text: image.prompt.clone() });

    OpenAiMessage {
        role: "user".to_owned(),
        content: Some(OpenAiContent::Parts(parts)),
        name: None,
        tool_calls: None,
        tool_call_id: None,
    }
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::Developer => "developer",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let content = match &msg.content {
            Content::Text(text) => Some(OpenAiContent::Text(text.clone())),
            Content::Parts(parts) => Some(OpenAiContent::Parts(parts.iter().map(Into::into).collect())),
        };

        let tool_calls = msg.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|tc| OpenAiToolCall {
                    id: tc.id.clone(),
                    tool_type: "function".to_owned(),
                    function: OpenAiFunctionCall {
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    },
                })
                .collect()
        });

        Self {
            role: role.to_owned(),
            content,
            name: msg.name.clone(),
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

impl From<&ContentPart> for OpenAiContentPart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text { text } => Self::Text { text: text.clone() },
            ContentPart::Image { url, detail } => Self::ImageUrl {
                image_url: OpenAiImageUrl {
                    url: url.clone(),
                    detail: detail.clone(),
                },
            },
        }
    }
}

/// Convert a unified tool choice to an `OpenAI` JSON value
fn tool_choice_to_openai_value(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Mode(mode) => {
            let s = match mode {
                ToolChoiceMode::None => "none",
                ToolChoiceMode::Auto => "auto",
                ToolChoiceMode::Required => "required",
            };
            serde_json::Value::String(s.to_owned())
        }
        ToolChoice::Function(func) => {
            serde_json::json!({
                "type": func.tool_type,
                "function": {
                    "name": func.function.name
                }
            })
        }
    }
}

// -- Stream conversion --

/// Convert an `OpenAI` stream chunk into a unified response chunk
pub fn openai_chunk_to_response(chunk: &OpenAiStreamChunk) -> Response {
    let choices = chunk
        .choices
        .iter()
        .map(|c| Choice {
            index: c.index,
            message: None,
            delta: Some(openai_stream_choice_to_delta(c)),
            finish_reason: c.finish_reason.as_deref().and_then(parse_finish_reason),
            logprobs: None,
        })
        .collect();

    Response {
        id: chunk.id.clone(),
        object: chunk.object.clone(),
        created: chunk.created,
        model: chunk.model.clone(),
        choices,
        usage: chunk.usage.clone().map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            prompt_tokens_details: None,
            completion_tokens_details: None,
        }),
        service_tier: None,
        system_fingerprint: None,
        error: None,
        provider_data: None,
        transformer_metadata: portal_core::model::TransformerMetadata::default(),
    }
}

fn openai_stream_choice_to_delta(choice: &OpenAiStreamChoice) -> StreamDelta {
    let tool_calls = choice.delta.tool_calls.as_ref().map(|calls| {
        calls
            .iter()
            .map(|tc| StreamToolCall {
                index: tc.index,
                id: tc.id.clone(),
                function: tc.function.as_ref().map(|f| StreamFunctionCall {
                    name: f.name.clone(),
                    arguments: f.arguments.clone(),
                }),
            })
            .collect()
    });

    StreamDelta {
        content: choice.delta.content.clone(),
        role: choice.delta.role.clone(),
        tool_calls,
    }
}

/// Convert a unified response chunk to an `OpenAI` stream chunk
pub fn response_to_openai_chunk(response: &Response) -> OpenAiStreamChunk {
    OpenAiStreamChunk {
        id: response.id.clone(),
        object: "chat.completion.chunk".to_owned(),
        created: response.created,
        model: response.model.clone(),
        choices: response
            .choices
            .iter()
            .map(|choice| {
                let delta = choice.delta.clone().unwrap_or_default();
                OpenAiStreamChoice {
                    index: choice.index,
                    delta: OpenAiStreamDelta {
                        role: delta.role,
                        content: delta.content,
                        tool_calls: delta.tool_calls.map(|calls| {
                            calls
                                .into_iter()
                                .map(|tc| OpenAiStreamToolCall {
                                    index: tc.index,
                                    id: tc.id.clone(),
                                    tool_type: tc.id.as_ref().map(|_| "function".to_owned()),
                                    function: tc.function.map(|f| OpenAiStreamFunctionCall {
                                        name: f.name,
                                        arguments: f.arguments,
                                    }),
                                })
                                .collect()
                        }),
                    },
                    finish_reason: choice.finish_reason.map(finish_reason_to_openai),
                }
            })
            .collect(),
        usage: response.usage.clone().map(Into::into),
    }
}

/// Parse an `OpenAI` chat completion response into the unified model
impl From<OpenAiResponse> for Response {
    fn from(resp: OpenAiResponse) -> Self {
        let choices = resp
            .choices
            .into_iter()
            .map(|c| {
                let finish_reason = c.finish_reason.as_deref().and_then(parse_finish_reason);
                let tool_calls = c.message.tool_calls.map(|calls| {
                    calls
                        .into_iter()
                        .map(|tc| ToolCall {
                            id: tc.id,
                            function: FunctionCall {
                                name: tc.function.name,
                                arguments: tc.function.arguments,
                            },
                        })
                        .collect()
                });

                Choice {
                    index: c.index,
                    message: Some(ChoiceMessage {
                        role: c.message.role,
                        content: c.message.content,
                        tool_calls,
                    }),
                    delta: None,
                    finish_reason,
                    logprobs: None,
                }
            })
            .collect();

        Self {
            id: resp.id,
            object: resp.object,
            created: resp.created,
            model: resp.model,
            choices,
            usage: resp.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
                prompt_tokens_details: None,
                completion_tokens_details: None,
            }),
            service_tier: None,
            system_fingerprint: None,
            error: None,
            provider_data: None,
            transformer_metadata: portal_core::model::TransformerMetadata::default(),
        }
    }
}

/// Parse a finish reason string shared across `OpenAI`-family and
/// Anthropic-family wire formats
pub fn parse_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "stop" | "end_turn" => Some(FinishReason::Stop),
        "length" | "max_tokens" => Some(FinishReason::Length),
        "tool_calls" | "tool_use" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}
