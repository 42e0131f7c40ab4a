//! Conversion between the unified model and Anthropic Messages wire format

use portal_core::model::{
    Choice, ChoiceMessage, CompletionParams, Content, ContentPart, FinishReason, FunctionCall, FunctionDefinition,
    Message, Request, Response, ResponseStreamItem, Role, StopSequences, StreamDelta, StreamFunctionCall,
    StreamToolCall, ToolCall, ToolChoice, ToolChoiceFunction, ToolChoiceFunctionName, ToolChoiceMode, ToolDefinition,
    Usage,
};

use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicMessageDelta,
    AnthropicRequest, AnthropicResponse, AnthropicResponseBlock, AnthropicStreamContentBlock, AnthropicStreamDelta,
    AnthropicStreamEvent, AnthropicTool, AnthropicToolChoice, AnthropicUsage,
};

/// Default max tokens when not specified (Anthropic requires this field)
const DEFAULT_MAX_TOKENS: u32 = 4096;

// -- Inbound: Anthropic wire format -> unified model --

impl From<AnthropicRequest> for Request {
    fn from(req: AnthropicRequest) -> Self {
        let mut messages: Vec<Message> = Vec::new();

        if let Some(system) = req.system {
            messages.push(Message {
                role: Role::System,
                content: Content::Text(system),
                name: None,
                tool_calls: None,
                tool_call_id: None,
            });
        }

        messages.extend(req.messages.into_iter().map(anthropic_message_to_internal));

        let mut unified = Self::chat(req.model, messages);
        unified.params = CompletionParams {
            temperature: req.temperature,
            top_p: req.top_p,
            max_tokens: Some(req.max_tokens),
            stop: req.stop_sequences.map(StopSequences::Many),
            frequency_penalty: None,
            presence_penalty: None,
            seed: None,
        };
        unified.tools = req.tools.map(|tools| tools.into_iter().map(Into::into).collect());
        unified.tool_choice = req.tool_choice.map(|tc| anthropic_tool_choice_to_internal(&tc));
        unified.stream = req.stream.unwrap_or(false);
        unified.raw_api_format = Some("anthropic".to_owned());
        unified
    }
}

/// Convert a single Anthropic message to the unified model
fn anthropic_message_to_internal(msg: AnthropicMessage) -> Message {
    let role = match msg.role.as_str() {
        "assistant" => Role::Assistant,
        _ => Role::User,
    };

    match msg.content {
        AnthropicContent::Text(text) => Message {
            role,
            content: Content::Text(text),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        },
        AnthropicContent::Blocks(blocks) => {
            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();
            let mut tool_call_id = None;
            let mut tool_result_content = None;

            for block in blocks {
                match block {
                    AnthropicContentBlock::Text { text } => {
                        text_parts.push(ContentPart::Text { text });
                    }
                    AnthropicContentBlock::Image { source } => {
                        let url = if source.source_type == "base64" {
                            let mime = source.media_type.unwrap_or_else(|| "image/png".to_owned());
                            format!("data:{mime};base64,{}", source.data)
                        } else {
                            source.data
                        };
                        text_parts.push(ContentPart::Image { url, detail: None });
                    }
                    AnthropicContentBlock::ToolUse { id, name, input } => {
                        let arguments = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_owned());
                        tool_calls.push(ToolCall {
                            id,
                            function: FunctionCall { name, arguments },
                        });
                    }
                    AnthropicContentBlock::ToolResult {
                        tool_use_id, content, ..
                    } => {
                        tool_call_id = Some(tool_use_id);
                        tool_result_content = content;
                    }
                }
            }

            if let Some(tc_id) = tool_call_id {
                return Message {
                    role: Role::Tool,
                    content: Content::Text(tool_result_content.unwrap_or_default()),
                    name: None,
                    tool_calls: None,
                    tool_call_id: Some(tc_id),
                };
            }

            let content = if text_parts.len() == 1 {
                match text_parts.into_iter().next() {
                    Some(ContentPart::Text { text }) => Content::Text(text),
                    Some(other) => Content::Parts(vec![other]),
                    None => Content::Text(String::new()),
                }
            } else if text_parts.is_empty() {
                Content::Text(String::new())
            } else {
                Content::Parts(text_parts)
            };

            Message {
                role,
                content,
                name: None,
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                tool_call_id: None,
            }
        }
    }
}

impl From<AnthropicTool> for ToolDefinition {
    fn from(tool: AnthropicTool) -> Self {
        Self {
            tool_type: "function".to_owned(),
            function: FunctionDefinition {
                name: tool.name,
                description: tool.description,
                parameters: Some(tool.input_schema),
            },
        }
    }
}

fn anthropic_tool_choice_to_internal(tc: &AnthropicToolChoice) -> ToolChoice {
    match tc.choice_type.as_str() {
        "any" => ToolChoice::Mode(ToolChoiceMode::Required),
        "tool" => tc.name.as_ref().map_or(ToolChoice::Mode(ToolChoiceMode::Auto), |name| {
            ToolChoice::Function(ToolChoiceFunction {
                tool_type: "function".to_owned(),
                function: ToolChoiceFunctionName { name: name.clone() },
            })
        }),
        _ => ToolChoice::Mode(ToolChoiceMode::Auto),
    }
}

// -- Outbound request: unified model -> Anthropic wire request --

impl From<&Request> for AnthropicRequest {
    fn from(req: &Request) -> Self {
        let mut system = None;
        let mut messages = Vec::new();

        for msg in &req.messages {
            if msg.role == Role::System || msg.role == Role::Developer {
                system = Some(msg.content.as_text());
            } else {
                messages.push(internal_message_to_anthropic(msg));
            }
        }

        let tools = req.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.function.name.clone(),
                    description: t.function.description.clone(),
                    input_schema: t
                        .function
                        .parameters
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({"type": "object"})),
                })
                .collect()
        });

        let tool_choice = req.tool_choice.as_ref().map(internal_tool_choice_to_anthropic);

        Self {
            model: req.model.clone(),
            max_tokens: req.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages,
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            top_k: None,
            stop_sequences: req.params.stop.as_ref().map(|s| s.as_slice().to_vec()),
            stream: if req.stream { Some(true) } else { None },
            tools,
            tool_choice,
        }
    }
}

fn internal_message_to_anthropic(msg: &Message) -> AnthropicMessage {
    let role = match msg.role {
        Role::Assistant => "assistant",
        Role::Tool | Role::User | Role::System | Role::Developer => "user",
    };

    if msg.role == Role::Tool
        && let Some(tool_call_id) = &msg.tool_call_id
    {
        return AnthropicMessage {
            role: "user".to_owned(),
            content: AnthropicContent::Blocks(vec![AnthropicContentBlock::ToolResult {
                tool_use_id: tool_call_id.clone(),
                content: Some(msg.content.as_text()),
                is_error: None,
            }]),
        };
    }

    if let Some(tool_calls) = &msg.tool_calls {
        let mut blocks: Vec<AnthropicContentBlock> = Vec::new();

        let text = msg.content.as_text();
        if !text.is_empty() {
            blocks.push(AnthropicContentBlock::Text { text });
        }

        for tc in tool_calls {
            let input = serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| serde_json::json!({}));
            blocks.push(AnthropicContentBlock::ToolUse {
                id: tc.id.clone(),
                name: tc.function.name.clone(),
                input,
            });
        }

        return AnthropicMessage {
            role: role.to_owned(),
            content: AnthropicContent::Blocks(blocks),
        };
    }

    let content = match &msg.content {
        Content::Text(text) => AnthropicContent::Text(text.clone()),
        Content::Parts(parts) => {
            let blocks = parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
                    ContentPart::Image { url, .. } => {
                        if let Some(rest) = url.strip_prefix("data:")
                            && let Some((mime_and_encoding, data)) = rest.split_once(',')
                        {
                            let media_type = mime_and_encoding.strip_suffix(";base64").unwrap_or(mime_and_encoding);
                            AnthropicContentBlock::Image {
                                source: AnthropicImageSource {
                                    source_type: "base64".to_owned(),
                                    media_type: Some(media_type.to_owned()),
                                    data: data.to_owned(),
                                },
                            }
                        } else {
                            AnthropicContentBlock::Image {
                                source: AnthropicImageSource {
                                    source_type: "url".to_owned(),
                                    media_type: None,
                                    data: url.clone(),
                                },
                            }
                        }
                    }
                })
                .collect();
            AnthropicContent::Blocks(blocks)
        }
    };

    AnthropicMessage {
        role: role.to_owned(),
        content,
    }
}

fn internal_tool_choice_to_anthropic(choice: &ToolChoice) -> AnthropicToolChoice {
    match choice {
        ToolChoice::Mode(mode) => match mode {
            ToolChoiceMode::None | ToolChoiceMode::Auto => AnthropicToolChoice {
                choice_type: "auto".to_owned(),
                name: None,
            },
            ToolChoiceMode::Required => AnthropicToolChoice {
                choice_type: "any".to_owned(),
                name: None,
            },
        },
        ToolChoice::Function(func) => AnthropicToolChoice {
            choice_type: "tool".to_owned(),
            name: Some(func.function.name.clone()),
        },
    }
}

fn finish_reason_to_anthropic(fr: FinishReason) -> String {
    match fr {
        FinishReason::Stop | FinishReason::ContentFilter => "end_turn",
        FinishReason::Length => "max_tokens",
        FinishReason::ToolCalls => "tool_use",
    }
    .to_owned()
}

fn parse_anthropic_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "end_turn" | "stop" => Some(FinishReason::Stop),
        "max_tokens" => Some(FinishReason::Length),
        "tool_use" => Some(FinishReason::ToolCalls),
        _ => None,
    }
}

// -- Inbound response: Anthropic wire response -> unified model --

impl From<AnthropicResponse> for Response {
    fn from(resp: AnthropicResponse) -> Self {
        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        for block in &resp.content {
            match block {
                AnthropicResponseBlock::Text { text } => text_content.push_str(text),
                AnthropicResponseBlock::ToolUse { id, name, input } => {
                    let arguments = serde_json::to_string(input).unwrap_or_else(|_| "{}".to_owned());
                    tool_calls.push(ToolCall {
                        id: id.clone(),
                        function: FunctionCall {
                            name: name.clone(),
                            arguments,
                        },
                    });
                }
            }
        }

        let finish_reason = resp.stop_reason.as_deref().and_then(parse_anthropic_finish_reason);

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

        Self {
            id: resp.id,
            object: "chat.completion".to_owned(),
            created: now_unix(),
            model: resp.model,
            choices: vec![Choice {
                index: 0,
                message: Some(message),
                delta: None,
                finish_reason,
                logprobs: None,
            }],
            usage: Some(Usage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
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

// -- Outbound response: unified model -> Anthropic wire response --

impl From<&Response> for AnthropicResponse {
    fn from(resp: &Response) -> Self {
        let choice = resp.choices.first();

        let mut content = Vec::new();
        if let Some(c) = choice
            && let Some(message) = &c.message
        {
            if let Some(text) = &message.content {
                content.push(AnthropicResponseBlock::Text { text: text.clone() });
            }
            if let Some(tool_calls) = &message.tool_calls {
                for tc in tool_calls {
                    let input = serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| serde_json::json!({}));
                    content.push(AnthropicResponseBlock::ToolUse {
                        id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        input,
                    });
                }
            }
        }

        let stop_reason = choice.and_then(|c| c.finish_reason).map(finish_reason_to_anthropic);
        let usage = resp.usage.clone().unwrap_or_default();

        Self {
            id: resp.id.clone(),
            response_type: "message".to_owned(),
            role: "assistant".to_owned(),
            content,
            model: resp.model.clone(),
            stop_reason,
            stop_sequence: None,
            usage: AnthropicUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        }
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// -- Stream conversion: Anthropic raw events -> unified stream items --

/// Tracks Anthropic's block-indexed stream shape across events, so it can be
/// re-expressed as the unified model's flat per-choice delta stream
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    id: String,
    model: String,
    /// Sequential 0-based index of the tool call currently being streamed
    ///
    /// Anthropic's content block index is shared across all block types
    /// (text, tool_use, …), so it cannot be used as the tool-call index — a
    /// tool use that follows a text block would have content_block index 1+,
    /// creating phantom entries in consumers that index by this value.
    current_tool_call_index: u32,
    next_tool_call_index: u32,
}

impl AnthropicStreamState {
    /// Create a new stream state tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one decoded Anthropic SSE event into zero or more unified
    /// stream items
    pub fn convert_event(&mut self, event: &AnthropicStreamEvent) -> Vec<ResponseStreamItem> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.id = message.id.clone();
                self.model = message.model.clone();
                Vec::new()
            }
            AnthropicStreamEvent::Ping | AnthropicStreamEvent::ContentBlockStop { .. } => Vec::new(),

            AnthropicStreamEvent::ContentBlockStart { content_block, .. } => match content_block {
                AnthropicStreamContentBlock::Text { .. } => Vec::new(),
                AnthropicStreamContentBlock::ToolUse { id, name, .. } => {
                    self.current_tool_call_index = self.next_tool_call_index;
                    self.next_tool_call_index += 1;
                    vec![self.chunk(StreamDelta {
                        content: None,
                        role: None,
                        tool_calls: Some(vec![StreamToolCall {
                            index: self.current_tool_call_index,
                            id: Some(id.clone()),
                            function: Some(StreamFunctionCall {
                                name: Some(name.clone()),
                                arguments: None,
                            }),
                        }]),
                    })]
                }
            },

            AnthropicStreamEvent::ContentBlockDelta { delta, .. } => match delta {
                AnthropicStreamDelta::TextDelta { text } => vec![self.chunk(StreamDelta {
                    content: Some(text.clone()),
                    role: None,
                    tool_calls: None,
                })],
                AnthropicStreamDelta::InputJsonDelta { partial_json } => vec![self.chunk(StreamDelta {
                    content: None,
                    role: None,
                    tool_calls: Some(vec![StreamToolCall {
                        index: self.current_tool_call_index,
                        id: None,
                        function: Some(StreamFunctionCall {
                            name: None,
                            arguments: Some(partial_json.clone()),
                        }),
                    }]),
                })],
            },

            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                let finish_reason = delta.stop_reason.as_deref().and_then(parse_anthropic_finish_reason);
                let mut response = self.empty_response();
                response.choices[0].finish_reason = finish_reason;
                response.usage = usage.as_ref().map(|u| Usage {
                    prompt_tokens: u.input_tokens,
                    completion_tokens: u.output_tokens,
                    total_tokens: u.input_tokens + u.output_tokens,
                    prompt_tokens_details: None,
                    completion_tokens_details: None,
                });
                vec![ResponseStreamItem::Chunk(response)]
            }

            AnthropicStreamEvent::MessageStop => vec![ResponseStreamItem::Done],
        }
    }

    fn chunk(&self, delta: StreamDelta) -> ResponseStreamItem {
        let mut response = self.empty_response();
        response.choices[0].delta = Some(delta);
        ResponseStreamItem::Chunk(response)
    }

    fn empty_response(&self) -> Response {
        Response {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_owned(),
            created: now_unix(),
            model: self.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: None,
                delta: None,
                finish_reason: None,
                logprobs: None,
            }],
            usage: None,
            service_tier: None,
            system_fingerprint: None,
            error: None,
            provider_data: None,
            transformer_metadata: portal_core::model::TransformerMetadata::default(),
        }
    }
}

// -- Stream conversion: unified stream items -> Anthropic SSE events --

/// Tracks state needed to re-encode unified stream items as Anthropic's
/// block-indexed SSE shape
#[derive(Debug, Default)]
pub struct AnthropicEncodeState {
    started: bool,
    text_block_open: bool,
}

impl AnthropicEncodeState {
    /// Create a new encode-state tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-encode one unified stream item into the Anthropic events it
    /// produces, preserving order
    pub fn encode_item(&mut self, item: &ResponseStreamItem, response_id: &str, model: &str) -> Vec<AnthropicStreamEvent> {
        let mut events = Vec::new();

        let ResponseStreamItem::Chunk(response) = item else {
            events.push(AnthropicStreamEvent::MessageStop);
            return events;
        };

        if !self.started {
            self.started = true;
            events.push(AnthropicStreamEvent::MessageStart {
                message: crate::protocol::anthropic::AnthropicStreamMessage {
                    id: response_id.to_owned(),
                    message_type: "message".to_owned(),
                    role: "assistant".to_owned(),
                    model: model.to_owned(),
                    usage: None,
                },
            });
        }

        let Some(choice) = response.choices.first() else {
            return events;
        };
        let Some(delta) = &choice.delta else {
            return events;
        };

        if let Some(content) = &delta.content {
            if !self.text_block_open {
                self.text_block_open = true;
                events.push(AnthropicStreamEvent::ContentBlockStart {
                    index: 0,
                    content_block: AnthropicStreamContentBlock::Text { text: String::new() },
                });
            }
            events.push(AnthropicStreamEvent::ContentBlockDelta {
                index: 0,
                delta: AnthropicStreamDelta::TextDelta { text: content.clone() },
            });
        }

        if let Some(tool_calls) = &delta.tool_calls {
            for tc in tool_calls {
                if let Some(func) = &tc.function
                    && let Some(name) = &func.name
                {
                    events.push(AnthropicStreamEvent::ContentBlockStart {
                        index: tc.index + 1,
                        content_block: AnthropicStreamContentBlock::ToolUse {
                            id: tc.id.clone().unwrap_or_default(),
                            name: name.clone(),
                            input: serde_json::json!({}),
                        },
                    });
                }
                if let Some(func) = &tc.function
                    && let Some(args) = &func.arguments
                {
                    events.push(AnthropicStreamEvent::ContentBlockDelta {
                        index: tc.index + 1,
                        delta: AnthropicStreamDelta::InputJsonDelta { partial_json: args.clone() },
                    });
                }
            }
        }

        if let Some(finish_reason) = choice.finish_reason {
            events.push(AnthropicStreamEvent::MessageDelta {
                delta: AnthropicMessageDelta {
                    stop_reason: Some(finish_reason_to_anthropic(finish_reason)),
                    stop_sequence: None,
                },
                usage: response.usage.as_ref().map(|u| AnthropicUsage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                }),
            });
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_start_then_text_deltas_produce_chunks() {
        let mut state = AnthropicStreamState::new();
        let start = AnthropicStreamEvent::MessageStart {
            message: crate::protocol::anthropic::AnthropicStreamMessage {
                id: "msg_1".to_owned(),
                message_type: "message".to_owned(),
                role: "assistant".to_owned(),
                model: "claude-3-opus".to_owned(),
                usage: None,
            },
        };
        assert!(state.convert_event(&start).is_empty());

        let delta = AnthropicStreamEvent::ContentBlockDelta {
            index: 0,
            delta: AnthropicStreamDelta::TextDelta { text: "hi".to_owned() },
        };
        let items = state.convert_event(&delta);
        assert_eq!(items.len(), 1);
        let ResponseStreamItem::Chunk(response) = &items[0] else {
            panic!("expected chunk");
        };
        assert_eq!(response.model, "claude-3-opus");
        assert_eq!(response.choices[0].delta.as_ref().unwrap().content.as_deref(), Some("hi"));
    }

    #[test]
    fn message_stop_yields_done() {
        let mut state = AnthropicStreamState::new();
        let items = state.convert_event(&AnthropicStreamEvent::MessageStop);
        assert!(matches!(items.as_slice(), [ResponseStreamItem::Done]));
    }

    #[test]
    fn tool_use_gets_sequential_index_independent_of_block_index() {
        let mut state = AnthropicStreamState::new();
        let text_block = AnthropicStreamEvent::ContentBlockStart {
            index: 0,
            content_block: AnthropicStreamContentBlock::Text { text: String::new() },
        };
        state.convert_event(&text_block);

        let tool_block = AnthropicStreamEvent::ContentBlockStart {
            index: 1,
            content_block: AnthropicStreamContentBlock::ToolUse {
                id: "call_1".to_owned(),
                name: "lookup".to_owned(),
                input: serde_json::json!({}),
            },
        };
        let items = state.convert_event(&tool_block);
        let ResponseStreamItem::Chunk(response) = &items[0] else {
            panic!("expected chunk");
        };
        let tool_calls = response.choices[0].delta.as_ref().unwrap().tool_calls.as_ref().unwrap();
        assert_eq!(tool_calls[0].index, 0, "first tool call must be index 0 despite block index 1");
    }

    #[test]
    fn request_round_trips_system_prompt() {
        let req = AnthropicRequest {
            model: "claude-3-opus".to_owned(),
            max_tokens: 100,
            system: Some("be terse".to_owned()),
            messages: vec![AnthropicMessage {
                role: "user".to_owned(),
                content: AnthropicContent::Text("hi".to_owned()),
            }],
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            stream: None,
            tools: None,
            tool_choice: None,
        };
        let unified: Request = req.into();
        assert_eq!(unified.messages.len(), 2);
        assert_eq!(unified.messages[0].role, Role::System);
    }
}
