//! The unified request/response/stream model shared by every transformer
//!
//! One `Request`/`Response` pair spans chat, image-generation, embedding,
//! and rerank wire shapes, discriminated by [`RequestKind`]. Shapes that
//! vary across providers (`content`, `stop`, `embedding_input`,
//! `embedding`) use shape-polymorphic codecs rather than separate types
//! per shape.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{Content, ContentPart, FunctionCall, Message, Role, ToolCall, ToolResult};
pub use request::{
    CompletionParams, EmbeddingInput, ImageRequest, RerankRequest, Request, RequestKind, ResponseFormat, StopSequences,
    StreamOptions, TransformerMetadata,
};
pub use response::{
    Choice, ChoiceMessage, CompletionTokensDetails, EmbeddingData, EmbeddingResponse, EmbeddingVector, FinishReason,
    PromptTokensDetails, RerankResponse, RerankResult, Response, UnifiedError, Usage,
};
pub use stream::{ResponseStreamItem, StreamDelta, StreamEvent, StreamFunctionCall, StreamToolCall};
pub use tool::{FunctionDefinition, ToolChoice, ToolChoiceFunction, ToolChoiceFunctionName, ToolChoiceMode, ToolDefinition};
