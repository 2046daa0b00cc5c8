use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for the upstream `/v1/chat/completions` endpoint.
///
/// This is the Chat Completions dialect: role-tagged messages, tools as
/// function declarations, and tool-call arguments carried as serialized
/// JSON strings inside the enclosing document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Upstream model id, e.g. `anthropic/claude-sonnet-4`.
    pub model: String,

    /// The conversation, including `system` and `tool` role messages.
    pub messages: Vec<ChatMessage>,

    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Controls randomness in the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Sequences that will cause the model to stop generating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    /// Whether to stream the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Available tools. Omitted entirely when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,

    /// Aggregator provider-routing hint, forwarded verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<config::ProviderRoutingConfig>,
}

/// A chat message in the upstream dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender.
    pub role: ChatRole,

    /// Text content. Assistant messages that only carry tool calls omit it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tool calls made by the assistant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// For `tool` role messages, the id of the call this result answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// A plain message with only text content.
    pub fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Role of a chat message sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instructions.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Tool execution result.
    Tool,
    /// Any role this crate does not know about.
    #[serde(untagged)]
    Other(String),
}

/// A completed tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call.
    pub id: String,

    /// Always "function".
    #[serde(rename = "type", default)]
    pub tool_type: ToolCallType,

    /// The function invocation.
    pub function: FunctionCall,
}

/// Tool call type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallType {
    /// A function call, the only kind the upstream dialect defines.
    #[default]
    Function,
}

/// A function invocation with serialized arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the function.
    pub name: String,

    /// Arguments as a serialized JSON document.
    pub arguments: String,
}

/// A tool declaration in the upstream dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Always "function".
    #[serde(rename = "type", default)]
    pub tool_type: ToolCallType,

    /// The declared function.
    pub function: FunctionDefinition,
}

/// Function declaration with its parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name.
    pub name: String,

    /// Description of what the function does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for the function's parameters.
    pub parameters: Value,
}

/// Response body from the upstream `/v1/chat/completions` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    /// Unique identifier for this completion.
    #[serde(default)]
    pub id: String,

    /// The model that generated the response.
    #[serde(default)]
    pub model: String,

    /// Response candidates. The first choice is the response.
    #[serde(default)]
    pub choices: Vec<ChatChoice>,

    /// Token usage statistics.
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// One response candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    /// Index of this choice.
    #[serde(default)]
    pub index: u32,

    /// The generated message.
    pub message: ResponseMessage,

    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// The assistant message inside a response choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Text content.
    #[serde(default)]
    pub content: Option<String>,

    /// Tool calls made by the assistant.
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Legacy single-function form some upstreams still emit.
    #[serde(default)]
    pub function_call: Option<FunctionCall>,
}

/// Why the upstream stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stopping point.
    Stop,
    /// Maximum token limit reached.
    Length,
    /// Content was filtered.
    ContentFilter,
    /// Tool calls were made.
    ToolCalls,
    /// Legacy function-call form.
    FunctionCall,
    /// Any reason this crate does not know about.
    #[serde(untagged)]
    Other(String),
}

/// Token usage statistics in the upstream dialect.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt.
    #[serde(default)]
    pub prompt_tokens: u32,

    /// Tokens in the completion.
    #[serde(default)]
    pub completion_tokens: u32,

    /// Total tokens consumed.
    #[serde(default)]
    pub total_tokens: u32,
}

/// One streamed chunk of a completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Completion id, identical across all chunks of a response.
    #[serde(default)]
    pub id: String,

    /// The model generating the response.
    #[serde(default)]
    pub model: String,

    /// Incremental choice updates.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,

    /// Cumulative usage, present on the final chunk when the upstream
    /// reports it.
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Incremental update for one choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Index of the choice being updated.
    #[serde(default)]
    pub index: u32,

    /// The incremental content.
    #[serde(default)]
    pub delta: MessageDelta,

    /// Present on the final chunk for this choice.
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// Incremental message content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageDelta {
    /// Role, present only on the first chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ChatRole>,

    /// Appended text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Incremental tool-call updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<StreamingToolCall>>,

    /// Legacy single-function form some upstreams still emit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<StreamingFunction>,
}

/// Incremental tool-call update.
///
/// Some upstreams omit the `index`, identify the call only by a
/// late-arriving `id`, or both; every field is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamingToolCall {
    /// Position of the call within the choice's tool_calls array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,

    /// Unique identifier, present on the first update for a call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The incremental function data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<StreamingFunction>,
}

/// Incremental function data inside a streaming tool call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamingFunction {
    /// Function name, present on the first update for a call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Appended fragment of the serialized arguments document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}
