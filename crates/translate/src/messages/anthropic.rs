use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for the `/v1/messages` endpoint.
///
/// This is the Messages-dialect request shape: content is carried in typed
/// blocks, the system prompt lives outside the messages array, and tool
/// interactions use `tool_use`/`tool_result` blocks instead of function
/// calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagesRequest {
    /// The model to answer with. Either a short name resolved through the
    /// configured overrides, or an already-qualified `vendor/model` id.
    pub model: String,

    /// The conversation, alternating between "user" and "assistant" roles.
    pub messages: Vec<Message>,

    /// Maximum number of tokens to generate. When absent, the configured
    /// default applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// System prompt, either a plain string or a sequence of text fragments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,

    /// Controls randomness in the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Sequences that will cause the model to stop generating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    /// Whether to stream the response as Server-Sent Events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Tools available for the model to use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
}

/// System prompt in either of its two accepted shapes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    /// A plain string.
    Text(String),
    /// An ordered sequence of typed text fragments.
    Blocks(Vec<SystemBlock>),
}

impl SystemPrompt {
    /// Flatten the prompt to a single string, joining fragments in order.
    pub fn flatten(self) -> String {
        match self {
            SystemPrompt::Text(text) => text,
            SystemPrompt::Blocks(blocks) => {
                let parts: Vec<String> = blocks.into_iter().map(|block| block.text()).collect();
                parts.join("\n")
            }
        }
    }
}

/// A single system prompt fragment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemBlock {
    /// Plain text fragment.
    Text {
        /// The text content.
        text: String,
    },
}

impl SystemBlock {
    fn text(self) -> String {
        match self {
            SystemBlock::Text { text } => text,
        }
    }
}

/// A message with role and content.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    /// The role of the message sender.
    pub role: Role,
    /// The content, either a plain string or a sequence of content blocks.
    pub content: MessageContent,
}

/// Role of a message sender. The system prompt is carried separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user input.
    User,
    /// Model output, replayed by the client in multi-turn conversations.
    Assistant,
}

/// Message content in either of its two accepted shapes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// A plain string, shorthand for a single text block.
    Text(String),
    /// An ordered sequence of typed content blocks.
    Blocks(Vec<ContentBlock>),
}

/// Content block in a message.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text content.
    Text {
        /// The text content.
        text: String,
    },

    /// The assistant's request to invoke a tool.
    ToolUse {
        /// Unique identifier for this tool use.
        id: String,
        /// Name of the tool to use.
        name: String,
        /// Input arguments for the tool.
        input: Value,
    },

    /// User-side delivery of a prior tool's result.
    ToolResult {
        /// The tool use id this result corresponds to.
        tool_use_id: String,
        /// The result payload. May be absent for tools without output.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<ToolResultContent>,
        /// Whether the tool execution failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// Tool result payload in either of its two accepted shapes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    /// A plain string result.
    Text(String),
    /// A sequence of content blocks.
    Blocks(Vec<ContentBlock>),
}

/// A tool the model may call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolDefinition {
    /// The name of the tool.
    pub name: String,

    /// Description of what the tool does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Response body for the `/v1/messages` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    /// Unique identifier for this completion.
    pub id: String,

    /// The type of response, always "message".
    pub r#type: String,

    /// The role of the response, always "assistant".
    pub role: Role,

    /// The content of the response.
    pub content: Vec<ContentBlock>,

    /// The model that generated the response.
    pub model: String,

    /// Why generation stopped.
    pub stop_reason: Option<StopReason>,

    /// Stop sequence that caused the model to stop, if any.
    pub stop_sequence: Option<String>,

    /// Token usage statistics.
    pub usage: Usage,
}

/// The reason why the model stopped generating tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model reached a natural stopping point.
    EndTurn,
    /// The generation hit the maximum token limit.
    MaxTokens,
    /// The model produced one of the requested stop sequences.
    StopSequence,
    /// The model invoked a tool.
    ToolUse,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndTurn => write!(f, "end_turn"),
            StopReason::MaxTokens => write!(f, "max_tokens"),
            StopReason::StopSequence => write!(f, "stop_sequence"),
            StopReason::ToolUse => write!(f, "tool_use"),
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Number of input tokens.
    pub input_tokens: u32,
    /// Number of output tokens.
    pub output_tokens: u32,
}

/// Error details carried in error envelopes and `error` stream events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// The kind of error that occurred.
    pub r#type: String,
    /// Human-readable error message.
    pub message: String,
}

/// Error envelope returned for failed requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always "error".
    pub r#type: String,
    /// Error details.
    pub error: ErrorBody,
}

/// Streaming events emitted on the `/v1/messages` SSE stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Start of a message. Exactly one per stream, before anything else.
    MessageStart {
        /// Initial message metadata with a zero-usage placeholder.
        message: MessageStart,
    },

    /// A content block begins.
    ContentBlockStart {
        /// The index of the content block.
        index: u32,
        /// The block being started.
        content_block: ContentBlock,
    },

    /// Incremental update to an open content block.
    ContentBlockDelta {
        /// The index of the content block.
        index: u32,
        /// The delta update.
        delta: ContentDelta,
    },

    /// A content block is complete.
    ContentBlockStop {
        /// The index of the content block.
        index: u32,
    },

    /// Final stop reason and cumulative usage.
    MessageDelta {
        /// Delta update for the message.
        delta: MessageDeltaBody,
        /// Cumulative usage statistics.
        usage: Usage,
    },

    /// End of the stream. Exactly one per stream, after everything else.
    MessageStop,

    /// Error event, followed by `message_stop`.
    Error {
        /// The error that occurred.
        error: ErrorBody,
    },
}

impl StreamEvent {
    /// The SSE `event:` name for this event.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::MessageStart { .. } => "message_start",
            StreamEvent::ContentBlockStart { .. } => "content_block_start",
            StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            StreamEvent::ContentBlockStop { .. } => "content_block_stop",
            StreamEvent::MessageDelta { .. } => "message_delta",
            StreamEvent::MessageStop => "message_stop",
            StreamEvent::Error { .. } => "error",
        }
    }
}

/// Initial message metadata for streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStart {
    /// Unique message id.
    pub id: String,

    /// Always "message".
    pub r#type: String,

    /// Always "assistant".
    pub role: Role,

    /// Initial empty content array.
    pub content: Vec<ContentBlock>,

    /// The model generating the response.
    pub model: String,

    /// Zero-usage placeholder.
    pub usage: Usage,
}

/// Delta update for content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    /// Additional text for a text block.
    TextDelta {
        /// The appended text.
        text: String,
    },

    /// Partial JSON for a tool-use block's input.
    InputJsonDelta {
        /// The appended fragment of the arguments document.
        partial_json: String,
    },
}

/// Message-level delta carried by `message_delta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDeltaBody {
    /// Stop reason once the message is complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,

    /// Stop sequence if one was produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_string_content() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "model": "claude-3-sonnet",
            "max_tokens": 512,
            "system": "Be terse.",
            "messages": [{"role": "user", "content": "Hi"}]
        }))
        .unwrap();

        assert!(matches!(request.system, Some(SystemPrompt::Text(ref s)) if s == "Be terse."));
        assert!(matches!(request.messages[0].content, MessageContent::Text(ref s) if s == "Hi"));
    }

    #[test]
    fn deserialize_block_content() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "model": "claude-3-sonnet",
            "system": [
                {"type": "text", "text": "Be terse."},
                {"type": "text", "text": "Answer in French."}
            ],
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "first"},
                    {"type": "tool_result", "tool_use_id": "t1", "content": "42", "is_error": true}
                ]
            }]
        }))
        .unwrap();

        let system = request.system.unwrap().flatten();
        assert_eq!(system, "Be terse.\nAnswer in French.");

        let MessageContent::Blocks(blocks) = &request.messages[0].content else {
            unreachable!("expected block content");
        };
        assert_eq!(blocks.len(), 2);

        let ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } = &blocks[1]
        else {
            unreachable!("expected tool_result");
        };
        assert_eq!(tool_use_id, "t1");
        assert!(matches!(content, Some(ToolResultContent::Text(s)) if s == "42"));
        assert_eq!(*is_error, Some(true));
    }

    #[test]
    fn serialize_stream_events() {
        let event = StreamEvent::ContentBlockDelta {
            index: 2,
            delta: ContentDelta::InputJsonDelta {
                partial_json: "{\"a\":".to_string(),
            },
        };

        assert_eq!(event.name(), "content_block_delta");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "content_block_delta");
        assert_eq!(json["index"], 2);
        assert_eq!(json["delta"]["type"], "input_json_delta");
        assert_eq!(json["delta"]["partial_json"], "{\"a\":");
    }

    #[test]
    fn serialize_message_start() {
        let event = StreamEvent::MessageStart {
            message: MessageStart {
                id: "msg_123".to_string(),
                r#type: "message".to_string(),
                role: Role::Assistant,
                content: vec![],
                model: "moonshotai/kimi-k2".to_string(),
                usage: Usage::default(),
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message_start");
        assert_eq!(json["message"]["id"], "msg_123");
        assert_eq!(json["message"]["usage"]["input_tokens"], 0);
    }
}
