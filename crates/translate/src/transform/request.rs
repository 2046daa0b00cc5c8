//! Client-dialect request to upstream-dialect request transformation.

use config::Config;
use itertools::Itertools as _;
use serde_json::Value;

use crate::{
    error::Result,
    format::UpstreamFormat,
    messages::{
        anthropic::{ContentBlock, Message, MessageContent, MessagesRequest, Role, ToolResultContent},
        openai::{
            ChatCompletionRequest, ChatMessage, ChatRole, FunctionCall, FunctionDefinition, Tool, ToolCall,
            ToolCallType,
        },
    },
    resolver, schema, validate,
};

/// A client request rewritten for the upstream, with the context the
/// response path needs to translate back.
#[derive(Debug)]
pub struct PreparedRequest {
    /// The upstream-dialect request body.
    pub upstream: ChatCompletionRequest,
    /// The model id the client asked for, echoed back in responses.
    pub requested_model: String,
    /// The upstream's tool-call dialect variant.
    pub format: UpstreamFormat,
    /// Whether the client asked for a streamed response.
    pub stream: bool,
}

/// Build an upstream request from a client request.
pub fn build(request: MessagesRequest, config: &Config) -> Result<PreparedRequest> {
    let model = resolver::resolve(&request.model, &config.models)?;
    let format = UpstreamFormat::detect(&model);
    let stream = request.stream.unwrap_or(false);

    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = request.system {
        messages.push(ChatMessage::text(ChatRole::System, system.flatten()));
    }

    for message in request.messages {
        expand_message(message, &mut messages);
    }

    let tools = request
        .tools
        .filter(|tools| !tools.is_empty())
        .map(|tools| tools.into_iter().map(build_tool).collect::<Vec<_>>());

    let upstream = ChatCompletionRequest {
        model,
        messages,
        max_tokens: request.max_tokens.or(config.models.default_max_tokens),
        temperature: request.temperature,
        top_p: request.top_p,
        stop: request.stop_sequences,
        stream: request.stream,
        tools,
        provider: config.upstream.provider.clone(),
    };

    validate::check_tool_consistency(&upstream.messages)?;

    Ok(PreparedRequest {
        upstream,
        requested_model: request.model,
        format,
        stream,
    })
}

fn build_tool(tool: crate::messages::anthropic::ToolDefinition) -> Tool {
    let mut parameters = tool.input_schema;
    schema::sanitize(&mut parameters);

    Tool {
        tool_type: ToolCallType::Function,
        function: FunctionDefinition {
            name: tool.name,
            description: tool.description,
            parameters,
        },
    }
}

/// Expand one client message into one or more upstream messages.
fn expand_message(message: Message, out: &mut Vec<ChatMessage>) {
    match (message.role, message.content) {
        (Role::User, MessageContent::Text(text)) => {
            out.push(ChatMessage::text(ChatRole::User, text));
        }
        (Role::User, MessageContent::Blocks(blocks)) => expand_user_blocks(blocks, out),
        (Role::Assistant, MessageContent::Text(text)) => {
            out.push(ChatMessage::text(ChatRole::Assistant, text));
        }
        (Role::Assistant, MessageContent::Blocks(blocks)) => expand_assistant_blocks(blocks, out),
    }
}

/// User blocks expand in order: consecutive text blocks coalesce into one
/// `user` message, each tool result becomes its own `tool` message.
fn expand_user_blocks(blocks: Vec<ContentBlock>, out: &mut Vec<ChatMessage>) {
    for (is_text, group) in &blocks.into_iter().chunk_by(|block| matches!(block, ContentBlock::Text { .. })) {
        if is_text {
            let text = group
                .map(|block| match block {
                    ContentBlock::Text { text } => text,
                    _ => String::new(),
                })
                .join("\n");

            out.push(ChatMessage::text(ChatRole::User, text));
            continue;
        }

        for block in group {
            match block {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    out.push(ChatMessage {
                        role: ChatRole::Tool,
                        content: Some(flatten_tool_result(content, is_error.unwrap_or(false))),
                        tool_calls: None,
                        tool_call_id: Some(tool_use_id),
                    });
                }
                other => {
                    log::warn!("Ignoring unexpected block in user message: {}", block_kind(&other));
                }
            }
        }
    }
}

/// Assistant blocks collapse into a single upstream message: text blocks
/// concatenate into `content`, tool uses become `tool_calls` entries.
fn expand_assistant_blocks(blocks: Vec<ContentBlock>, out: &mut Vec<ChatMessage>) {
    let mut content = String::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => content.push_str(&text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall {
                    id,
                    tool_type: ToolCallType::Function,
                    function: FunctionCall {
                        name,
                        arguments: encode_arguments(&input),
                    },
                });
            }
            ContentBlock::ToolResult { .. } => {
                log::warn!("Ignoring tool_result block in assistant message");
            }
        }
    }

    out.push(ChatMessage {
        role: ChatRole::Assistant,
        content: (!content.is_empty()).then_some(content),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    });
}

fn encode_arguments(input: &Value) -> String {
    serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string())
}

/// Flatten a tool result payload to the single string the upstream `tool`
/// role carries. Text children join with newlines; anything else is
/// JSON-serialized in place.
fn flatten_tool_result(content: Option<ToolResultContent>, is_error: bool) -> String {
    let flattened = match content {
        None => String::new(),
        Some(ToolResultContent::Text(text)) => text,
        Some(ToolResultContent::Blocks(blocks)) => {
            let parts: Vec<String> = blocks
                .into_iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => text,
                    other => {
                        log::warn!(
                            "Serializing non-text {} block inside a tool_result",
                            block_kind(&other)
                        );
                        serde_json::to_string(&other).unwrap_or_default()
                    }
                })
                .collect();

            parts.join("\n")
        }
    };

    if is_error {
        format!("error: {flattened}")
    } else {
        flattened
    }
}

fn block_kind(block: &ContentBlock) -> &'static str {
    match block {
        ContentBlock::Text { .. } => "text",
        ContentBlock::ToolUse { .. } => "tool_use",
        ContentBlock::ToolResult { .. } => "tool_result",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::anthropic::SystemPrompt;
    use insta::assert_json_snapshot;
    use serde_json::json;

    fn test_config() -> Config {
        Config {
            models: config::ModelsConfig {
                default: "openrouter/x".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn request(value: Value) -> MessagesRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn simple_text_request() {
        let prepared = build(
            request(json!({
                "model": "claude-3-sonnet",
                "messages": [{"role": "user", "content": "Hi"}],
                "stream": false
            })),
            &test_config(),
        )
        .unwrap();

        assert_eq!(prepared.requested_model, "claude-3-sonnet");
        assert_eq!(prepared.format, UpstreamFormat::Standard);
        assert!(!prepared.stream);

        assert_json_snapshot!(prepared.upstream, @r#"
        {
          "model": "openrouter/x",
          "messages": [
            {
              "role": "user",
              "content": "Hi"
            }
          ],
          "stream": false
        }
        "#);
    }

    #[test]
    fn system_prompt_becomes_first_message() {
        let prepared = build(
            request(json!({
                "model": "m/x",
                "system": [
                    {"type": "text", "text": "Be terse."},
                    {"type": "text", "text": "Answer in French."}
                ],
                "messages": [
                    {"role": "user", "content": "Hi"},
                    {"role": "assistant", "content": "Salut"}
                ]
            })),
            &test_config(),
        )
        .unwrap();

        let messages = &prepared.upstream.messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[0].content.as_deref(), Some("Be terse.\nAnswer in French."));
        assert_eq!(messages[1].role, ChatRole::User);
        assert_eq!(messages[2].role, ChatRole::Assistant);
    }

    #[test]
    fn plain_string_system_prompt() {
        let prompt = SystemPrompt::Text("be brief".to_string());
        assert_eq!(prompt.flatten(), "be brief");
    }

    #[test]
    fn consecutive_text_blocks_coalesce() {
        let prepared = build(
            request(json!({
                "model": "m/x",
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "one"},
                        {"type": "text", "text": "two"}
                    ]
                }]
            })),
            &test_config(),
        )
        .unwrap();

        let messages = &prepared.upstream.messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.as_deref(), Some("one\ntwo"));
    }

    #[test]
    fn tool_results_split_the_user_message() {
        let prepared = build(
            request(json!({
                "model": "m/x",
                "messages": [
                    {
                        "role": "assistant",
                        "content": [
                            {"type": "tool_use", "id": "t1", "name": "f", "input": {"a": 1}}
                        ]
                    },
                    {
                        "role": "user",
                        "content": [
                            {"type": "text", "text": "before"},
                            {"type": "tool_result", "tool_use_id": "t1", "content": "42"},
                            {"type": "text", "text": "after"}
                        ]
                    }
                ]
            })),
            &test_config(),
        )
        .unwrap();

        assert_json_snapshot!(prepared.upstream.messages, @r#"
        [
          {
            "role": "assistant",
            "tool_calls": [
              {
                "id": "t1",
                "type": "function",
                "function": {
                  "name": "f",
                  "arguments": "{\"a\":1}"
                }
              }
            ]
          },
          {
            "role": "user",
            "content": "before"
          },
          {
            "role": "tool",
            "content": "42",
            "tool_call_id": "t1"
          },
          {
            "role": "user",
            "content": "after"
          }
        ]
        "#);
    }

    #[test]
    fn assistant_text_and_tool_use_share_one_message() {
        let prepared = build(
            request(json!({
                "model": "m/x",
                "messages": [{
                    "role": "assistant",
                    "content": [
                        {"type": "text", "text": "Let me check."},
                        {"type": "tool_use", "id": "t9", "name": "lookup", "input": {"q": "x"}}
                    ]
                }]
            })),
            &test_config(),
        )
        .unwrap();

        let message = &prepared.upstream.messages[0];
        assert_eq!(message.content.as_deref(), Some("Let me check."));
        assert_eq!(message.tool_calls.as_ref().unwrap()[0].id, "t9");
    }

    #[test]
    fn error_results_get_the_error_prefix() {
        assert_eq!(
            flatten_tool_result(Some(ToolResultContent::Text("boom".to_string())), true),
            "error: boom"
        );
    }

    #[test]
    fn empty_tool_result_content_is_empty_string() {
        let prepared = build(
            request(json!({
                "model": "m/x",
                "messages": [
                    {
                        "role": "assistant",
                        "content": [{"type": "tool_use", "id": "t1", "name": "f", "input": {}}]
                    },
                    {
                        "role": "user",
                        "content": [{"type": "tool_result", "tool_use_id": "t1", "content": []}]
                    }
                ]
            })),
            &test_config(),
        )
        .unwrap();

        let tool_message = &prepared.upstream.messages[1];
        assert_eq!(tool_message.role, ChatRole::Tool);
        assert_eq!(tool_message.content.as_deref(), Some(""));
    }

    #[test]
    fn mixed_tool_result_content_is_flattened() {
        let content = ToolResultContent::Blocks(vec![
            ContentBlock::Text { text: "head".to_string() },
            ContentBlock::ToolUse {
                id: "inner".to_string(),
                name: "n".to_string(),
                input: json!({}),
            },
        ]);

        let flattened = flatten_tool_result(Some(content), false);
        assert!(flattened.starts_with("head\n"));
        assert!(flattened.contains("\"tool_use\""));
    }

    #[test]
    fn tool_schemas_are_sanitized() {
        let prepared = build(
            request(json!({
                "model": "m/x",
                "messages": [{"role": "user", "content": "Hi"}],
                "tools": [{
                    "name": "get_weather",
                    "input_schema": {
                        "type": "object",
                        "properties": {"loc": {"type": "string", "format": "uri"}},
                        "required": ["loc"]
                    }
                }]
            })),
            &test_config(),
        )
        .unwrap();

        let tools = prepared.upstream.tools.as_ref().unwrap();
        assert_eq!(tools[0].function.name, "get_weather");
        assert_eq!(
            tools[0].function.parameters,
            json!({
                "type": "object",
                "properties": {"loc": {"type": "string"}},
                "required": ["loc"]
            })
        );
    }

    #[test]
    fn empty_tool_list_is_omitted() {
        let prepared = build(
            request(json!({
                "model": "m/x",
                "messages": [{"role": "user", "content": "Hi"}],
                "tools": []
            })),
            &test_config(),
        )
        .unwrap();

        assert!(prepared.upstream.tools.is_none());
    }

    #[test]
    fn missing_max_tokens_uses_configured_default() {
        let mut config = test_config();
        config.models.default_max_tokens = Some(2048);

        let prepared = build(
            request(json!({
                "model": "m/x",
                "messages": [{"role": "user", "content": "Hi"}]
            })),
            &config,
        )
        .unwrap();

        assert_eq!(prepared.upstream.max_tokens, Some(2048));
    }

    #[test]
    fn explicit_max_tokens_wins_over_default() {
        let mut config = test_config();
        config.models.default_max_tokens = Some(2048);

        let prepared = build(
            request(json!({
                "model": "m/x",
                "max_tokens": 64,
                "messages": [{"role": "user", "content": "Hi"}]
            })),
            &config,
        )
        .unwrap();

        assert_eq!(prepared.upstream.max_tokens, Some(64));
    }

    #[test]
    fn unknown_tool_result_id_is_rejected() {
        let err = build(
            request(json!({
                "model": "m/x",
                "messages": [{
                    "role": "user",
                    "content": [{"type": "tool_result", "tool_use_id": "nope", "content": "x"}]
                }]
            })),
            &test_config(),
        )
        .unwrap_err();

        assert!(err.client_message().contains("tool_result references unknown id"));
    }

    #[test]
    fn sampling_parameters_are_copied() {
        let prepared = build(
            request(json!({
                "model": "m/x",
                "max_tokens": 100,
                "temperature": 0.5,
                "top_p": 0.9,
                "stop_sequences": ["END"],
                "stream": true,
                "messages": [{"role": "user", "content": "Hi"}]
            })),
            &test_config(),
        )
        .unwrap();

        assert!(prepared.stream);
        assert_eq!(prepared.upstream.stream, Some(true));
        assert_eq!(prepared.upstream.max_tokens, Some(100));
        assert_eq!(prepared.upstream.temperature, Some(0.5));
        assert_eq!(prepared.upstream.top_p, Some(0.9));
        assert_eq!(prepared.upstream.stop.as_deref(), Some(&["END".to_string()][..]));
    }

    #[test]
    fn provider_hint_is_attached_from_config() {
        let mut config = test_config();
        config.upstream.provider = Some(config::ProviderRoutingConfig {
            order: vec!["fireworks".to_string()],
            allow_fallbacks: false,
        });

        let prepared = build(
            request(json!({
                "model": "m/x",
                "messages": [{"role": "user", "content": "Hi"}]
            })),
            &config,
        )
        .unwrap();

        let provider = prepared.upstream.provider.as_ref().unwrap();
        assert_eq!(provider.order, vec!["fireworks"]);
    }

    #[test]
    fn format_follows_the_resolved_model() {
        let mut config = test_config();
        config.models.sonnet = Some("moonshotai/kimi-k2".to_string());

        let prepared = build(
            request(json!({
                "model": "claude-3-sonnet",
                "messages": [{"role": "user", "content": "Hi"}]
            })),
            &config,
        )
        .unwrap();

        assert_eq!(prepared.format, UpstreamFormat::KimiSpecialToken);
    }
}
