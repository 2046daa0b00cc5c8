//! Upstream-dialect response to client-dialect response transformation.

use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{ProxyError, Result},
    format::UpstreamFormat,
    kimi,
    messages::{
        anthropic::{ContentBlock, MessagesResponse, Role, StopReason, Usage},
        openai::{ChatCompletionResponse, FinishReason, FunctionCall, ToolCall, ToolCallType},
    },
};

/// Rebuild a client response from an upstream response.
pub fn into_client_response(
    response: ChatCompletionResponse,
    requested_model: &str,
    format: UpstreamFormat,
) -> Result<MessagesResponse> {
    let usage = response.usage.unwrap_or_default();

    let Some(choice) = response.choices.into_iter().next() else {
        return Err(ProxyError::UpstreamProtocol("no choices".to_string()));
    };

    let message = choice.message;
    let mut content = Vec::new();
    let mut extracted_from_content = false;

    match format {
        UpstreamFormat::KimiSpecialToken => {
            let text = message.content.unwrap_or_default();

            match kimi::split_content(&text)? {
                Some((before, section, after)) => {
                    extracted_from_content = true;

                    if !before.is_empty() {
                        content.push(ContentBlock::Text {
                            text: before.to_string(),
                        });
                    }

                    for call in kimi::parse_section(section)? {
                        content.push(tool_use_block(&call.id, &call.name, &call.arguments));
                    }

                    if !after.is_empty() {
                        content.push(ContentBlock::Text {
                            text: after.to_string(),
                        });
                    }
                }
                None => {
                    if !text.is_empty() {
                        content.push(ContentBlock::Text { text });
                    }
                }
            }
        }
        UpstreamFormat::Standard | UpstreamFormat::DeepSeekLike | UpstreamFormat::QwenHermes => {
            let calls = collect_tool_calls(message.tool_calls, message.function_call, format);

            for call in &calls {
                content.push(tool_use_block(&call.id, &call.function.name, &call.function.arguments));
            }

            if let Some(text) = message.content
                && !text.is_empty()
            {
                content.push(ContentBlock::Text { text });
            }
        }
    }

    let has_tool_use = content.iter().any(|block| matches!(block, ContentBlock::ToolUse { .. }));
    let mut stop_reason = map_finish_reason(choice.finish_reason.as_ref());

    // The special-token envelope hides tool calls from the upstream's own
    // finish accounting.
    if extracted_from_content && has_tool_use && stop_reason == StopReason::EndTurn {
        stop_reason = StopReason::ToolUse;
    }

    Ok(MessagesResponse {
        id: if response.id.is_empty() {
            fresh_message_id()
        } else {
            response.id
        },
        r#type: "message".to_string(),
        role: Role::Assistant,
        content,
        model: requested_model.to_string(),
        stop_reason: Some(stop_reason),
        stop_sequence: None,
        usage: Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        },
    })
}

/// Collect tool calls from a response message, synthesizing an entry from
/// the legacy `function_call` object when the Qwen variant omits the array.
fn collect_tool_calls(
    tool_calls: Option<Vec<ToolCall>>,
    function_call: Option<FunctionCall>,
    format: UpstreamFormat,
) -> Vec<ToolCall> {
    if let Some(calls) = tool_calls {
        return calls;
    }

    if format == UpstreamFormat::QwenHermes
        && let Some(function) = function_call
    {
        return vec![ToolCall {
            id: synthetic_tool_call_id(),
            tool_type: ToolCallType::Function,
            function,
        }];
    }

    Vec::new()
}

fn tool_use_block(id: &str, name: &str, arguments: &str) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        input: decode_arguments(arguments),
    }
}

/// Decode a serialized arguments document, falling back to `{}` so a
/// malformed payload does not fail the whole response.
fn decode_arguments(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Object(serde_json::Map::new());
    }

    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("Failed to decode tool-call arguments, substituting empty input: {err}");
            Value::Object(serde_json::Map::new())
        }
    }
}

/// Map an upstream finish reason to a client stop reason.
pub(crate) fn map_finish_reason(reason: Option<&FinishReason>) -> StopReason {
    match reason {
        Some(FinishReason::Stop) => StopReason::EndTurn,
        Some(FinishReason::Length) => StopReason::MaxTokens,
        Some(FinishReason::ToolCalls) | Some(FinishReason::FunctionCall) => StopReason::ToolUse,
        Some(FinishReason::ContentFilter) => StopReason::StopSequence,
        Some(FinishReason::Other(_)) | None => StopReason::EndTurn,
    }
}

/// A locally-unique opaque id for tool calls the upstream did not identify.
pub(crate) fn synthetic_tool_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// A fresh message id for responses the upstream did not identify.
pub(crate) fn fresh_message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}
