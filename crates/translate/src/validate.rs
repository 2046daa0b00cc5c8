//! Tool-call consistency validation over assembled upstream conversations.

use std::collections::HashSet;

use crate::{
    error::{ProxyError, Result},
    messages::openai::{ChatMessage, ChatRole},
};

/// Assert that every `tool` message answers a tool call declared by an
/// earlier assistant message.
///
/// Unresolved tool calls (declared but not yet answered) are allowed: the
/// client may be about to resolve them in a later turn.
pub(crate) fn check_tool_consistency(messages: &[ChatMessage]) -> Result<()> {
    let mut declared: HashSet<&str> = HashSet::new();

    for message in messages {
        match message.role {
            ChatRole::Assistant => {
                if let Some(calls) = &message.tool_calls {
                    declared.extend(calls.iter().map(|call| call.id.as_str()));
                }
            }
            ChatRole::Tool => {
                let id = message.tool_call_id.as_deref().unwrap_or_default();

                if !declared.contains(id) {
                    return Err(ProxyError::BadRequest(format!(
                        "tool_result references unknown id: {id}"
                    )));
                }
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::openai::{FunctionCall, ToolCall, ToolCallType};

    fn assistant_with_call(id: &str) -> ChatMessage {
        ChatMessage {
            role: ChatRole::Assistant,
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: id.to_string(),
                tool_type: ToolCallType::Function,
                function: FunctionCall {
                    name: "f".to_string(),
                    arguments: "{}".to_string(),
                },
            }]),
            tool_call_id: None,
        }
    }

    fn tool_result(id: &str) -> ChatMessage {
        ChatMessage {
            role: ChatRole::Tool,
            content: Some("42".to_string()),
            tool_calls: None,
            tool_call_id: Some(id.to_string()),
        }
    }

    #[test]
    fn matched_result_is_accepted() {
        let messages = vec![
            ChatMessage::text(ChatRole::User, "Hi"),
            assistant_with_call("t1"),
            tool_result("t1"),
        ];

        assert!(check_tool_consistency(&messages).is_ok());
    }

    #[test]
    fn unknown_id_is_rejected() {
        let messages = vec![assistant_with_call("t1"), tool_result("nope")];

        let err = check_tool_consistency(&messages).unwrap_err();
        assert!(err.client_message().contains("tool_result references unknown id"));
    }

    #[test]
    fn result_before_declaration_is_rejected() {
        let messages = vec![tool_result("t1"), assistant_with_call("t1")];

        assert!(check_tool_consistency(&messages).is_err());
    }

    #[test]
    fn unresolved_calls_are_allowed() {
        let messages = vec![assistant_with_call("t1"), assistant_with_call("t2"), tool_result("t1")];

        assert!(check_tool_consistency(&messages).is_ok());
    }
}
