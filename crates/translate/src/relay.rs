//! The streaming relay: upstream chat-completion chunks in, client-dialect
//! stream events out.
//!
//! One relay instance owns all per-request streaming state. The caller
//! feeds it upstream chunks in order and emits the returned events in
//! order; the relay guarantees the client-side event grammar: exactly one
//! `message_start`, properly paired `content_block_start`/`_stop` with
//! strictly ascending indices, one `message_delta`, one `message_stop`.

use std::collections::HashMap;

use serde_json::Value;

use crate::{
    error::{ProxyError, Result},
    format::UpstreamFormat,
    kimi::{Scan, SectionScanner},
    messages::{
        anthropic::{
            ContentBlock, ContentDelta, MessageDeltaBody, MessageStart, Role, StopReason, StreamEvent, Usage,
        },
        openai::{ChatCompletionChunk, FinishReason, StreamingFunction, StreamingToolCall, Usage as UpstreamUsage},
    },
    transform::response::{fresh_message_id, map_finish_reason, synthetic_tool_call_id},
};

/// How a streamed tool call is identified across chunks.
///
/// The upstream may identify a call by `id`, by array position, or not at
/// all. The id wins when present; a position maps to the key of the call
/// that was started for it; the legacy `function_call` object gets its own
/// key since it can never carry either.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ToolKey {
    Id(String),
    Position(usize),
    FunctionCall,
}

#[derive(Debug)]
enum OpenBlock {
    Text { index: u32 },
    Tool { key: ToolKey, index: u32 },
}

/// Per-request streaming state machine.
pub struct StreamRelay {
    message_id: String,
    model: String,
    format: UpstreamFormat,
    next_block_index: u32,
    open_block: Option<OpenBlock>,
    tool_blocks: HashMap<ToolKey, u32>,
    position_keys: HashMap<usize, ToolKey>,
    tool_args: HashMap<ToolKey, String>,
    scanner: SectionScanner,
    kimi_tools_emitted: bool,
    finish_reason: Option<FinishReason>,
    usage: Option<UpstreamUsage>,
    finished: bool,
}

impl StreamRelay {
    /// Create a relay for one streaming request.
    pub fn new(model: impl Into<String>, format: UpstreamFormat) -> Self {
        Self {
            message_id: fresh_message_id(),
            model: model.into(),
            format,
            next_block_index: 0,
            open_block: None,
            tool_blocks: HashMap::new(),
            position_keys: HashMap::new(),
            tool_args: HashMap::new(),
            scanner: SectionScanner::default(),
            kimi_tools_emitted: false,
            finish_reason: None,
            usage: None,
            finished: false,
        }
    }

    /// The `message_start` event, emitted before any upstream chunk is read.
    pub fn start_event(&self) -> StreamEvent {
        StreamEvent::MessageStart {
            message: MessageStart {
                id: self.message_id.clone(),
                r#type: "message".to_string(),
                role: Role::Assistant,
                content: vec![],
                model: self.model.clone(),
                usage: Usage::default(),
            },
        }
    }

    /// Translate one upstream chunk into zero or more client events.
    pub fn on_chunk(&mut self, chunk: ChatCompletionChunk) -> Result<Vec<StreamEvent>> {
        if self.finished {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(events);
        };

        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }

        let delta = choice.delta;

        if let Some(content) = delta.content
            && !content.is_empty()
        {
            if self.format == UpstreamFormat::KimiSpecialToken {
                self.scan_kimi(&content, &mut events)?;
            } else {
                self.push_text(&content, &mut events);
            }
        }

        if let Some(calls) = delta.tool_calls {
            for call in calls {
                self.push_tool_call(call, &mut events);
            }
        }

        if self.format == UpstreamFormat::QwenHermes
            && let Some(function) = delta.function_call
        {
            self.push_function_call(function, &mut events);
        }

        Ok(events)
    }

    /// Finalize the stream: close the open block, emit `message_delta` with
    /// the recorded stop reason and cumulative usage, then `message_stop`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();

        if self.format == UpstreamFormat::KimiSpecialToken {
            if self.scanner.in_section() {
                log::warn!("Stream ended inside an unterminated tool-call section, dropping buffered bytes");
                self.scanner.finish();
            } else if let Some(rest) = self.scanner.finish() {
                // A partial begin-marker prefix that never completed was
                // ordinary text after all.
                self.push_text(&rest, &mut events);
            }
        }

        self.close_open(&mut events);

        for (key, args) in &self.tool_args {
            if serde_json::from_str::<Value>(args).is_err() {
                log::warn!("Streamed tool call {key:?} ended with incomplete JSON arguments");
            }
        }

        let mut stop_reason = map_finish_reason(self.finish_reason.as_ref());

        if self.kimi_tools_emitted && stop_reason == StopReason::EndTurn {
            stop_reason = StopReason::ToolUse;
        }

        let usage = self.usage.map(upstream_usage).unwrap_or_default();

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(stop_reason),
                stop_sequence: None,
            },
            usage,
        });
        events.push(StreamEvent::MessageStop);

        self.finished = true;
        events
    }

    /// Mid-stream failure: emit one `error` event and `message_stop`. The
    /// HTTP status is already committed, so this is the only channel left.
    pub fn fail(&mut self, error: &ProxyError) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        self.finished = true;

        vec![StreamEvent::Error { error: error.body() }, StreamEvent::MessageStop]
    }

    fn scan_kimi(&mut self, content: &str, events: &mut Vec<StreamEvent>) -> Result<()> {
        for scan in self.scanner.push(content)? {
            match scan {
                Scan::Text(text) => self.push_text(&text, events),
                Scan::ToolCalls(calls) => {
                    self.close_open(events);

                    for call in calls {
                        let index = self.next_block_index;
                        self.next_block_index += 1;

                        events.push(StreamEvent::ContentBlockStart {
                            index,
                            content_block: ContentBlock::ToolUse {
                                id: call.id,
                                name: call.name,
                                input: empty_input(),
                            },
                        });
                        events.push(StreamEvent::ContentBlockDelta {
                            index,
                            delta: ContentDelta::InputJsonDelta {
                                partial_json: call.arguments,
                            },
                        });
                        events.push(StreamEvent::ContentBlockStop { index });
                    }

                    self.kimi_tools_emitted = true;
                }
            }
        }

        Ok(())
    }

    fn push_text(&mut self, text: &str, events: &mut Vec<StreamEvent>) {
        let index = self.ensure_text_open(events);

        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: ContentDelta::TextDelta { text: text.to_string() },
        });
    }

    fn push_tool_call(&mut self, call: StreamingToolCall, events: &mut Vec<StreamEvent>) {
        let key = self.tool_key(&call);

        if self.tool_blocks.contains_key(&key) {
            if let Some(arguments) = call.function.and_then(|function| function.arguments) {
                self.append_tool_args(&key, arguments, events);
            }

            return;
        }

        let id = call.id.unwrap_or_else(synthetic_tool_call_id);
        let name = call
            .function
            .as_ref()
            .and_then(|function| function.name.clone())
            .unwrap_or_default();

        self.start_tool_block(key.clone(), id, name, events);

        if let Some(position) = call.index {
            self.position_keys.insert(position, key.clone());
        }

        if let Some(arguments) = call.function.and_then(|function| function.arguments)
            && !arguments.is_empty()
        {
            self.append_tool_args(&key, arguments, events);
        }
    }

    fn push_function_call(&mut self, function: StreamingFunction, events: &mut Vec<StreamEvent>) {
        let key = ToolKey::FunctionCall;

        if !self.tool_blocks.contains_key(&key) {
            let name = function.name.clone().unwrap_or_default();
            self.start_tool_block(key.clone(), synthetic_tool_call_id(), name, events);
        }

        if let Some(arguments) = function.arguments
            && !arguments.is_empty()
        {
            self.append_tool_args(&key, arguments, events);
        }
    }

    /// Resolve the canonical key for a streamed tool-call entry: the id when
    /// present, then the key previously started for its position, then the
    /// currently open tool block, then position 0.
    fn tool_key(&self, call: &StreamingToolCall) -> ToolKey {
        if let Some(id) = &call.id {
            return ToolKey::Id(id.clone());
        }

        if let Some(position) = call.index {
            return self
                .position_keys
                .get(&position)
                .cloned()
                .unwrap_or(ToolKey::Position(position));
        }

        if let Some(OpenBlock::Tool { key, .. }) = &self.open_block {
            return key.clone();
        }

        ToolKey::Position(0)
    }

    fn start_tool_block(&mut self, key: ToolKey, id: String, name: String, events: &mut Vec<StreamEvent>) {
        self.close_open(events);

        let index = self.next_block_index;
        self.next_block_index += 1;

        events.push(StreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlock::ToolUse {
                id,
                name,
                input: empty_input(),
            },
        });

        self.tool_blocks.insert(key.clone(), index);
        self.tool_args.insert(key.clone(), String::new());
        self.open_block = Some(OpenBlock::Tool { key, index });
    }

    fn append_tool_args(&mut self, key: &ToolKey, arguments: String, events: &mut Vec<StreamEvent>) {
        if arguments.is_empty() {
            return;
        }

        let Some(&index) = self.tool_blocks.get(key) else {
            return;
        };

        if let Some(accumulated) = self.tool_args.get_mut(key) {
            accumulated.push_str(&arguments);
        }

        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: ContentDelta::InputJsonDelta {
                partial_json: arguments,
            },
        });
    }

    fn ensure_text_open(&mut self, events: &mut Vec<StreamEvent>) -> u32 {
        if let Some(OpenBlock::Text { index }) = &self.open_block {
            return *index;
        }

        self.close_open(events);

        let index = self.next_block_index;
        self.next_block_index += 1;

        events.push(StreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlock::Text { text: String::new() },
        });

        self.open_block = Some(OpenBlock::Text { index });

        index
    }

    fn close_open(&mut self, events: &mut Vec<StreamEvent>) {
        if let Some(block) = self.open_block.take() {
            let index = match block {
                OpenBlock::Text { index } => index,
                OpenBlock::Tool { index, .. } => index,
            };

            events.push(StreamEvent::ContentBlockStop { index });
        }
    }
}

fn empty_input() -> Value {
    Value::Object(serde_json::Map::new())
}

fn upstream_usage(usage: UpstreamUsage) -> Usage {
    Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    }
}
