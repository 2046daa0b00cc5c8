//! Kimi special-token tool-call envelopes.
//!
//! Kimi-family upstreams deliver tool calls inside the content text, framed
//! by literal markers:
//!
//! ```text
//! <|tool_calls_section_begin|>
//!   <|tool_call_begin|> functions.NAME:INDEX
//!   <|tool_call_argument_begin|> {...json...} <|tool_call_end|>
//! <|tool_calls_section_end|>
//! ```
//!
//! In streaming mode the markers may be split arbitrarily across chunks, so
//! the [`SectionScanner`] keeps the smallest possible tail that could still
//! turn out to be a marker prefix and buffers section bytes until the end
//! marker arrives, bounded by [`BUFFER_LIMIT`].

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ProxyError, Result};

pub(crate) const SECTION_BEGIN: &str = "<|tool_calls_section_begin|>";
pub(crate) const SECTION_END: &str = "<|tool_calls_section_end|>";

/// Upper bound on buffered special-token content, in bytes.
pub(crate) const BUFFER_LIMIT: usize = 10 * 1024;

/// One tool call extracted from a section.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedToolCall {
    /// The full marker id, e.g. `functions.get_weather:0`.
    pub id: String,
    /// The tool name extracted from the id.
    pub name: String,
    /// The serialized JSON arguments, verbatim.
    pub arguments: String,
}

fn tool_call_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();

    REGEX.get_or_init(|| {
        Regex::new(r"(?s)<\|tool_call_begin\|>\s*(.*?)\s*<\|tool_call_argument_begin\|>(.*?)<\|tool_call_end\|>")
            .expect("tool-call pattern is valid")
    })
}

/// Extract the tool name from a marker id of the shape `functions.NAME:INDEX`.
fn tool_name(id: &str) -> &str {
    let id = id.strip_prefix("functions.").unwrap_or(id);
    id.rsplit_once(':').map(|(name, _)| name).unwrap_or(id)
}

/// Parse the inner region of a tool-call section.
pub(crate) fn parse_section(section: &str) -> Result<Vec<ParsedToolCall>> {
    let calls: Vec<ParsedToolCall> = tool_call_regex()
        .captures_iter(section)
        .map(|captures| {
            let id = captures[1].to_string();
            let name = tool_name(&id).to_string();
            let arguments = captures[2].trim().to_string();

            ParsedToolCall { id, name, arguments }
        })
        .collect();

    if calls.is_empty() {
        return Err(ProxyError::UpstreamProtocol(
            "tool-call section contains no parseable tool calls".to_string(),
        ));
    }

    Ok(calls)
}

/// Split a complete content string around its tool-call section.
///
/// Returns `None` when the content has no section. A begin marker without
/// a matching end marker is a protocol error.
pub(crate) fn split_content(content: &str) -> Result<Option<(&str, &str, &str)>> {
    let Some(begin) = content.find(SECTION_BEGIN) else {
        return Ok(None);
    };

    let section_start = begin + SECTION_BEGIN.len();

    let Some(end) = content[section_start..].find(SECTION_END) else {
        return Err(ProxyError::UpstreamProtocol(
            "unterminated tool-call section in content".to_string(),
        ));
    };

    let before = &content[..begin];
    let section = &content[section_start..section_start + end];
    let after = &content[section_start + end + SECTION_END.len()..];

    Ok(Some((before, section, after)))
}

/// Output of feeding one chunk into the [`SectionScanner`].
#[derive(Debug, PartialEq)]
pub(crate) enum Scan {
    /// Plain text proven to contain no marker prefix.
    Text(String),
    /// A complete tool-call section was closed.
    ToolCalls(Vec<ParsedToolCall>),
}

/// Incremental scanner for special-token sections in a content stream.
#[derive(Debug, Default)]
pub(crate) struct SectionScanner {
    buffer: String,
    in_section: bool,
}

impl SectionScanner {
    /// Feed one content chunk, producing text and tool-call outputs in order.
    pub fn push(&mut self, chunk: &str) -> Result<Vec<Scan>> {
        self.buffer.push_str(chunk);

        let mut output = Vec::new();

        loop {
            if self.in_section {
                let Some(end) = self.buffer.find(SECTION_END) else {
                    if self.buffer.len() > BUFFER_LIMIT {
                        return Err(ProxyError::UpstreamProtocol(format!(
                            "tool-call section exceeded the {BUFFER_LIMIT}-byte buffer limit"
                        )));
                    }

                    break;
                };

                let calls = parse_section(&self.buffer[..end])?;
                output.push(Scan::ToolCalls(calls));

                self.buffer.drain(..end + SECTION_END.len());
                self.in_section = false;

                continue;
            }

            if let Some(begin) = self.buffer.find(SECTION_BEGIN) {
                if begin > 0 {
                    output.push(Scan::Text(self.buffer[..begin].to_string()));
                }

                self.buffer.drain(..begin + SECTION_BEGIN.len());
                self.in_section = true;

                continue;
            }

            // No full begin marker. Flush everything except a tail that is
            // still a prefix of the marker.
            let tail = partial_marker_suffix(&self.buffer);
            let safe = self.buffer.len() - tail;

            if safe > 0 {
                let text: String = self.buffer.drain(..safe).collect();
                output.push(Scan::Text(text));
            }

            break;
        }

        Ok(output)
    }

    /// Whether the scanner is inside an unterminated section.
    pub fn in_section(&self) -> bool {
        self.in_section
    }

    /// Drain the scanner at end of stream.
    ///
    /// Returns the pending partial-marker tail as text when the stream ended
    /// outside a section, `None` when it ended inside one (the section was
    /// truncated upstream and its bytes are dropped).
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);

        if self.in_section {
            self.in_section = false;
            return None;
        }

        (!rest.is_empty()).then_some(rest)
    }
}

/// Length of the longest buffer suffix that is a proper prefix of the begin
/// marker. Those bytes may not be flushed as text yet.
fn partial_marker_suffix(buffer: &str) -> usize {
    let max = (SECTION_BEGIN.len() - 1).min(buffer.len());

    (1..=max)
        .rev()
        .find(|&len| buffer.as_bytes().ends_with(&SECTION_BEGIN.as_bytes()[..len]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_call() {
        let section = r#"<|tool_call_begin|>functions.go:0<|tool_call_argument_begin|>{"d":1}<|tool_call_end|>"#;
        let calls = parse_section(section).unwrap();

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "functions.go:0");
        assert_eq!(calls[0].name, "go");
        assert_eq!(calls[0].arguments, r#"{"d":1}"#);
    }

    #[test]
    fn parse_multiple_calls() {
        let section = concat!(
            r#"<|tool_call_begin|>functions.get_weather:0<|tool_call_argument_begin|>{"loc":"Tokyo"}<|tool_call_end|>"#,
            "\n",
            r#"<|tool_call_begin|>functions.search:1<|tool_call_argument_begin|>{"q":"x"}<|tool_call_end|>"#,
        );

        let calls = parse_section(section).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(calls[1].name, "search");
        assert_eq!(calls[1].id, "functions.search:1");
    }

    #[test]
    fn empty_section_is_a_protocol_error() {
        assert!(parse_section("garbage without markers").is_err());
    }

    #[test]
    fn split_around_section() {
        let content = format!(
            "thinking...{SECTION_BEGIN}<|tool_call_begin|>functions.go:0<|tool_call_argument_begin|>{{}}<|tool_call_end|>{SECTION_END}done"
        );

        let (before, section, after) = split_content(&content).unwrap().unwrap();
        assert_eq!(before, "thinking...");
        assert_eq!(after, "done");
        assert!(section.contains("functions.go:0"));
    }

    #[test]
    fn split_without_section() {
        assert!(split_content("plain text").unwrap().is_none());
    }

    #[test]
    fn split_unterminated_section_fails() {
        let content = format!("text{SECTION_BEGIN}never closed");
        assert!(split_content(&content).is_err());
    }

    #[test]
    fn scanner_passes_plain_text_through() {
        let mut scanner = SectionScanner::default();

        let output = scanner.push("hello world").unwrap();
        assert_eq!(output, vec![Scan::Text("hello world".to_string())]);
        assert!(scanner.finish().is_none());
    }

    #[test]
    fn scanner_holds_back_partial_marker() {
        let mut scanner = SectionScanner::default();

        let output = scanner.push("pre<|tool_calls_sec").unwrap();
        assert_eq!(output, vec![Scan::Text("pre".to_string())]);

        // The tail completes into a marker followed by a full call.
        let output = scanner
            .push(r#"tion_begin|><|tool_call_begin|>functions.x:0<|tool_call_argument_begin|>{"k":"#)
            .unwrap();
        assert!(output.is_empty());
        assert!(scanner.in_section());

        let output = scanner
            .push(r#"42}<|tool_call_end|><|tool_calls_section_end|>post"#)
            .unwrap();

        assert_eq!(
            output,
            vec![
                Scan::ToolCalls(vec![ParsedToolCall {
                    id: "functions.x:0".to_string(),
                    name: "x".to_string(),
                    arguments: r#"{"k":42}"#.to_string(),
                }]),
                Scan::Text("post".to_string()),
            ]
        );
        assert!(!scanner.in_section());
    }

    #[test]
    fn scanner_flushes_false_prefix_on_finish() {
        let mut scanner = SectionScanner::default();

        // "<|" is a marker prefix and must not be emitted yet.
        let output = scanner.push("tail ends with <|").unwrap();
        assert_eq!(output, vec![Scan::Text("tail ends with ".to_string())]);

        // Stream ends: the held-back bytes were ordinary text after all.
        assert_eq!(scanner.finish().as_deref(), Some("<|"));
    }

    #[test]
    fn scanner_drops_truncated_section() {
        let mut scanner = SectionScanner::default();

        scanner
            .push("<|tool_calls_section_begin|><|tool_call_begin|>functions.x:0")
            .unwrap();
        assert!(scanner.in_section());

        assert!(scanner.finish().is_none());
        assert!(!scanner.in_section());
    }

    #[test]
    fn scanner_enforces_buffer_limit() {
        let mut scanner = SectionScanner::default();
        scanner.push(SECTION_BEGIN).unwrap();

        let filler = "x".repeat(4096);
        scanner.push(&filler).unwrap();
        scanner.push(&filler).unwrap();

        let err = scanner.push(&filler).unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamProtocol(_)));
    }

    #[test]
    fn scanner_handles_marker_split_at_every_byte() {
        let content = format!(
            "a{SECTION_BEGIN}<|tool_call_begin|>functions.f:0<|tool_call_argument_begin|>{{\"n\":7}}<|tool_call_end|>{SECTION_END}b"
        );

        for split in 1..content.len() {
            if !content.is_char_boundary(split) {
                continue;
            }

            let mut scanner = SectionScanner::default();
            let mut text = String::new();
            let mut calls = Vec::new();

            for part in [&content[..split], &content[split..]] {
                for scan in scanner.push(part).unwrap() {
                    match scan {
                        Scan::Text(t) => text.push_str(&t),
                        Scan::ToolCalls(c) => calls.extend(c),
                    }
                }
            }

            if let Some(rest) = scanner.finish() {
                text.push_str(&rest);
            }

            assert_eq!(text, "ab", "split at byte {split}");
            assert_eq!(calls.len(), 1, "split at byte {split}");
            assert_eq!(calls[0].arguments, r#"{"n":7}"#);
        }
    }
}
