//! Message types for the two chat-completion dialects the proxy speaks.
//!
//! The `anthropic` module holds the client dialect (Messages API shape),
//! the `openai` module the upstream dialect (Chat Completions shape).

pub mod anthropic;
pub mod openai;
