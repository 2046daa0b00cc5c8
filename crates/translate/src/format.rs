//! Upstream tool-call dialect detection.
//!
//! Different upstream model families deliver tool calls differently: most
//! use the standard `tool_calls` array, Qwen-family models may fall back to
//! the legacy `function_call` object, and Kimi models embed tool calls in
//! the content text behind special-token markers.

use std::fmt;

/// How a given upstream model delivers tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFormat {
    /// Standard `tool_calls` array.
    Standard,
    /// Behaviorally identical to `Standard`, distinguished for diagnostics.
    DeepSeekLike,
    /// `tool_calls` array, with a legacy `function_call` fallback.
    QwenHermes,
    /// Tool calls embedded in content text behind special-token markers.
    KimiSpecialToken,
}

impl UpstreamFormat {
    /// Classify an upstream model id.
    ///
    /// Ids of the form `vendor/model` are classified by vendor prefix first.
    /// Unknown vendors and bare ids fall through to substring checks with
    /// precedence Kimi > Qwen > DeepSeek > Standard.
    pub fn detect(model: &str) -> Self {
        let lowered = model.to_ascii_lowercase();

        if lowered.matches('/').count() == 1
            && let Some((vendor, _)) = lowered.split_once('/')
        {
            if vendor.starts_with("moonshot") {
                return Self::KimiSpecialToken;
            }

            if vendor.starts_with("qwen") {
                return Self::QwenHermes;
            }

            if vendor.starts_with("deepseek") {
                return Self::DeepSeekLike;
            }
        }

        if lowered.contains("kimi") || lowered.contains("-k2") {
            Self::KimiSpecialToken
        } else if lowered.contains("qwen") {
            Self::QwenHermes
        } else if lowered.contains("deepseek") {
            Self::DeepSeekLike
        } else {
            Self::Standard
        }
    }
}

impl fmt::Display for UpstreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamFormat::Standard => write!(f, "standard"),
            UpstreamFormat::DeepSeekLike => write!(f, "deepseek"),
            UpstreamFormat::QwenHermes => write!(f, "qwen"),
            UpstreamFormat::KimiSpecialToken => write!(f, "kimi"),
        }
    }
}
