//! Model resolution configuration.

use serde::Deserialize;

/// Maps client-supplied model names to upstream model ids.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelsConfig {
    /// Upstream model id used when no override matches.
    pub default: String,

    /// Override for model names containing the `opus` token.
    pub opus: Option<String>,

    /// Override for model names containing the `sonnet` token.
    pub sonnet: Option<String>,

    /// Override for model names containing the `haiku` token.
    pub haiku: Option<String>,

    /// Maximum output tokens applied when the request does not specify one.
    pub default_max_tokens: Option<u32>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default: "openrouter/auto".to_string(),
            opus: None,
            sonnet: None,
            haiku: None,
            default_max_tokens: None,
        }
    }
}
