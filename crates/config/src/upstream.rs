//! Upstream aggregator configuration.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Configuration for the upstream chat-completions aggregator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Base URL of the aggregator. The proxy posts to
    /// `<base_url>/v1/chat/completions`.
    pub base_url: String,

    /// API key sent as `Authorization: Bearer <key>` when the caller does
    /// not supply its own credential header.
    pub api_key: Option<SecretString>,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds. For streaming responses this bounds the
    /// time between consecutive upstream chunks.
    pub read_timeout_secs: u64,

    /// Optional provider routing hint forwarded verbatim to the aggregator.
    pub provider: Option<ProviderRoutingConfig>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api".to_string(),
            api_key: None,
            connect_timeout_secs: 10,
            read_timeout_secs: 120,
            provider: None,
        }
    }
}

/// Provider routing preferences, in the aggregator's own wire shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderRoutingConfig {
    /// Ordered list of preferred providers.
    pub order: Vec<String>,
    /// Whether the aggregator may fall back to providers not in the list.
    pub allow_fallbacks: bool,
}

impl Default for ProviderRoutingConfig {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            allow_fallbacks: true,
        }
    }
}
