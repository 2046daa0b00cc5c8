//! Athena configuration structures to map the athena.toml configuration.

#![deny(missing_docs)]

mod loader;
mod logs;
mod models;
mod server;
mod upstream;

use std::path::Path;

pub use logs::{LogConfig, LogFormat};
pub use models::ModelsConfig;
use serde::Deserialize;
pub use server::ServerConfig;
pub use upstream::{ProviderRoutingConfig, UpstreamConfig};

/// Main configuration structure for the Athena proxy.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// Upstream aggregator configuration settings.
    pub upstream: UpstreamConfig,
    /// Model resolution configuration.
    pub models: ModelsConfig,
    /// Logging configuration.
    pub log: LogConfig,
}

impl Config {
    /// Load configuration with the documented precedence: environment
    /// variables override the explicit config path, which overrides a
    /// discovered `athena.toml` in the working directory, which overrides
    /// the hard-coded defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        let mut config = loader::load(path)?;
        loader::apply_env(&mut config, |name| std::env::var(name).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Validates that the configuration is complete enough to start.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.server.listen_address().port(), 3000);
        assert_eq!(config.upstream.base_url, "https://openrouter.ai/api");
        assert_eq!(config.upstream.connect_timeout_secs, 10);
        assert_eq!(config.upstream.read_timeout_secs, 120);
        assert_eq!(config.models.default, "openrouter/auto");
        assert_eq!(config.log.filter, "info");
        assert!(config.upstream.api_key.is_none());
    }

    #[test]
    fn full_config() {
        let config: Config = toml::from_str(indoc::indoc! {r#"
            [server]
            listen_address = "127.0.0.1:8091"

            [upstream]
            base_url = "https://openrouter.ai/api"
            api_key = "sk-or-test"
            read_timeout_secs = 30

            [upstream.provider]
            order = ["fireworks", "together"]
            allow_fallbacks = false

            [models]
            default = "anthropic/claude-sonnet-4"
            opus = "anthropic/claude-opus-4"
            sonnet = "anthropic/claude-sonnet-4"
            haiku = "anthropic/claude-3.5-haiku"
            default_max_tokens = 4096

            [log]
            filter = "translate=debug"
            format = "json"
            file = "/var/log/athena.log"
        "#})
        .unwrap();

        assert_eq!(config.server.listen_address().port(), 8091);
        assert!(config.upstream.api_key.is_some());
        assert_eq!(config.upstream.read_timeout_secs, 30);

        let provider = config.upstream.provider.as_ref().unwrap();
        assert_eq!(provider.order, vec!["fireworks", "together"]);
        assert!(!provider.allow_fallbacks);

        assert_eq!(config.models.opus.as_deref(), Some("anthropic/claude-opus-4"));
        assert_eq!(config.models.default_max_tokens, Some(4096));
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.file.as_deref().unwrap().to_str(), Some("/var/log/athena.log"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<Config, _> = toml::from_str(indoc::indoc! {r#"
            [upstream]
            api_keey = "typo"
        "#});

        assert!(result.is_err());
    }
}
