//! Configuration loading and validation.
//!
//! Precedence, highest first: `ATHENA_*` environment variables, the explicit
//! config path, a discovered `athena.toml` in the working directory, the
//! hard-coded defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use indoc::indoc;
use secrecy::SecretString;

use crate::{Config, LogFormat};

const DISCOVERED_CONFIG: &str = "athena.toml";

pub(crate) fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => discover(),
    };

    let Some(path) = path else {
        log::debug!("No configuration file found, using defaults");
        return Ok(Config::default());
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration file {}", path.display()))?;

    let config = toml::from_str(&content)
        .with_context(|| format!("failed to parse configuration file {}", path.display()))?;

    log::debug!("Loaded configuration from {}", path.display());

    Ok(config)
}

fn discover() -> Option<PathBuf> {
    let path = PathBuf::from(DISCOVERED_CONFIG);
    path.is_file().then_some(path)
}

/// Apply `ATHENA_*` environment overrides on top of a loaded configuration.
///
/// The lookup function is injected so tests do not depend on process state.
pub(crate) fn apply_env<F>(config: &mut Config, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("ATHENA_PORT") {
        let port: u16 = port
            .parse()
            .with_context(|| format!("ATHENA_PORT is not a valid port number: {port}"))?;

        config.server.set_port(port);
    }

    if let Some(key) = lookup("ATHENA_API_KEY") {
        config.upstream.api_key = Some(SecretString::from(key));
    }

    if let Some(url) = lookup("ATHENA_BASE_URL") {
        config.upstream.base_url = url;
    }

    if let Some(model) = lookup("ATHENA_MODEL") {
        config.models.default = model;
    }

    if let Some(model) = lookup("ATHENA_OPUS_MODEL") {
        config.models.opus = Some(model);
    }

    if let Some(model) = lookup("ATHENA_SONNET_MODEL") {
        config.models.sonnet = Some(model);
    }

    if let Some(model) = lookup("ATHENA_HAIKU_MODEL") {
        config.models.haiku = Some(model);
    }

    if let Some(format) = lookup("ATHENA_LOG_FORMAT") {
        config.log.format = match format.as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => bail!("ATHENA_LOG_FORMAT must be 'pretty' or 'json', got '{other}'"),
        };
    }

    if let Some(file) = lookup("ATHENA_LOG_FILE") {
        config.log.file = Some(PathBuf::from(file));
    }

    Ok(())
}

pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    if config.upstream.api_key.is_none() {
        bail!(indoc! {r#"
            No upstream API key configured. Athena needs a key to authenticate
            against the aggregator when the caller does not supply one.

            Either export it:

              ATHENA_API_KEY=sk-or-...

            or add it to athena.toml:

              [upstream]
              api_key = "sk-or-..."
        "#});
    }

    if config.upstream.base_url.is_empty() {
        bail!("upstream.base_url must not be empty");
    }

    if config.models.default.is_empty() {
        bail!(indoc! {r#"
            No default model configured. Set one in athena.toml:

              [models]
              default = "anthropic/claude-sonnet-4"

            or export ATHENA_MODEL.
        "#});
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: Config = toml::from_str(indoc! {r#"
            [server]
            listen_address = "127.0.0.1:9000"

            [models]
            default = "from-file"
            sonnet = "from-file-sonnet"
        "#})
        .unwrap();

        let vars = env(&[
            ("ATHENA_PORT", "4242"),
            ("ATHENA_MODEL", "from-env"),
            ("ATHENA_API_KEY", "sk-or-env"),
            ("ATHENA_LOG_FORMAT", "json"),
        ]);

        apply_env(&mut config, |name| vars.get(name).cloned()).unwrap();

        // The host from the file is kept, only the port changes.
        let address = config.server.listen_address();
        assert_eq!(address.port(), 4242);
        assert!(address.ip().is_loopback());

        assert_eq!(config.models.default, "from-env");
        assert_eq!(config.models.sonnet.as_deref(), Some("from-file-sonnet"));
        assert_eq!(config.log.format, LogFormat::Json);
        assert!(config.upstream.api_key.is_some());
    }

    #[test]
    fn invalid_port_fails() {
        let mut config = Config::default();
        let vars = env(&[("ATHENA_PORT", "not-a-port")]);

        let err = apply_env(&mut config, |name| vars.get(name).cloned()).unwrap_err();
        assert!(err.to_string().contains("ATHENA_PORT"));
    }

    #[test]
    fn invalid_log_format_fails() {
        let mut config = Config::default();
        let vars = env(&[("ATHENA_LOG_FORMAT", "yaml")]);

        assert!(apply_env(&mut config, |name| vars.get(name).cloned()).is_err());
    }

    #[test]
    fn missing_api_key_fails_validation() {
        let config = Config::default();
        let err = validate(&config).unwrap_err();

        assert!(err.to_string().contains("ATHENA_API_KEY"));
    }

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");

        std::fs::write(
            &path,
            indoc! {r#"
                [models]
                default = "anthropic/claude-sonnet-4"
            "#},
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.models.default, "anthropic/claude-sonnet-4");
    }

    #[test]
    fn explicit_missing_path_fails() {
        let err = load(Some(Path::new("/does/not/exist/athena.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn process_env_is_picked_up() {
        temp_env::with_var("ATHENA_BASE_URL", Some("https://example.test/api"), || {
            let mut config = Config::default();
            apply_env(&mut config, |name| std::env::var(name).ok()).unwrap();

            assert_eq!(config.upstream.base_url, "https://example.test/api");
        });
    }
}
