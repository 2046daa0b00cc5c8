//! Client model name to upstream model id resolution.

use config::ModelsConfig;

use crate::error::{ProxyError, Result};

/// Resolve a client-supplied model identifier to an upstream model id.
///
/// An identifier containing `/` is treated as already qualified and passes
/// through untouched. Otherwise the identifier is matched case-insensitively
/// against the `opus`/`sonnet`/`haiku` tokens and their configured
/// overrides, falling back to the configured default model.
pub fn resolve(model: &str, config: &ModelsConfig) -> Result<String> {
    if model.trim().is_empty() {
        return Err(ProxyError::BadRequest("model required".to_string()));
    }

    if model.contains('/') {
        return Ok(model.to_string());
    }

    let lowered = model.to_ascii_lowercase();

    let override_for = |token: &str, configured: &Option<String>| {
        lowered.contains(token).then(|| configured.clone()).flatten()
    };

    let resolved = override_for("opus", &config.opus)
        .or_else(|| override_for("sonnet", &config.sonnet))
        .or_else(|| override_for("haiku", &config.haiku))
        .unwrap_or_else(|| config.default.clone());

    log::debug!("Resolved model '{model}' to '{resolved}'");

    Ok(resolved)
}
