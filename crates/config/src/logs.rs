//! Logging configuration.

use std::path::PathBuf;

use serde::Deserialize;

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Log filter string, e.g. `info` or `translate=debug,server=debug`.
    pub filter: String,

    /// Output format for log records.
    pub format: LogFormat,

    /// Optional log file. Records are appended in addition to stderr.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

/// Log record output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line records.
    #[default]
    Pretty,
    /// One JSON object per record.
    Json,
}
