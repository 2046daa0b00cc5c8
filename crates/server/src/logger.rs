//! Logger initialization for the server.

use std::{
    fmt::Write as _,
    fs::{File, OpenOptions},
    io::{IsTerminal as _, Write as _},
    str::FromStr as _,
    sync::{Mutex, Once},
};

use anyhow::Context as _;
use config::{LogConfig, LogFormat};
use jiff::{Zoned, tz::TimeZone};
use logforth::{
    append::{Append, Stderr},
    filter::EnvFilter,
    layout::Layout,
};

static INIT: Once = Once::new();

/// Initialize the logger from the logging configuration.
///
/// Records go to stderr, and additionally to the configured log file when
/// one is set. Repeated initialization is a no-op.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let file = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;

            Some(file)
        }
        None => None,
    };

    let filter = config.filter.clone();
    let format = config.format;

    INIT.call_once(move || apply_logger(filter, format, file));

    Ok(())
}

fn apply_logger(filter: String, format: LogFormat, file: Option<File>) {
    let mut builder = logforth::builder();

    {
        let filter = filter.clone();
        builder = builder.dispatch(move |d| {
            let filter = EnvFilter::from_str(&filter)
                .unwrap_or_else(|_| EnvFilter::from_str("info").expect("default filter should be valid"));

            let no_color = !std::io::stderr().is_terminal();

            d.filter(filter)
                .append(Stderr::default().with_layout(RecordLayout { format, no_color }))
        });
    }

    if let Some(file) = file {
        builder = builder.dispatch(move |d| {
            let filter = EnvFilter::from_str(&filter)
                .unwrap_or_else(|_| EnvFilter::from_str("info").expect("default filter should be valid"));

            d.filter(filter).append(FileAppender {
                format,
                file: Mutex::new(file),
            })
        });
    }

    builder.apply();
}

/// Layout producing UTC-timestamped records, pretty or JSON.
#[derive(Debug)]
struct RecordLayout {
    format: LogFormat,
    no_color: bool,
}

impl Layout for RecordLayout {
    fn format(
        &self,
        record: &log::Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        format_record(self.format, self.no_color, record)
    }
}

fn format_record(format: LogFormat, no_color: bool, record: &log::Record<'_>) -> anyhow::Result<Vec<u8>> {
    let timestamp = Zoned::now()
        .with_time_zone(TimeZone::UTC)
        .strftime("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string();

    match format {
        LogFormat::Json => {
            let record = serde_json::json!({
                "timestamp": timestamp,
                "level": record.level().as_str(),
                "target": record.target(),
                "message": record.args().to_string(),
            });

            Ok(serde_json::to_vec(&record)?)
        }
        LogFormat::Pretty => {
            let mut output = String::new();

            write!(output, "{timestamp} ")?;

            let level = if no_color {
                format!("{:>5}", record.level())
            } else {
                match record.level() {
                    log::Level::Error => format!("\x1b[31m{:>5}\x1b[0m", record.level()),
                    log::Level::Warn => format!("\x1b[33m{:>5}\x1b[0m", record.level()),
                    log::Level::Info => format!("\x1b[32m{:>5}\x1b[0m", record.level()),
                    log::Level::Debug => format!("\x1b[34m{:>5}\x1b[0m", record.level()),
                    log::Level::Trace => format!("\x1b[35m{:>5}\x1b[0m", record.level()),
                }
            };

            write!(output, "{level}  {}", record.args())?;

            Ok(output.into_bytes())
        }
    }
}

/// Appender writing formatted records to the configured log file.
#[derive(Debug)]
struct FileAppender {
    format: LogFormat,
    file: Mutex<File>,
}

impl Append for FileAppender {
    fn append(
        &self,
        record: &log::Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<()> {
        let mut bytes = format_record(self.format, true, record)?;
        bytes.push(b'\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("log file mutex poisoned"))?;

        file.write_all(&bytes)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_bytes(format: LogFormat) -> Vec<u8> {
        format_record(
            format,
            true,
            &log::Record::builder()
                .args(format_args!("hello"))
                .level(log::Level::Info)
                .target("test")
                .build(),
        )
        .unwrap()
    }

    #[test]
    fn json_records_are_valid_json() {
        let bytes = record_bytes(LogFormat::Json);
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["level"], "INFO");
        assert_eq!(value["message"], "hello");
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn pretty_records_contain_level_and_message() {
        let text = String::from_utf8(record_bytes(LogFormat::Pretty)).unwrap();

        assert!(text.contains("INFO"));
        assert!(text.ends_with("hello"));
    }
}
