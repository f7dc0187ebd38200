//! Record formatters.

use crate::{Record, Result};

use std::fmt::{Debug, Write};

use serde::Serialize;

/// ISO-8601 UTC with millisecond precision.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Renders a record into the bytes of one log line, without terminator.
pub trait Formatter: Debug + Send + Sync + 'static {
    /// Formats `record`.
    ///
    /// # Errors
    ///
    /// Returns an error when the record cannot be rendered.
    fn format(&self, record: &Record) -> Result<Vec<u8>>;
}

/// `[key] value | [key] value` lines. Absent fields are omitted.
#[derive(Clone, Copy, Debug, Default)]
pub struct LineFormatter;

impl Formatter for LineFormatter {
    fn format(&self, record: &Record) -> Result<Vec<u8>> {
        let line = LogLine::from(record);
        let mut out = String::new();

        let mut push = |key: &str, value: &dyn std::fmt::Display| {
            if !out.is_empty() {
                out.push_str(" | ");
            }
            let _ = write!(out, "[{key}] {value}");
        };

        push("timestamp", &line.timestamp);
        push("level", &line.level);
        push("process_id", &line.process_id);
        if let Some(thread) = line.thread_name {
            push("thread_name", &thread);
        }
        push("logger_name", &line.logger_name);
        if let Some(module) = line.module {
            push("module", &module);
        }
        if let Some(file) = line.filename {
            push("filename", &file);
        }
        if let Some(number) = line.line_number {
            push("line_number", &number);
        }
        push("message", &line.message);
        if let Some(exception) = line.exception {
            push("exception", &format_args!("\n{exception}"));
        }

        Ok(out.into_bytes())
    }
}

/// One JSON object per record.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, record: &Record) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&LogLine::from(record))?)
    }
}

#[derive(Serialize)]
struct LogLine<'a> {
    timestamp: String,
    level: &'static str,
    process_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_name: Option<&'a str>,
    logger_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    module: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line_number: Option<u32>,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<&'a str>,
}

impl<'a> From<&'a Record> for LogLine<'a> {
    fn from(record: &'a Record) -> Self {
        Self {
            timestamp: record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            level: record.level.as_str(),
            process_id: std::process::id(),
            thread_name: record.thread.as_deref(),
            logger_name: &record.logger,
            module: record.module.as_deref(),
            filename: record.file.as_deref(),
            line_number: record.line,
            message: &record.message,
            exception: record.exception.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Level;

    use chrono::{DateTime, Utc};

    fn record() -> Record {
        let timestamp = DateTime::parse_from_rfc3339("2024-05-06T07:08:09.123456Z")
            .unwrap()
            .with_timezone(&Utc);

        Record::new(Level::Warning, "app.db", "pool exhausted")
            .with_timestamp(timestamp)
            .with_location("src/db.rs", 42)
    }

    #[test]
    fn test_line_format() {
        let mut record = record();
        record.thread = Some("main".to_string());

        let line = String::from_utf8(LineFormatter.format(&record).unwrap()).unwrap();

        assert_eq!(
            line,
            format!(
                "[timestamp] 2024-05-06T07:08:09.123Z | [level] WARNING | [process_id] {} \
                 | [thread_name] main | [logger_name] app.db | [filename] src/db.rs \
                 | [line_number] 42 | [message] pool exhausted",
                std::process::id()
            )
        );
    }

    #[test]
    fn test_line_format_puts_exception_on_its_own_line() {
        let record = record().with_exception("boom");

        let line = String::from_utf8(LineFormatter.format(&record).unwrap()).unwrap();

        assert!(line.ends_with("[message] pool exhausted | [exception] \nboom"));
    }

    #[test]
    fn test_json_format() {
        let record = record().with_module("app::db");

        let bytes = JsonFormatter.format(&record).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["timestamp"], "2024-05-06T07:08:09.123Z");
        assert_eq!(value["level"], "WARNING");
        assert_eq!(value["logger_name"], "app.db");
        assert_eq!(value["module"], "app::db");
        assert_eq!(value["line_number"], 42);
        assert_eq!(value["message"], "pool exhausted");
        assert!(value.get("exception").is_none());
        assert!(!bytes.contains(&b'\n'));
    }
}
