//! Log record passed from loggers to handlers.

use crate::Level;

use std::thread;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One log event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Severity.
    pub level: Level,
    /// Name of the logger that produced the record.
    pub logger: String,
    /// The log message.
    pub message: String,
    /// When the record was created.
    pub timestamp: DateTime<Utc>,
    /// Originating module.
    pub module: Option<String>,
    /// Source file.
    pub file: Option<String>,
    /// Source line.
    pub line: Option<u32>,
    /// Name of the producing thread.
    pub thread: Option<String>,
    /// Rendered error or backtrace attached to the record.
    pub exception: Option<String>,
}

impl Record {
    /// Creates a record stamped with the current time and thread.
    pub fn new(level: Level, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            logger: logger.into(),
            message: message.into(),
            timestamp: Utc::now(),
            module: None,
            file: None,
            line: None,
            thread: thread::current().name().map(str::to_string),
            exception: None,
        }
    }

    /// Builder-style method for setting the module
    #[must_use]
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Builder-style method for setting location
    #[must_use]
    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// Builder-style method for attaching an error
    #[must_use]
    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    /// Builder-style method for overriding the timestamp
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
