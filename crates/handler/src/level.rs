use crate::Error;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Severity of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Level {
    /// Detailed diagnostics.
    Debug = 10,
    /// Routine events.
    Info = 20,
    /// Something unexpected that does not stop the program.
    Warning = 30,
    /// An operation failed.
    Error = 40,
    /// The program may not be able to continue.
    Critical = 50,
}

impl Level {
    /// All levels, most verbose first.
    pub const ALL: [Self; 5] = [
        Self::Debug,
        Self::Info,
        Self::Warning,
        Self::Error,
        Self::Critical,
    ];

    /// Upper-case level name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    /// Numeric severity.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Level {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|level| level.value() == value)
            .ok_or_else(|| Error::UnknownLevel(value.to_string()))
    }
}

impl FromStr for Level {
    type Err = Error;

    /// Accepts a level name in any case, or its numeric value.
    fn from_str(s: &str) -> Result<Self, Error> {
        let trimmed = s.trim();

        if let Ok(value) = trimmed.parse::<u8>() {
            return Self::try_from(value);
        }

        let upper = trimmed.to_uppercase();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == upper)
            .ok_or_else(|| Error::UnknownLevel(s.to_string()))
    }
}
