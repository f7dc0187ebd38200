//! Sink identifiers and backend kinds.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Reserved identifier for the process error stream.
pub const STDERR_TOKEN: &str = "<stderr>";

/// Uniquely identifies one physical destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SinkId {
    /// The process error stream.
    Stderr,

    /// A file, opened in append mode.
    File(PathBuf),
}

impl SinkId {
    /// Creates a file sink identifier.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Returns the file path, if this is a file sink.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Stderr => None,
            Self::File(path) => Some(path),
        }
    }

    /// Whether this is the process error stream.
    #[must_use]
    pub const fn is_stderr(&self) -> bool {
        matches!(self, Self::Stderr)
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stderr => f.write_str(STDERR_TOKEN),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl From<&str> for SinkId {
    fn from(value: &str) -> Self {
        if value == STDERR_TOKEN {
            Self::Stderr
        } else {
            Self::File(PathBuf::from(value))
        }
    }
}

impl From<String> for SinkId {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<PathBuf> for SinkId {
    fn from(value: PathBuf) -> Self {
        Self::File(value)
    }
}

impl From<&Path> for SinkId {
    fn from(value: &Path) -> Self {
        Self::File(value.to_path_buf())
    }
}

/// The concrete I/O strategy used to write to a sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Worker-pool backed file writes.
    #[default]
    Thread,

    /// Dedicated writer thread per sink.
    NativeAsync,
}

impl BackendKind {
    /// Configuration name of the backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Thread => "thread",
            Self::NativeAsync => "native-async",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "thread" => Ok(Self::Thread),
            "native-async" => Ok(Self::NativeAsync),
            other => Err(other.to_string()),
        }
    }
}
