//! Blocking writer shared by the backend implementations.

use crate::{Error, Result, SinkId};

use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use parking_lot::Mutex;

/// An open physical destination.
///
/// Writes go through `&self` so a target can be shared with worker threads
/// behind an `Arc`. Each write holds the file's lock, so writes issued from
/// different threads land whole.
#[derive(Debug)]
pub enum SinkTarget {
    /// The process error stream.
    Stderr,

    /// A file opened in append mode.
    File(Mutex<File>),
}

impl SinkTarget {
    /// Opens `sink`, creating the file if needed. Never truncates.
    pub fn open(sink: &SinkId) -> Result<Self> {
        match sink {
            SinkId::Stderr => Ok(Self::Stderr),
            SinkId::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        std::fs::create_dir_all(parent)
                            .map_err(|e| Error::Io("error creating log directory", e))?;
                    }
                }

                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| Error::Io("error opening log file", e))?;

                Ok(Self::File(Mutex::new(file)))
            }
        }
    }

    /// Writes all of `bytes` in one call and flushes.
    pub fn write_all(&self, bytes: &[u8]) -> Result<()> {
        self.write_and_flush(bytes)
            .map_err(|e| Error::Io("error writing to sink", e))
    }

    /// Flushes any buffered output.
    pub fn flush(&self) -> Result<()> {
        match self {
            Self::Stderr => io::stderr().lock().flush(),
            Self::File(file) => file.lock().flush(),
        }
        .map_err(|e| Error::Io("error flushing sink", e))
    }

    fn write_and_flush(&self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Self::Stderr => {
                let mut stderr = io::stderr().lock();
                stderr.write_all(bytes)?;
                stderr.flush()
            }
            Self::File(file) => {
                let mut file = file.lock();
                file.write_all(bytes)?;
                file.flush()
            }
        }
    }
}
