use crate::SinkId;

use thiserror::Error;

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// The backend was used before `open` or after `close`.
    #[error("{0}'s stream was not initialized")]
    StreamNotInitialized(SinkId),

    /// The worker driving the backend went away before answering.
    #[error("writer for {0} terminated unexpectedly")]
    WorkerGone(SinkId),
}
