use thiserror::Error;

/// Result type for handler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A level name or number that does not correspond to a known level.
    #[error("unknown level: {0}")]
    UnknownLevel(String),

    /// A record could not be serialized.
    #[error("error serializing record")]
    Serialize(#[from] serde_json::Error),

    /// The shared stream failed.
    #[error(transparent)]
    Streams(#[from] logbuch_streams::Error),
}
