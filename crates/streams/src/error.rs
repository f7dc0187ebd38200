use logbuch_backend::{BackendKind, SinkId};
use thiserror::Error;

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend failed.
    #[error(transparent)]
    Backend(#[from] logbuch_backend::Error),

    /// The requested backend is not compiled in or not registered.
    #[error("stream backend {0} is not available")]
    BackendUnavailable(BackendKind),

    /// Lock acquisition was refused.
    #[error(transparent)]
    Lock(#[from] logbuch_lock::Error),

    /// The sink is already registered under a different backend.
    #[error("{sink} is registered with the {registered} backend but {requested} was requested")]
    ModeMismatch {
        /// The sink in question.
        sink: SinkId,
        /// Backend of the live registration.
        registered: BackendKind,
        /// Backend the caller pinned.
        requested: BackendKind,
    },

    /// `send` was called for a sink without an outstanding `acquire`.
    #[error("{0}'s stream was not acquired")]
    NotAcquired(SinkId),

    /// Configuration named an unknown backend.
    #[error("unsupported stream backend: {0:?}")]
    UnsupportedBackend(String),
}

impl Error {
    /// Whether this error is a refused blocking acquisition.
    #[must_use]
    pub const fn is_would_deadlock(&self) -> bool {
        matches!(self, Self::Lock(logbuch_lock::Error::WouldDeadlock))
    }
}
