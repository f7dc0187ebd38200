use thiserror::Error;

/// Result type for lock acquisition.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The lock is held, and blocking here would stall the thread that has to
    /// release it.
    #[error("can not acquire the lock because it is held and this thread would deadlock waiting for it")]
    WouldDeadlock,
}
