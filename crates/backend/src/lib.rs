//! Abstract interface for the physical write backends that sit underneath
//! shared log streams.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod sink;
mod target;

pub use error::{Error, Result};
pub use sink::{BackendKind, STDERR_TOKEN, SinkId};
pub use target::SinkTarget;

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// A handle to one physical sink.
///
/// Every implementation honours the same contract:
/// - `open` is idempotent; re-opening an open backend is a no-op.
/// - `send` before `open`, or after `close`, fails with
///   [`Error::StreamNotInitialized`].
/// - `close` is idempotent; closing a closed backend is a no-op.
/// - A single `send` call is never interleaved with another `send` on the
///   same backend.
///
/// Files are always opened in append mode and never truncated.
///
/// The `_blocking` methods follow the same contract for callers that can not
/// await. They may be called on a thread that drives a runtime, and a backend
/// may mix both forms across its lifetime.
#[async_trait]
pub trait SinkBackend: Debug + Send + Sync + 'static {
    /// Opens the underlying sink.
    async fn open(&mut self) -> Result<()>;

    /// Appends `bytes` to the sink and flushes them.
    async fn send(&mut self, bytes: Bytes) -> Result<()>;

    /// Closes the underlying sink.
    async fn close(&mut self) -> Result<()>;

    /// Blocking form of [`open`](Self::open).
    fn open_blocking(&mut self) -> Result<()>;

    /// Blocking form of [`send`](Self::send).
    fn send_blocking(&mut self, bytes: Bytes) -> Result<()>;

    /// Blocking form of [`close`](Self::close).
    fn close_blocking(&mut self) -> Result<()>;

    /// Whether the backend currently holds an open sink.
    fn is_open(&self) -> bool;

    /// The sink this backend writes to.
    fn sink(&self) -> &SinkId;
}

/// Constructs backends of one [`BackendKind`].
pub trait BackendFactory: Debug + Send + Sync + 'static {
    /// The kind of backend produced by this factory.
    fn kind(&self) -> BackendKind;

    /// Creates a new, unopened backend for `sink`.
    fn create(&self, sink: &SinkId) -> Box<dyn SinkBackend>;
}
