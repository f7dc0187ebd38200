//! Handlers that format log records and write them to shared streams.
//!
//! A handler never propagates a write failure to the code that logged the
//! record. Failures are reported on the process error stream when the manager
//! is configured to raise internal errors, and dropped otherwise.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod filter;
mod format;
mod level;
mod record;
mod stream;

pub use error::{Error, Result};
pub use filter::{ExactLevelFilter, Filter, LevelFilter};
pub use format::{Formatter, JsonFormatter, LineFormatter};
pub use level::Level;
pub use record::Record;
pub use stream::{BlockingStreamHandler, StreamHandler};

use async_trait::async_trait;

/// Line terminator appended to every formatted record.
pub const TERMINATOR: &[u8] = b"\n";

/// A handler used from async code.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Process-unique handler id.
    fn id(&self) -> u64;

    /// Filters, formats and writes `record`.
    async fn handle(&self, record: &Record);

    /// Releases the handler's sink. The next record acquires it again.
    ///
    /// # Errors
    ///
    /// Propagates the release failure.
    async fn close(&self) -> Result<()>;
}

/// A handler used from plain threads.
pub trait BlockingHandler: Send + Sync + 'static {
    /// Process-unique handler id.
    fn id(&self) -> u64;

    /// Filters, formats and writes `record`.
    fn handle(&self, record: &Record);

    /// Releases the handler's sink. The next record acquires it again.
    ///
    /// # Errors
    ///
    /// Propagates the release failure.
    fn close(&self) -> Result<()>;
}
