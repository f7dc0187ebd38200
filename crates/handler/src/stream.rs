//! Handlers writing to a sink shared through a [`ResourceManager`].

use crate::{
    BlockingHandler, Error, Filter, Formatter, Handler, LevelFilter, LineFormatter, Record, Result,
    TERMINATOR,
};

use std::error::Error as _;
use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use logbuch_streams::{ResourceManager, SinkId};
use tracing::debug;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct Core {
    id: u64,
    sink: SinkId,
    manager: Arc<ResourceManager>,
    formatter: Box<dyn Formatter>,
    filter: Box<dyn Filter>,
}

impl Core {
    fn new(manager: Arc<ResourceManager>, sink: SinkId) -> Self {
        Self {
            id: NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed),
            sink,
            manager,
            formatter: Box::new(LineFormatter),
            filter: Box::new(LevelFilter::default()),
        }
    }

    fn encode(&self, record: &Record) -> Result<Bytes> {
        let mut bytes = self.formatter.format(record)?;
        bytes.extend_from_slice(TERMINATOR);

        Ok(Bytes::from(bytes))
    }

    /// The diagnostic to print for a failed record, if reporting is enabled.
    fn error_report(&self, record: &Record, error: &Error) -> Option<Vec<u8>> {
        debug!(handler = self.id, sink = %self.sink, %error, "failed to emit record");

        if !self.manager.config().raise_on_internal_error {
            return None;
        }

        let mut report = String::from("--- Logging error ---\n");
        let _ = writeln!(report, "{error}");
        let mut source = error.source();
        while let Some(cause) = source {
            let _ = writeln!(report, "Caused by: {cause}");
            source = cause.source();
        }
        let _ = writeln!(report, "Message: {:?}", record.message);
        let _ = writeln!(
            report,
            "Logger: {}, level: {}, sink: {}",
            record.logger, record.level, self.sink
        );

        Some(report.into_bytes())
    }
}

/// Async handler for one sink.
///
/// The sink is acquired lazily on the first emitted record and held until
/// [`close`](Handler::close).
#[derive(Debug)]
pub struct StreamHandler {
    core: Core,
    acquired: tokio::sync::Mutex<bool>,
}

impl StreamHandler {
    /// Creates a handler writing lines for every level to `sink`.
    pub fn new(manager: Arc<ResourceManager>, sink: impl Into<SinkId>) -> Self {
        Self {
            core: Core::new(manager, sink.into()),
            acquired: tokio::sync::Mutex::new(false),
        }
    }

    /// Replaces the formatter.
    #[must_use]
    pub fn with_formatter(mut self, formatter: impl Formatter) -> Self {
        self.core.formatter = Box::new(formatter);
        self
    }

    /// Replaces the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Filter) -> Self {
        self.core.filter = Box::new(filter);
        self
    }

    /// The sink this handler writes to.
    pub const fn sink(&self) -> &SinkId {
        &self.core.sink
    }

    async fn emit(&self, record: &Record) -> Result<()> {
        let bytes = self.core.encode(record)?;

        {
            let mut acquired = self.acquired.lock().await;
            if !*acquired {
                let _ = self.core.manager.acquire(self.core.sink.clone()).await?;
                *acquired = true;
            }
        }

        self.core.manager.send(&self.core.sink, bytes).await?;

        Ok(())
    }

    async fn handle_error(&self, record: &Record, error: &Error) {
        let Some(report) = self.core.error_report(record, error) else {
            return;
        };

        if let Err(e) = self.core.manager.error_stream().report(&report).await {
            debug!(handler = self.core.id, error = %e, "failed to report logging error");
        }
    }
}

#[async_trait]
impl Handler for StreamHandler {
    fn id(&self) -> u64 {
        self.core.id
    }

    async fn handle(&self, record: &Record) {
        if !self.core.filter.should_emit(record) {
            return;
        }

        if let Err(e) = self.emit(record).await {
            self.handle_error(record, &e).await;
        }
    }

    async fn close(&self) -> Result<()> {
        let mut acquired = self.acquired.lock().await;
        if *acquired {
            *acquired = false;
            self.core.manager.release(&self.core.sink).await?;
        }

        Ok(())
    }
}

/// Blocking handler for one sink, for callers that can not await.
///
/// Records are written on the calling thread. That thread may drive a
/// runtime, in which case a record that finds the sink's lock held by an
/// async writer is dropped and reported instead of deadlocking.
#[derive(Debug)]
pub struct BlockingStreamHandler {
    core: Core,
    acquired: parking_lot::Mutex<bool>,
}

impl BlockingStreamHandler {
    /// Creates a handler writing lines for every level to `sink`.
    pub fn new(manager: Arc<ResourceManager>, sink: impl Into<SinkId>) -> Self {
        Self {
            core: Core::new(manager, sink.into()),
            acquired: parking_lot::Mutex::new(false),
        }
    }

    /// Replaces the formatter.
    #[must_use]
    pub fn with_formatter(mut self, formatter: impl Formatter) -> Self {
        self.core.formatter = Box::new(formatter);
        self
    }

    /// Replaces the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Filter) -> Self {
        self.core.filter = Box::new(filter);
        self
    }

    /// The sink this handler writes to.
    pub const fn sink(&self) -> &SinkId {
        &self.core.sink
    }

    fn emit(&self, record: &Record) -> Result<()> {
        let bytes = self.core.encode(record)?;

        {
            let mut acquired = self.acquired.lock();
            if !*acquired {
                let _ = self
                    .core
                    .manager
                    .acquire_blocking(self.core.sink.clone())?;
                *acquired = true;
            }
        }

        self.core.manager.send_blocking(&self.core.sink, bytes)?;

        Ok(())
    }

    fn handle_error(&self, record: &Record, error: &Error) {
        let Some(report) = self.core.error_report(record, error) else {
            return;
        };

        if let Err(e) = self.core.manager.error_stream().report_blocking(&report) {
            debug!(handler = self.core.id, error = %e, "failed to report logging error");
        }
    }
}

impl BlockingHandler for BlockingStreamHandler {
    fn id(&self) -> u64 {
        self.core.id
    }

    fn handle(&self, record: &Record) {
        if !self.core.filter.should_emit(record) {
            return;
        }

        if let Err(e) = self.emit(record) {
            self.handle_error(record, &e);
        }
    }

    fn close(&self) -> Result<()> {
        let mut acquired = self.acquired.lock();
        if *acquired {
            *acquired = false;
            self.core.manager.release_blocking(&self.core.sink)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Level;

    use logbuch_streams::Config;

    #[tokio::test]
    async fn test_ids_are_unique() {
        let manager = Arc::new(ResourceManager::new(Config::default()));

        let a = StreamHandler::new(Arc::clone(&manager), SinkId::Stderr);
        let b = StreamHandler::new(Arc::clone(&manager), SinkId::Stderr);
        let c = BlockingStreamHandler::new(manager, SinkId::Stderr);

        assert_ne!(Handler::id(&a), Handler::id(&b));
        assert_ne!(Handler::id(&b), BlockingHandler::id(&c));
    }

    #[test]
    fn test_error_report() {
        let manager = Arc::new(ResourceManager::new(Config::default()));
        let core = Core::new(manager, SinkId::file("app.log"));
        let record = Record::new(Level::Error, "app", "disk full");
        let error = Error::Streams(logbuch_streams::Error::NotAcquired(SinkId::file("app.log")));

        let report = String::from_utf8(core.error_report(&record, &error).unwrap()).unwrap();

        assert!(report.starts_with("--- Logging error ---\n"));
        assert!(report.contains("app.log's stream was not acquired"));
        assert!(report.contains("Message: \"disk full\""));
        assert!(report.contains("Logger: app, level: ERROR, sink: app.log"));
    }

    #[test]
    fn test_no_report_when_disabled() {
        let config = Config::builder().raise_on_internal_error(false).build();
        let manager = Arc::new(ResourceManager::new(config));
        let core = Core::new(manager, SinkId::Stderr);
        let record = Record::new(Level::Error, "app", "lost");
        let error = Error::UnknownLevel("x".to_string());

        assert!(core.error_report(&record, &error).is_none());
    }
}
