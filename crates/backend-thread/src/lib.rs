//! Sink backend that performs blocking file I/O on the runtime's worker
//! thread pool, so the calling task is suspended rather than blocked.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use logbuch_backend::{BackendFactory, BackendKind, Error, Result, SinkBackend, SinkId, SinkTarget};
use tokio::task::{JoinHandle, spawn_blocking};
use tracing::{debug, trace, warn};

/// Backend running every open/write/close on `spawn_blocking` workers.
///
/// A write whose caller was cancelled keeps running on its worker. It is
/// awaited before the next async operation starts. The blocking operations
/// write on the calling thread and can not await it, so they rely on the
/// target's write lock instead.
#[derive(Debug)]
pub struct ThreadBackend {
    sink: SinkId,
    target: Option<Arc<SinkTarget>>,
    in_flight: Option<JoinHandle<Result<()>>>,
}

impl ThreadBackend {
    /// Creates an unopened backend for `sink`.
    #[must_use]
    pub const fn new(sink: SinkId) -> Self {
        Self {
            sink,
            target: None,
            in_flight: None,
        }
    }

    async fn join_in_flight(&mut self) -> Result<()> {
        let Some(handle) = self.in_flight.as_mut() else {
            return Ok(());
        };

        let result = handle.await;
        self.in_flight = None;

        result.map_err(|e| Error::Io("worker thread failed", io::Error::other(e)))?
    }

    /// Waits for a write abandoned by a cancelled caller.
    async fn settle(&mut self) {
        if let Err(e) = self.join_in_flight().await {
            warn!(sink = %self.sink, error = %e, "abandoned write failed");
        }
    }
}

#[async_trait]
impl SinkBackend for ThreadBackend {
    async fn open(&mut self) -> Result<()> {
        if self.target.is_some() {
            return Ok(());
        }

        self.settle().await;

        let sink = self.sink.clone();
        let target = spawn_blocking(move || SinkTarget::open(&sink))
            .await
            .map_err(|e| Error::Io("worker thread failed", io::Error::other(e)))??;

        debug!(sink = %self.sink, "opened thread backend");
        self.target = Some(Arc::new(target));

        Ok(())
    }

    async fn send(&mut self, bytes: Bytes) -> Result<()> {
        self.settle().await;

        let Some(target) = self.target.clone() else {
            return Err(Error::StreamNotInitialized(self.sink.clone()));
        };

        trace!(sink = %self.sink, len = bytes.len(), "writing");
        self.in_flight = Some(spawn_blocking(move || target.write_all(&bytes)));

        self.join_in_flight().await
    }

    async fn close(&mut self) -> Result<()> {
        self.settle().await;

        let Some(target) = self.target.take() else {
            return Ok(());
        };

        spawn_blocking(move || target.flush())
            .await
            .map_err(|e| Error::Io("worker thread failed", io::Error::other(e)))??;

        debug!(sink = %self.sink, "closed thread backend");

        Ok(())
    }

    fn open_blocking(&mut self) -> Result<()> {
        if self.target.is_some() {
            return Ok(());
        }

        let target = SinkTarget::open(&self.sink)?;

        debug!(sink = %self.sink, "opened thread backend");
        self.target = Some(Arc::new(target));

        Ok(())
    }

    fn send_blocking(&mut self, bytes: Bytes) -> Result<()> {
        let Some(target) = &self.target else {
            return Err(Error::StreamNotInitialized(self.sink.clone()));
        };

        trace!(sink = %self.sink, len = bytes.len(), "writing");
        target.write_all(&bytes)
    }

    fn close_blocking(&mut self) -> Result<()> {
        let Some(target) = self.target.take() else {
            return Ok(());
        };

        target.flush()?;

        debug!(sink = %self.sink, "closed thread backend");

        Ok(())
    }

    fn is_open(&self) -> bool {
        self.target.is_some()
    }

    fn sink(&self) -> &SinkId {
        &self.sink
    }
}

/// Creates [`ThreadBackend`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadBackendFactory;

impl BackendFactory for ThreadBackendFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::Thread
    }

    fn create(&self, sink: &SinkId) -> Box<dyn SinkBackend> {
        Box::new(ThreadBackend::new(sink.clone()))
    }
}
