//! One physical write stream, shared by every handler of the same sink.

use crate::{Error, Result};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use logbuch_backend::{BackendFactory, BackendKind, SinkBackend, SinkId};
use logbuch_lock::CrossContextLock;
use tracing::{debug, warn};

/// A backend opened during one acquire/release cycle.
#[derive(Debug)]
pub(crate) struct OpenBackend {
    cycle: u64,
    backend: Box<dyn SinkBackend>,
}

/// Per-sink lock and the backend it protects.
///
/// File sinks get a fresh slot per resource. The error stream shares one slot
/// across all cycles, so a slot may briefly still hold the backend of an
/// earlier cycle whose close has not run yet.
pub(crate) type BackendSlot = CrossContextLock<Option<OpenBackend>>;

/// Wraps one backend behind a per-resource lock that serializes every open,
/// send and close.
#[derive(Debug)]
pub struct StreamResource {
    sink: SinkId,
    cycle: u64,
    factory: Arc<dyn BackendFactory>,
    slot: Arc<BackendSlot>,
    open: AtomicBool,
}

impl StreamResource {
    pub(crate) fn new(
        sink: SinkId,
        cycle: u64,
        factory: Arc<dyn BackendFactory>,
        slot: Arc<BackendSlot>,
    ) -> Self {
        Self {
            sink,
            cycle,
            factory,
            slot,
            open: AtomicBool::new(false),
        }
    }

    /// The sink this resource writes to.
    pub const fn sink(&self) -> &SinkId {
        &self.sink
    }

    /// The backend kind this resource was created with.
    pub fn kind(&self) -> BackendKind {
        self.factory.kind()
    }

    /// Whether this resource currently holds an open backend.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Creates and opens the backend if it is not open yet.
    ///
    /// # Errors
    ///
    /// Propagates the backend's open failure; the resource stays closed.
    pub async fn open(&self) -> Result<()> {
        let mut slot = self.slot.acquire_async().await;
        self.open_slot(&mut slot).await
    }

    /// Writes `bytes` as one uninterrupted write.
    ///
    /// # Errors
    ///
    /// Fails with `StreamNotInitialized` when the resource was never opened,
    /// and propagates backend write failures.
    pub async fn send(&self, bytes: Bytes) -> Result<()> {
        let mut slot = self.slot.acquire_async().await;
        self.send_slot(&mut slot, bytes).await
    }

    /// Closes the backend if open. Redundant calls are no-ops.
    ///
    /// # Errors
    ///
    /// Propagates the backend's close failure.
    pub async fn close(&self) -> Result<()> {
        let mut slot = self.slot.acquire_async().await;
        self.close_slot(&mut slot).await
    }

    /// Blocking counterpart of [`open`](Self::open).
    ///
    /// The backend's blocking operations run on the calling thread, which may
    /// be a runtime thread.
    ///
    /// # Errors
    ///
    /// As [`open`](Self::open), plus `WouldDeadlock` when the lock is held and
    /// the calling thread drives a runtime.
    pub fn open_blocking(&self) -> Result<()> {
        let mut slot = self.slot.acquire_blocking()?;
        if self.current(&mut slot).is_some() {
            return Ok(());
        }

        if let Some(mut stale) = self.take_stale(&mut slot) {
            if let Err(e) = stale.backend.close_blocking() {
                warn!(sink = %self.sink, error = %e, "failed to close stale backend");
            }
        }

        let mut backend = self.factory.create(&self.sink);
        backend.open_blocking()?;
        self.install(&mut slot, backend);

        Ok(())
    }

    /// Blocking counterpart of [`send`](Self::send).
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send), plus `WouldDeadlock` when the lock is held and
    /// the calling thread drives a runtime.
    pub fn send_blocking(&self, bytes: Bytes) -> Result<()> {
        let mut slot = self.slot.acquire_blocking()?;
        let Some(open) = self.current(&mut slot) else {
            return Err(self.not_initialized());
        };

        open.backend.send_blocking(bytes)?;

        Ok(())
    }

    /// Blocking counterpart of [`close`](Self::close).
    ///
    /// # Errors
    ///
    /// As [`close`](Self::close), plus `WouldDeadlock` when the lock is held
    /// and the calling thread drives a runtime.
    pub fn close_blocking(&self) -> Result<()> {
        let mut slot = self.slot.acquire_blocking()?;
        let Some(open) = self.current(&mut slot) else {
            return Ok(());
        };

        let result = open.backend.close_blocking();
        self.clear(&mut slot);
        result?;
        debug!(sink = %self.sink, "stream closed");

        Ok(())
    }

    #[cfg(test)]
    pub(crate) const fn slot(&self) -> &Arc<BackendSlot> {
        &self.slot
    }

    async fn open_slot(&self, slot: &mut Option<OpenBackend>) -> Result<()> {
        if self.current(slot).is_some() {
            return Ok(());
        }

        if let Some(mut stale) = self.take_stale(slot) {
            if let Err(e) = stale.backend.close().await {
                warn!(sink = %self.sink, error = %e, "failed to close stale backend");
            }
        }

        let mut backend = self.factory.create(&self.sink);
        backend.open().await?;
        self.install(slot, backend);

        Ok(())
    }

    async fn send_slot(&self, slot: &mut Option<OpenBackend>, bytes: Bytes) -> Result<()> {
        let Some(open) = self.current(slot) else {
            return Err(self.not_initialized());
        };

        open.backend.send(bytes).await?;

        Ok(())
    }

    async fn close_slot(&self, slot: &mut Option<OpenBackend>) -> Result<()> {
        let Some(open) = self.current(slot) else {
            return Ok(());
        };

        // The backend leaves the slot only once closed, so a close cancelled
        // here is finished by the next one.
        let result = open.backend.close().await;
        self.clear(slot);
        result?;
        debug!(sink = %self.sink, "stream closed");

        Ok(())
    }

    /// The backend opened by this resource's cycle, if any.
    fn current<'s>(&self, slot: &'s mut Option<OpenBackend>) -> Option<&'s mut OpenBackend> {
        slot.as_mut().filter(|open| open.cycle == self.cycle)
    }

    fn take_stale(&self, slot: &mut Option<OpenBackend>) -> Option<OpenBackend> {
        let stale = slot.take()?;
        debug!(sink = %self.sink, cycle = stale.cycle, "closing backend of an earlier cycle");

        Some(stale)
    }

    fn install(&self, slot: &mut Option<OpenBackend>, backend: Box<dyn SinkBackend>) {
        *slot = Some(OpenBackend {
            cycle: self.cycle,
            backend,
        });
        self.open.store(true, Ordering::Release);
        debug!(sink = %self.sink, kind = %self.kind(), "stream opened");
    }

    fn clear(&self, slot: &mut Option<OpenBackend>) {
        *slot = None;
        self.open.store(false, Ordering::Release);
    }

    fn not_initialized(&self) -> Error {
        Error::Backend(logbuch_backend::Error::StreamNotInitialized(
            self.sink.clone(),
        ))
    }
}
