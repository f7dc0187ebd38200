use crate::backends::Backends;
use crate::config::Config;
use crate::error_stream::ErrorStream;
use crate::resource::{BackendSlot, StreamResource};
use crate::{Error, Result};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use logbuch_backend::{BackendFactory, BackendKind, SinkId};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// How `acquire` chooses the backend for a sink that is not yet registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendSelection {
    /// Use the configured backend, falling back to the thread backend when it
    /// is unavailable.
    #[default]
    Configured,

    /// Use exactly this backend, or fail.
    Pinned(BackendKind),
}

/// Proof of one successful acquire. Must be matched by exactly one release.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use = "every acquired sink must be released"]
pub struct ResourceRef {
    sink: SinkId,
    kind: BackendKind,
}

impl ResourceRef {
    /// The acquired sink.
    pub const fn sink(&self) -> &SinkId {
        &self.sink
    }

    /// The backend serving the sink.
    pub const fn kind(&self) -> BackendKind {
        self.kind
    }
}

#[derive(Debug)]
struct Entry {
    resource: Arc<StreamResource>,
    refs: usize,
}

/// Reference-counted registry of shared stream resources.
///
/// The registry lock only guards map mutation. Backend open and close always
/// run after it has been released, so a slow sink never stalls other sinks.
#[derive(Debug)]
pub struct ResourceManager {
    config: Config,
    backends: Backends,
    registry: Mutex<HashMap<SinkId, Entry>>,
    stderr_slot: Arc<BackendSlot>,
    cycles: AtomicU64,
    runtime: Option<Handle>,
}

impl ResourceManager {
    /// Creates a manager with every compiled-in backend.
    ///
    /// Closes abandoned by a cancelled caller are spawned on the runtime
    /// entered at construction time, if any.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::builder().config(config).build()
    }

    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ResourceManagerBuilder {
        ResourceManagerBuilder::default()
    }

    /// The configuration this manager was built with.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The backends this manager can construct.
    pub const fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Acquires `sink` with the configured backend, opening it on the first
    /// acquire of a cycle.
    ///
    /// # Errors
    ///
    /// Propagates open failures, in which case the acquire is rolled back.
    pub async fn acquire(&self, sink: impl Into<SinkId>) -> Result<ResourceRef> {
        self.acquire_with(sink, BackendSelection::Configured).await
    }

    /// Acquires `sink` with an explicit backend selection.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::BackendUnavailable`] when a pinned backend is not
    /// available, with [`Error::ModeMismatch`] when the sink is registered
    /// under a different backend than the pinned one, and propagates open
    /// failures.
    pub async fn acquire_with(
        &self,
        sink: impl Into<SinkId>,
        selection: BackendSelection,
    ) -> Result<ResourceRef> {
        let sink = sink.into();
        let resource = self.register(&sink, selection)?;

        let pending = PendingAcquire::new(self, &sink);
        let opened = resource.open().await;
        pending.disarm();

        if let Err(e) = opened {
            self.rollback(&sink).await;
            return Err(e);
        }

        Ok(ResourceRef {
            sink,
            kind: resource.kind(),
        })
    }

    /// Writes `bytes` to an acquired sink.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotAcquired`] when the sink has no outstanding
    /// acquire, and propagates backend write failures.
    pub async fn send(&self, sink: &SinkId, bytes: Bytes) -> Result<()> {
        self.lookup(sink)?.send(bytes).await
    }

    /// Drops one reference to `sink`, closing it when none remain. Releasing
    /// an unknown sink is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates the backend's close failure.
    pub async fn release(&self, sink: &SinkId) -> Result<()> {
        let Some(resource) = self.unregister(sink) else {
            return Ok(());
        };

        let pending = PendingClose::new(self, Arc::clone(&resource));
        let closed = resource.close().await;
        pending.disarm();

        closed
    }

    /// Blocking counterpart of [`acquire`](Self::acquire).
    ///
    /// The backend is driven on the calling thread, so this works from plain
    /// threads, `spawn_blocking` closures and runtime threads alike.
    ///
    /// # Errors
    ///
    /// As [`acquire`](Self::acquire). Additionally fails with `WouldDeadlock`
    /// when the sink's lock is held and the calling thread drives a runtime.
    pub fn acquire_blocking(&self, sink: impl Into<SinkId>) -> Result<ResourceRef> {
        self.acquire_blocking_with(sink, BackendSelection::Configured)
    }

    /// Blocking counterpart of [`acquire_with`](Self::acquire_with).
    ///
    /// # Errors
    ///
    /// See [`acquire_blocking`](Self::acquire_blocking).
    pub fn acquire_blocking_with(
        &self,
        sink: impl Into<SinkId>,
        selection: BackendSelection,
    ) -> Result<ResourceRef> {
        let sink = sink.into();
        let resource = self.register(&sink, selection)?;

        if let Err(e) = resource.open_blocking() {
            if let Err(release_error) = self.release_blocking(&sink) {
                warn!(%sink, error = %release_error, "failed to roll back acquire");
            }
            return Err(e);
        }

        Ok(ResourceRef {
            sink,
            kind: resource.kind(),
        })
    }

    /// Blocking counterpart of [`send`](Self::send).
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send) and [`acquire_blocking`](Self::acquire_blocking).
    pub fn send_blocking(&self, sink: &SinkId, bytes: Bytes) -> Result<()> {
        self.lookup(sink)?.send_blocking(bytes)
    }

    /// Blocking counterpart of [`release`](Self::release).
    ///
    /// # Errors
    ///
    /// See [`release`](Self::release) and
    /// [`acquire_blocking`](Self::acquire_blocking).
    pub fn release_blocking(&self, sink: &SinkId) -> Result<()> {
        let Some(resource) = self.unregister(sink) else {
            return Ok(());
        };

        resource.close_blocking()
    }

    /// A writer bound to the process-wide error-stream lock.
    #[must_use]
    pub fn error_stream(&self) -> ErrorStream {
        ErrorStream::new(Arc::clone(&self.stderr_slot))
    }

    /// Outstanding acquires of `sink`, or `None` when it is not registered.
    pub fn ref_count(&self, sink: &SinkId) -> Option<usize> {
        self.registry.lock().get(sink).map(|entry| entry.refs)
    }

    /// Whether `sink` is registered.
    pub fn is_registered(&self, sink: &SinkId) -> bool {
        self.registry.lock().contains_key(sink)
    }

    /// Whether `sink` is registered and its backend is open.
    pub fn is_open(&self, sink: &SinkId) -> bool {
        self.registry
            .lock()
            .get(sink)
            .is_some_and(|entry| entry.resource.is_open())
    }

    fn register(&self, sink: &SinkId, selection: BackendSelection) -> Result<Arc<StreamResource>> {
        let mut registry = self.registry.lock();

        if let Some(entry) = registry.get_mut(sink) {
            if let BackendSelection::Pinned(requested) = selection {
                let registered = entry.resource.kind();
                if registered != requested {
                    return Err(Error::ModeMismatch {
                        sink: sink.clone(),
                        registered,
                        requested,
                    });
                }
            }

            entry.refs += 1;
            return Ok(Arc::clone(&entry.resource));
        }

        let factory = self.resolve(selection)?;
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let slot = if sink.is_stderr() {
            Arc::clone(&self.stderr_slot)
        } else {
            Arc::new(BackendSlot::default())
        };

        let resource = Arc::new(StreamResource::new(sink.clone(), cycle, factory, slot));
        registry.insert(
            sink.clone(),
            Entry {
                resource: Arc::clone(&resource),
                refs: 1,
            },
        );
        debug!(%sink, kind = %resource.kind(), cycle, "registered stream resource");

        Ok(resource)
    }

    fn resolve(&self, selection: BackendSelection) -> Result<Arc<dyn BackendFactory>> {
        match selection {
            BackendSelection::Pinned(kind) => {
                self.backends.get(kind).ok_or(Error::BackendUnavailable(kind))
            }
            BackendSelection::Configured => {
                let kind = self.config.backend;
                Ok(self.backends.get(kind).unwrap_or_else(|| {
                    warn!(configured = %kind, "backend unavailable, falling back to thread backend");
                    self.backends.fallback()
                }))
            }
        }
    }

    fn lookup(&self, sink: &SinkId) -> Result<Arc<StreamResource>> {
        self.registry
            .lock()
            .get(sink)
            .map(|entry| Arc::clone(&entry.resource))
            .ok_or_else(|| Error::NotAcquired(sink.clone()))
    }

    /// Decrements the count of `sink`, returning the resource if this evicted
    /// it.
    fn unregister(&self, sink: &SinkId) -> Option<Arc<StreamResource>> {
        let mut registry = self.registry.lock();

        let entry = registry.get_mut(sink)?;
        entry.refs -= 1;
        if entry.refs > 0 {
            return None;
        }

        let entry = registry.remove(sink)?;
        debug!(%sink, "evicted stream resource");

        Some(entry.resource)
    }

    async fn rollback(&self, sink: &SinkId) {
        if let Err(e) = self.release(sink).await {
            warn!(%sink, error = %e, "failed to roll back acquire");
        }
    }

    /// Closes an evicted resource without waiting for it.
    fn close_detached(&self, resource: Arc<StreamResource>) {
        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            warn!(sink = %resource.sink(), "no runtime to close abandoned stream");
            return;
        };

        runtime.spawn(async move {
            if let Err(e) = resource.close().await {
                warn!(sink = %resource.sink(), error = %e, "failed to close abandoned stream");
            }
        });
    }
}

/// Undoes the reference taken by an acquire whose future was dropped before
/// the open completed.
struct PendingAcquire<'a> {
    manager: &'a ResourceManager,
    sink: &'a SinkId,
    armed: bool,
}

impl<'a> PendingAcquire<'a> {
    const fn new(manager: &'a ResourceManager, sink: &'a SinkId) -> Self {
        Self {
            manager,
            sink,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        debug!(sink = %self.sink, "acquire cancelled, rolling back");
        if let Some(resource) = self.manager.unregister(self.sink) {
            self.manager.close_detached(resource);
        }
    }
}

/// Finishes the close of an evicted resource whose release future was
/// dropped.
struct PendingClose<'a> {
    manager: &'a ResourceManager,
    resource: Option<Arc<StreamResource>>,
}

impl<'a> PendingClose<'a> {
    const fn new(manager: &'a ResourceManager, resource: Arc<StreamResource>) -> Self {
        Self {
            manager,
            resource: Some(resource),
        }
    }

    fn disarm(mut self) {
        self.resource = None;
    }
}

impl Drop for PendingClose<'_> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.manager.close_detached(resource);
        }
    }
}

/// Builder for [`ResourceManager`].
#[derive(Debug, Default)]
pub struct ResourceManagerBuilder {
    config: Option<Config>,
    backends: Option<Backends>,
    runtime: Option<Handle>,
}

impl ResourceManagerBuilder {
    /// Sets the configuration.
    #[must_use]
    pub const fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the constructible backends.
    #[must_use]
    pub fn backends(mut self, backends: Backends) -> Self {
        self.backends = Some(backends);
        self
    }

    /// Sets the runtime that finishes closes abandoned by cancelled callers.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builds the manager.
    ///
    /// Without an explicit runtime, the runtime entered on the calling thread
    /// is used, if any.
    #[must_use]
    pub fn build(self) -> ResourceManager {
        ResourceManager {
            config: self.config.unwrap_or_default(),
            backends: self.backends.unwrap_or_default(),
            registry: Mutex::new(HashMap::new()),
            stderr_slot: Arc::new(BackendSlot::default()),
            cycles: AtomicU64::new(0),
            runtime: self.runtime.or_else(|| Handle::try_current().ok()),
        }
    }
}
