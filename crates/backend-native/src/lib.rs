//! Sink backend that owns a dedicated OS thread per open sink.
//!
//! The writer thread holds the file and executes commands in the order they
//! were queued. Callers suspend only while waiting for the thread's reply, and
//! no runtime worker is ever occupied by file I/O.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::sync::mpsc as std_mpsc;
use std::thread;

use async_trait::async_trait;
use bytes::Bytes;
use logbuch_backend::{BackendFactory, BackendKind, Error, Result, SinkBackend, SinkId, SinkTarget};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// Where the writer thread sends the outcome of a command.
///
/// A blocking caller waits on a std channel, since tokio's blocking receive
/// panics inside a runtime context.
enum Reply {
    Task(oneshot::Sender<Result<()>>),
    Thread(std_mpsc::SyncSender<Result<()>>),
}

impl Reply {
    fn send(self, result: Result<()>) {
        // A caller that went away no longer wants the result.
        match self {
            Self::Task(reply) => {
                let _ = reply.send(result);
            }
            Self::Thread(reply) => {
                let _ = reply.send(result);
            }
        }
    }
}

enum Command {
    Write { bytes: Bytes, reply: Reply },
    Close { reply: Reply },
}

/// Backend writing through a dedicated thread.
#[derive(Debug)]
pub struct NativeBackend {
    sink: SinkId,
    commands: Option<mpsc::UnboundedSender<Command>>,
}

impl NativeBackend {
    /// Creates an unopened backend for `sink`.
    #[must_use]
    pub const fn new(sink: SinkId) -> Self {
        Self {
            sink,
            commands: None,
        }
    }

    fn worker_gone(&self) -> Error {
        Error::WorkerGone(self.sink.clone())
    }

    fn spawn_writer(&self, ready: Reply) -> Result<mpsc::UnboundedSender<Command>> {
        let (commands, receiver) = mpsc::unbounded_channel();
        let sink = self.sink.clone();

        thread::Builder::new()
            .name("logbuch-writer".to_string())
            .spawn(move || run_writer(&sink, receiver, ready))
            .map_err(|e| Error::Io("error spawning writer thread", e))?;

        Ok(commands)
    }

    async fn request<F>(&self, commands: &mpsc::UnboundedSender<Command>, command: F) -> Result<()>
    where
        F: FnOnce(Reply) -> Command + Send,
    {
        let (reply, response) = oneshot::channel();
        commands
            .send(command(Reply::Task(reply)))
            .map_err(|_| self.worker_gone())?;

        response.await.map_err(|_| self.worker_gone())?
    }

    fn request_blocking<F>(&self, commands: &mpsc::UnboundedSender<Command>, command: F) -> Result<()>
    where
        F: FnOnce(Reply) -> Command,
    {
        let (reply, response) = std_mpsc::sync_channel(1);
        commands
            .send(command(Reply::Thread(reply)))
            .map_err(|_| self.worker_gone())?;

        response.recv().map_err(|_| self.worker_gone())?
    }
}

#[async_trait]
impl SinkBackend for NativeBackend {
    async fn open(&mut self) -> Result<()> {
        if self.commands.is_some() {
            return Ok(());
        }

        let (ready, response) = oneshot::channel();
        let commands = self.spawn_writer(Reply::Task(ready))?;

        // Dropping `commands` on cancellation or failure stops the thread.
        response.await.map_err(|_| self.worker_gone())??;

        debug!(sink = %self.sink, "opened native backend");
        self.commands = Some(commands);

        Ok(())
    }

    async fn send(&mut self, bytes: Bytes) -> Result<()> {
        let Some(commands) = &self.commands else {
            return Err(Error::StreamNotInitialized(self.sink.clone()));
        };

        trace!(sink = %self.sink, len = bytes.len(), "queueing write");

        self.request(commands, |reply| Command::Write { bytes, reply })
            .await
    }

    async fn close(&mut self) -> Result<()> {
        let Some(commands) = self.commands.take() else {
            return Ok(());
        };

        self.request(&commands, |reply| Command::Close { reply })
            .await?;

        debug!(sink = %self.sink, "closed native backend");

        Ok(())
    }

    fn open_blocking(&mut self) -> Result<()> {
        if self.commands.is_some() {
            return Ok(());
        }

        let (ready, response) = std_mpsc::sync_channel(1);
        let commands = self.spawn_writer(Reply::Thread(ready))?;

        response.recv().map_err(|_| self.worker_gone())??;

        debug!(sink = %self.sink, "opened native backend");
        self.commands = Some(commands);

        Ok(())
    }

    fn send_blocking(&mut self, bytes: Bytes) -> Result<()> {
        let Some(commands) = &self.commands else {
            return Err(Error::StreamNotInitialized(self.sink.clone()));
        };

        trace!(sink = %self.sink, len = bytes.len(), "queueing write");

        self.request_blocking(commands, |reply| Command::Write { bytes, reply })
    }

    fn close_blocking(&mut self) -> Result<()> {
        let Some(commands) = self.commands.take() else {
            return Ok(());
        };

        self.request_blocking(&commands, |reply| Command::Close { reply })?;

        debug!(sink = %self.sink, "closed native backend");

        Ok(())
    }

    fn is_open(&self) -> bool {
        self.commands.is_some()
    }

    fn sink(&self) -> &SinkId {
        &self.sink
    }
}

fn run_writer(sink: &SinkId, mut commands: mpsc::UnboundedReceiver<Command>, ready: Reply) {
    let target = match SinkTarget::open(sink) {
        Ok(target) => {
            ready.send(Ok(()));
            target
        }
        Err(e) => {
            ready.send(Err(e));
            return;
        }
    };

    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::Write { bytes, reply } => reply.send(target.write_all(&bytes)),
            Command::Close { reply } => {
                let result = target.flush();
                drop(target);
                reply.send(result);
                return;
            }
        }
    }
}

/// Creates [`NativeBackend`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeBackendFactory;

impl BackendFactory for NativeBackendFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::NativeAsync
    }

    fn create(&self, sink: &SinkId) -> Box<dyn SinkBackend> {
        Box::new(NativeBackend::new(sink.clone()))
    }
}
