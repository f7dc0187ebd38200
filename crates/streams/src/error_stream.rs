//! Direct writes to the process error stream, used to report failures of the
//! logging machinery itself.

use crate::Result;
use crate::resource::BackendSlot;

use std::io;
use std::sync::Arc;

use logbuch_backend::SinkTarget;
use tokio::task::spawn_blocking;

/// Writer bound to the process-wide error-stream lock.
///
/// Holds the same lock as every `<stderr>` stream resource, so a report never
/// interleaves with a log record written to the error stream.
#[derive(Clone, Debug)]
pub struct ErrorStream {
    lock: Arc<BackendSlot>,
}

impl ErrorStream {
    pub(crate) const fn new(lock: Arc<BackendSlot>) -> Self {
        Self { lock }
    }

    /// Writes `bytes` to the error stream.
    ///
    /// The write runs on the blocking pool while the task holds the lock.
    ///
    /// # Errors
    ///
    /// Propagates the write failure.
    pub async fn report(&self, bytes: &[u8]) -> Result<()> {
        let bytes = bytes.to_vec();

        self.write_off_thread(move || SinkTarget::Stderr.write_all(&bytes))
            .await
    }

    /// Writes `bytes` to the error stream from a blocking context.
    ///
    /// # Errors
    ///
    /// Fails with `WouldDeadlock` when the lock is held and the calling thread
    /// drives a runtime, and propagates the write failure.
    pub fn report_blocking(&self, bytes: &[u8]) -> Result<()> {
        let _guard = self.lock.acquire_blocking()?;

        Ok(SinkTarget::Stderr.write_all(bytes)?)
    }

    /// Whether the error-stream lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    async fn write_off_thread<F>(&self, write: F) -> Result<()>
    where
        F: FnOnce() -> logbuch_backend::Result<()> + Send + 'static,
    {
        let _guard = self.lock.acquire_async().await;

        // A cancelled report finishes its write detached. Stderr writes hold
        // the process stderr lock, so it still lands whole.
        spawn_blocking(write).await.map_err(|e| {
            logbuch_backend::Error::Io("worker thread failed", io::Error::other(e))
        })??;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_report() {
        let stream = ErrorStream::new(Arc::new(BackendSlot::default()));

        stream.report(b"").await.unwrap();
        assert!(!stream.is_locked());
    }

    #[tokio::test]
    async fn test_report_writes_off_the_runtime_thread_under_the_lock() {
        let lock = Arc::new(BackendSlot::default());
        let stream = ErrorStream::new(Arc::clone(&lock));
        let runtime_thread = std::thread::current().id();

        let observed = Arc::new(parking_lot::Mutex::new(None));
        let seen = Arc::clone(&observed);
        stream
            .write_off_thread(move || {
                *seen.lock() = Some((std::thread::current().id(), lock.is_locked()));
                Ok(())
            })
            .await
            .unwrap();

        let (writer_thread, locked) = observed.lock().take().unwrap();
        assert_ne!(writer_thread, runtime_thread);
        assert!(locked);
        assert!(!stream.is_locked());
    }

    #[tokio::test]
    async fn test_report_propagates_write_failure() {
        let stream = ErrorStream::new(Arc::new(BackendSlot::default()));

        let result = stream
            .write_off_thread(|| {
                Err(logbuch_backend::Error::Io(
                    "error writing to sink",
                    io::Error::other("closed"),
                ))
            })
            .await;

        assert_matches!(
            result,
            Err(crate::Error::Backend(logbuch_backend::Error::Io(_, _)))
        );
        assert!(!stream.is_locked());
    }

    #[tokio::test]
    async fn test_report_blocking_while_held_on_runtime_thread() {
        let lock = Arc::new(BackendSlot::default());
        let stream = ErrorStream::new(Arc::clone(&lock));

        let _guard = lock.acquire_async().await;
        let result = stream.report_blocking(b"");

        assert!(result.unwrap_err().is_would_deadlock());
    }

    #[tokio::test]
    async fn test_report_blocking_on_runtime_thread_while_free() {
        let stream = ErrorStream::new(Arc::new(BackendSlot::default()));

        stream.report_blocking(b"").unwrap();
        assert!(!stream.is_locked());
    }

    #[test]
    fn test_report_blocking_from_plain_thread() {
        let stream = ErrorStream::new(Arc::new(BackendSlot::default()));

        stream.report_blocking(b"").unwrap();
        assert!(!stream.is_locked());
    }
}
