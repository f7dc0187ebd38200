//! A mutual-exclusion lock usable from both async tasks and plain blocking
//! threads.
//!
//! Async callers suspend until the lock is free. Blocking callers park their
//! OS thread, unless the calling thread is itself driving a runtime: parking
//! that thread could prevent the current holder from ever being polled again,
//! so the acquisition is refused with [`Error::WouldDeadlock`] instead.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::{Error, Result};

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tracing::debug;

/// The context that currently holds a [`CrossContextLock`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Holder {
    /// An async task, polled on the given thread when it acquired the lock.
    Cooperative(ThreadId),

    /// A blocking caller on the given thread.
    Blocking(ThreadId),
}

/// Whether the calling thread has a tokio runtime entered.
///
/// This also holds on `spawn_blocking` workers, which makes the deadlock
/// check conservative there.
#[must_use]
pub fn current_thread_drives_scheduler() -> bool {
    tokio::runtime::Handle::try_current().is_ok()
}

/// Lock with one `held` flag and two wait queues: parked threads wait on a
/// condition variable, suspended tasks wait on a [`Notify`].
pub struct CrossContextLock<T: ?Sized = ()> {
    held: AtomicBool,
    holder: Mutex<Option<Holder>>,
    parked: Mutex<usize>,
    unparked: Condvar,
    tasks: Notify,
    waiting_tasks: AtomicUsize,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is only handed out through a guard, and at most one
// guard exists at a time because `held` is taken with a compare-exchange.
unsafe impl<T: ?Sized + Send> Sync for CrossContextLock<T> {}

impl<T> CrossContextLock<T> {
    /// Creates an unlocked lock protecting `data`.
    pub fn new(data: T) -> Self {
        Self {
            held: AtomicBool::new(false),
            holder: Mutex::new(None),
            parked: Mutex::new(0),
            unparked: Condvar::new(),
            tasks: Notify::new(),
            waiting_tasks: AtomicUsize::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// Consumes the lock, returning the protected data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> CrossContextLock<T> {
    /// Suspends the current task until the lock is acquired.
    ///
    /// Cancel safe: dropping the future before it completes leaves the lock
    /// untouched and hands any wake-up it received to the next waiter.
    pub async fn acquire_async(&self) -> CrossContextGuard<'_, T> {
        let holder = Holder::Cooperative(thread::current().id());

        loop {
            if let Some(guard) = self.try_acquire_as(holder) {
                return guard;
            }

            let notified = self.tasks.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            // A release between the first attempt and `enable` would
            // otherwise be missed.
            if let Some(guard) = self.try_acquire_as(holder) {
                return guard;
            }

            let _ticket = WaiterTicket::new(&self.waiting_tasks);
            notified.await;
        }
    }

    /// Blocks the current thread until the lock is acquired.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WouldDeadlock`] without blocking when the lock is held
    /// and either the calling thread drives a runtime, or the calling thread
    /// already holds the lock in blocking mode.
    pub fn acquire_blocking(&self) -> Result<CrossContextGuard<'_, T>> {
        let current = thread::current().id();
        let holder = Holder::Blocking(current);

        if let Some(guard) = self.try_acquire_as(holder) {
            return Ok(guard);
        }

        if current_thread_drives_scheduler() || self.holder() == Some(holder) {
            debug!(?current, "refusing blocking acquisition");
            return Err(Error::WouldDeadlock);
        }

        let mut parked = self.parked.lock();
        *parked += 1;
        let guard = loop {
            if let Some(guard) = self.try_acquire_as(holder) {
                break guard;
            }
            self.unparked.wait(&mut parked);
        };
        *parked -= 1;

        Ok(guard)
    }

    /// Acquires the lock if it is free, without waiting.
    pub fn try_acquire(&self) -> Option<CrossContextGuard<'_, T>> {
        let current = thread::current().id();
        let holder = if current_thread_drives_scheduler() {
            Holder::Cooperative(current)
        } else {
            Holder::Blocking(current)
        };

        self.try_acquire_as(holder)
    }

    /// Whether the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Number of tasks and threads currently waiting for the lock.
    pub fn waiters(&self) -> usize {
        *self.parked.lock() + self.waiting_tasks.load(Ordering::Acquire)
    }

    /// The context currently holding the lock, if any.
    pub fn holder(&self) -> Option<Holder> {
        *self.holder.lock()
    }

    /// Mutable access without locking, given exclusive ownership.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    fn try_acquire_as(&self, holder: Holder) -> Option<CrossContextGuard<'_, T>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()?;

        *self.holder.lock() = Some(holder);

        Some(CrossContextGuard {
            lock: self,
            _marker: PhantomData,
        })
    }

    fn release(&self) {
        *self.holder.lock() = None;
        self.held.store(false, Ordering::Release);

        // Taking the mutex orders this wake-up after any parked thread's
        // failed attempt, so it cannot be lost.
        {
            let parked = self.parked.lock();
            if *parked > 0 {
                self.unparked.notify_one();
            }
        }

        self.tasks.notify_one();
    }
}

impl<T: Default> Default for CrossContextLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> fmt::Debug for CrossContextLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossContextLock")
            .field("held", &self.is_locked())
            .field("holder", &self.holder())
            .field("waiters", &self.waiters())
            .finish_non_exhaustive()
    }
}

/// Exclusive access to the data of a [`CrossContextLock`]. Releases the lock
/// when dropped, including on unwind and on task cancellation.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct CrossContextGuard<'a, T: ?Sized> {
    lock: &'a CrossContextLock<T>,
    _marker: PhantomData<&'a mut T>,
}

impl<T: ?Sized> CrossContextGuard<'_, T> {
    /// Releases the lock.
    pub fn release(self) {
        drop(self);
    }
}

impl<T: ?Sized> Deref for CrossContextGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves exclusive ownership of the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for CrossContextGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves exclusive ownership of the lock.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for CrossContextGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for CrossContextGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

struct WaiterTicket<'a>(&'a AtomicUsize);

impl<'a> WaiterTicket<'a> {
    fn new(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        Self(count)
    }
}

impl Drop for WaiterTicket<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
