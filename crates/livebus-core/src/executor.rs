//! Owning-context executor contract and a thread-bound reference loop.
//!
//! The bus confines every authoritative mutation to one logical context.
//! An [`OwningExecutor`] answers "am I on that context?" and accepts work
//! to run there later. [`LoopExecutor`] binds the context to the thread that
//! created it and runs posted tasks whenever that thread drains the queue.
//!
//! # Invariants
//!
//! 1. A task passed to [`OwningExecutor::post`] runs exactly once, on the
//!    owning context.
//! 2. Tasks run in the order they were posted.
//! 3. Draining never holds the queue lock while a task runs, so tasks may
//!    post further tasks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, mpsc};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::error::ContextError;

/// A unit of work scheduled onto the owning context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The single logical context that serializes dispatch.
pub trait OwningExecutor: Send + Sync {
    /// Whether the caller is currently running on the owning context.
    fn is_owning_context(&self) -> bool;

    /// Schedule `task` to run once, soon, on the owning context.
    ///
    /// Must not run the task synchronously on a foreign thread.
    fn post(&self, task: Task);
}

/// Fail with [`ContextError`] unless the caller is on the owning context.
pub fn ensure_owning_context(
    executor: &dyn OwningExecutor,
    operation: &'static str,
) -> Result<(), ContextError> {
    if executor.is_owning_context() {
        Ok(())
    } else {
        Err(ContextError::new(operation))
    }
}

/// A FIFO task loop owned by the thread that created it.
///
/// Other threads post tasks; the owning thread runs them with
/// [`run_pending`](Self::run_pending) or
/// [`run_next_timeout`](Self::run_next_timeout).
pub struct LoopExecutor {
    owner: ThreadId,
    sender: mpsc::Sender<Task>,
    receiver: Mutex<mpsc::Receiver<Task>>,
    queued: AtomicUsize,
}

impl std::fmt::Debug for LoopExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopExecutor")
            .field("owner", &self.owner)
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}

impl LoopExecutor {
    /// Create a loop owned by the calling thread.
    #[must_use]
    pub fn for_current_thread() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            owner: thread::current().id(),
            sender,
            receiver: Mutex::new(receiver),
            queued: AtomicUsize::new(0),
        }
    }

    /// The thread that owns this loop.
    #[must_use]
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Number of posted tasks that have not run yet.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Run queued tasks until the queue is empty, including tasks posted by
    /// the tasks themselves. Returns how many ran.
    pub fn run_pending(&self) -> Result<usize, ContextError> {
        ensure_owning_context(self, "run_pending")?;
        let mut ran = 0;
        while let Some(task) = self.try_next() {
            task();
            ran += 1;
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(ran, "loop executor drained");
        Ok(ran)
    }

    /// Wait up to `timeout` for one task and run it.
    ///
    /// Returns `Ok(false)` if nothing arrived in time.
    pub fn run_next_timeout(&self, timeout: Duration) -> Result<bool, ContextError> {
        ensure_owning_context(self, "run_next_timeout")?;
        let next = {
            let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
            receiver.recv_timeout(timeout).ok()
        };
        match next {
            Some(task) => {
                self.queued.fetch_sub(1, Ordering::AcqRel);
                task();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn try_next(&self) -> Option<Task> {
        let task = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv()
            .ok()?;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        Some(task)
    }
}

impl OwningExecutor for LoopExecutor {
    fn is_owning_context(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn post(&self, task: Task) {
        self.queued.fetch_add(1, Ordering::AcqRel);
        // The receiver lives as long as `self`, so the send cannot fail.
        if self.sender.send(task).is_err() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
