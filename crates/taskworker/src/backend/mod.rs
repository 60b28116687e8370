//! Thread backend interface
//!
//! The engine never talks to a concurrency runtime directly. Everything it
//! needs goes through [`ThreadBackend`]:
//!
//! - [`ThreadBackend::spawn`] - start a long-lived thread
//! - [`ThreadBackend::delay`] - cooperative sleep
//! - [`ThreadBackend::semaphore`] - the signal/wait primitive job queues are built on
//!
//! Implementations:
//!
//! - [`StdBackend`] - OS threads, `parking_lot` condvar semaphores
//! - [`TokioBackend`] - tokio blocking pool, `tokio::sync::Semaphore`
//! - [`FnBackend`] - a table of closures assembled via [`BackendDescriptor`]
//!
//! Exactly one backend is meant to be active per process. [`BackendRegistry`]
//! holds it; registration is write-once.

mod descriptor;
mod registry;
mod std_thread;
mod tokio_rt;

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::timeout::Timeout;

pub use descriptor::{BackendDescriptor, FnBackend};
pub use registry::{global, register_backend, BackendRegistry};
pub use std_thread::{StdBackend, StdSemaphore};
pub use tokio_rt::{TokioBackend, TokioSemaphore};

/// Shared handle to the active backend
pub type Backend = Arc<dyn ThreadBackend>;

/// Entry point of a backend thread
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Capability set a concurrency runtime must provide to host workers
pub trait ThreadBackend: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Create and start a thread running `entry`
    ///
    /// Failure is reported as [`WorkerError::ResourceExhausted`](crate::WorkerError)
    /// and must never bring down the caller.
    fn spawn(&self, params: &ThreadParams, entry: ThreadEntry) -> Result<ThreadHandle>;

    /// Suspend the calling thread for at least `duration`
    fn delay(&self, duration: Duration);

    /// Allocate a counting semaphore holding `initial` permits, capped at `max`
    fn semaphore(&self, initial: usize, max: usize) -> Result<Arc<dyn Semaphore>>;
}

/// Counting signal/wait primitive
pub trait Semaphore: Send + Sync {
    /// Take one permit, waiting up to `timeout`. Returns `false` on timeout.
    fn wait(&self, timeout: Timeout) -> bool;

    /// Return one permit. Signalling a semaphore at its cap is a no-op.
    fn signal(&self);

    /// Permits currently available
    fn count(&self) -> usize;
}

/// Parameters for a backend thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadParams {
    pub name: String,
    /// Requested stack budget in bytes; backends may round it up
    pub stack_size: usize,
    pub priority: u8,
}

impl ThreadParams {
    pub fn new(name: impl Into<String>, stack_size: usize, priority: u8) -> Self {
        Self {
            name: name.into(),
            stack_size,
            priority,
        }
    }
}

enum HandleKind {
    Std(std::thread::JoinHandle<()>),
    Tokio(tokio::task::JoinHandle<()>),
    Detached,
}

/// Handle to a running backend thread
///
/// Threads are never joined; the handle only keeps the backend's join
/// handle alive and allows liveness checks.
pub struct ThreadHandle {
    name: String,
    backend: &'static str,
    kind: HandleKind,
}

impl ThreadHandle {
    pub(crate) fn from_std(name: String, handle: std::thread::JoinHandle<()>) -> Self {
        Self {
            name,
            backend: "std",
            kind: HandleKind::Std(handle),
        }
    }

    pub(crate) fn from_tokio(name: String, handle: tokio::task::JoinHandle<()>) -> Self {
        Self {
            name,
            backend: "tokio",
            kind: HandleKind::Tokio(handle),
        }
    }

    /// Handle for a thread the backend does not track
    pub fn detached(name: impl Into<String>, backend: &'static str) -> Self {
        Self {
            name: name.into(),
            backend,
            kind: HandleKind::Detached,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the backend that created the thread
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Whether the thread function has returned (`None` if untracked)
    pub fn is_finished(&self) -> Option<bool> {
        match &self.kind {
            HandleKind::Std(h) => Some(h.is_finished()),
            HandleKind::Tokio(h) => Some(h.is_finished()),
            HandleKind::Detached => None,
        }
    }
}

impl std::fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("name", &self.name)
            .field("backend", &self.backend)
            .field("finished", &self.is_finished())
            .finish()
    }
}
