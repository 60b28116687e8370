//! Dispatch strategies
//!
//! A worker hands submitted jobs to a [`Dispatch`] and asks it for the next
//! job to run. Two strategies share that contract:
//!
//! - [`QueuedDispatch`] - bounded FIFO queue drained by the worker thread
//! - [`DirectDispatch`] - jobs run inline on the submitter; the worker thread
//!   only idles
//!
//! Which one a worker uses is chosen at runtime via
//! [`EngineMode`](crate::config::EngineMode).

use std::time::Duration;

use tracing::trace;

use crate::backend::{Backend, ThreadBackend};
use crate::config::EngineMode;
use crate::error::{Result, SubmitError};
use crate::job::{Job, JobOutcome};
use crate::queue::{JobQueue, JobStorage};
use crate::timeout::Timeout;

/// What happened to an accepted job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Waiting in the queue
    Queued,
    /// Already ran on the submitting thread
    Ran(JobOutcome),
}

/// Job hand-off between submitters and a worker
pub trait Dispatch<const SLOT: usize>: Send + Sync {
    fn mode(&self) -> EngineMode;

    /// Accept `job`, waiting up to `timeout` for room
    fn enqueue(&self, job: Job<SLOT>, timeout: Timeout) -> std::result::Result<Enqueued, SubmitError>;

    /// Next job for the worker thread, waiting up to `timeout`
    fn next(&self, timeout: Timeout) -> Option<Job<SLOT>>;

    /// Jobs accepted but not yet taken
    fn pending(&self) -> usize;

    fn capacity(&self) -> usize;
}

/// Bounded FIFO dispatch
#[derive(Debug)]
pub struct QueuedDispatch<const SLOT: usize> {
    queue: JobQueue<SLOT>,
}

impl<const SLOT: usize> QueuedDispatch<SLOT> {
    pub fn new(storage: JobStorage<SLOT>, backend: &dyn ThreadBackend) -> Result<Self> {
        Ok(Self {
            queue: JobQueue::new(storage, backend)?,
        })
    }
}

impl<const SLOT: usize> Dispatch<SLOT> for QueuedDispatch<SLOT> {
    fn mode(&self) -> EngineMode {
        EngineMode::Queued
    }

    fn enqueue(&self, job: Job<SLOT>, timeout: Timeout) -> std::result::Result<Enqueued, SubmitError> {
        self.queue
            .push(job, timeout)
            .map(|()| Enqueued::Queued)
            .map_err(|_rejected| SubmitError::Timeout)
    }

    fn next(&self, timeout: Timeout) -> Option<Job<SLOT>> {
        self.queue.pop(timeout)
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

/// Inline dispatch: no queue, no hand-off
pub struct DirectDispatch {
    backend: Backend,
    idle_delay: Duration,
}

impl DirectDispatch {
    pub fn new(backend: Backend, idle_delay: Duration) -> Self {
        Self {
            backend,
            idle_delay,
        }
    }
}

impl<const SLOT: usize> Dispatch<SLOT> for DirectDispatch {
    fn mode(&self) -> EngineMode {
        EngineMode::Direct
    }

    fn enqueue(&self, job: Job<SLOT>, _timeout: Timeout) -> std::result::Result<Enqueued, SubmitError> {
        trace!("Running job inline");
        Ok(Enqueued::Ran(job.run()))
    }

    fn next(&self, timeout: Timeout) -> Option<Job<SLOT>> {
        // Nothing ever arrives; a Forever wait idles one period so the
        // calling loop keeps cycling
        match timeout {
            Timeout::Immediate => {}
            Timeout::After(d) => self.backend.delay(d),
            Timeout::Forever => self.backend.delay(self.idle_delay),
        }
        None
    }

    fn pending(&self) -> usize {
        0
    }

    fn capacity(&self) -> usize {
        0
    }
}

impl std::fmt::Debug for DirectDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectDispatch")
            .field("backend", &self.backend.name())
            .field("idle_delay", &self.idle_delay)
            .finish()
    }
}
