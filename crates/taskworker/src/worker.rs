//! Workers and the task engine
//!
//! A [`Worker`] owns one backend thread and one job queue. Any thread may
//! submit jobs with [`Worker::enqueue_task`]; the worker's own thread drains
//! them with [`Worker::execute_task`], usually in a loop:
//!
//! ```text
//!  producer threads                    worker thread
//!  ────────────────                    ─────────────
//!  enqueue_task(h, cb, payload) ──┐    loop {
//!                                 ▼        execute_task(timeout)
//!                        ┌──────────────┐      │
//!                        │   JobQueue   │ ─────┘ pop one job
//!                        │ (FIFO, bound)│      h(payload, completion)
//!                        └──────────────┘          └─ cb(code, data)
//!                                          }
//! ```
//!
//! Callbacks run on the worker thread, never on the submitter's.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::mpsc;
//! use taskworker::{callback, create_worker, handler, JobStorage, StdBackend, Timeout, WorkerConfig};
//!
//! let backend = Arc::new(StdBackend::new());
//! let worker = create_worker(
//!     WorkerConfig::new("adder"),
//!     JobStorage::<8>::with_capacity(4),
//!     backend,
//!     |worker| worker.run_forever(),
//! )
//! .unwrap();
//!
//! let add = handler(|payload, done| done.complete(1, &[payload[0] + payload[1]]));
//! let (tx, rx) = mpsc::channel();
//! let tx = parking_lot::Mutex::new(tx);
//! let report = callback(move |event| tx.lock().send((event.code, event.data[0])).unwrap());
//!
//! assert!(worker.enqueue_task(&add, Some(&report), &[3, 4], Timeout::Forever));
//! assert_eq!(rx.recv().unwrap(), (1, 7));
//! ```

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::backend::{Backend, BackendRegistry, ThreadHandle};
use crate::config::{EngineMode, WorkerConfig};
use crate::engine::{DirectDispatch, Dispatch, Enqueued, QueuedDispatch};
use crate::error::{Result, SubmitError, WorkerError};
use crate::job::{Callback, Handler, Job, JobOutcome, DEFAULT_SLOT_SIZE};
use crate::queue::JobStorage;
use crate::timeout::Timeout;

/// Worker lifecycle
///
/// `Running` is terminal; workers are never stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum WorkerState {
    /// Defined, no queue or thread yet
    Uninitialized = 0,
    /// Queue storage and thread attached
    Bound = 1,
    /// Worker thread has entered its execute loop
    Running = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Bound,
            _ => Self::Running,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Bound => write!(f, "bound"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Per-worker counters
#[derive(Debug, Default)]
pub struct WorkerStats {
    submitted: AtomicU64,
    rejected: AtomicU64,
    executed: AtomicU64,
    handler_failures: AtomicU64,
    callbacks: AtomicU64,
}

impl WorkerStats {
    fn record_outcome(&self, outcome: JobOutcome) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .fetch_add(outcome.callbacks as u64, Ordering::Relaxed);
        if !outcome.success {
            self.handler_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            callbacks: self.callbacks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Jobs accepted
    pub submitted: u64,
    /// Submissions refused (queue full or payload too large)
    pub rejected: u64,
    /// Handlers run to completion
    pub executed: u64,
    /// Handlers that returned `false`
    pub handler_failures: u64,
    /// Callback invocations made by handlers
    pub callbacks: u64,
}

/// An execution context with its own thread and job queue
///
/// `SLOT` is the maximum payload size in bytes.
pub struct Worker<const SLOT: usize = DEFAULT_SLOT_SIZE> {
    config: WorkerConfig,
    backend: Backend,
    dispatch: Box<dyn Dispatch<SLOT>>,
    state: AtomicU8,
    stats: WorkerStats,
    consumer: Mutex<()>,
    thread: Mutex<Option<ThreadHandle>>,
}

/// Bind storage to a worker definition and start its thread
///
/// `thread_fn` runs on the new thread with a handle to the worker and is
/// expected to call [`Worker::execute_task`] in a loop.
///
/// # Errors
///
/// - [`WorkerError::Config`] for an invalid definition or zero-capacity storage
/// - [`WorkerError::ResourceExhausted`] if the backend cannot allocate the
///   queue primitives or the thread
#[instrument(skip_all, fields(worker = %config.name, engine = %config.engine))]
pub fn create_worker<const SLOT: usize, F>(
    config: WorkerConfig,
    storage: JobStorage<SLOT>,
    backend: Backend,
    thread_fn: F,
) -> Result<Arc<Worker<SLOT>>>
where
    F: FnOnce(Arc<Worker<SLOT>>) + Send + 'static,
{
    config.validate()?;

    let capacity = storage.capacity();
    if capacity == 0 {
        warn!("Rejecting worker with zero-capacity job buffer");
        return Err(WorkerError::config(format!(
            "worker '{}': job buffer capacity is zero",
            config.name
        )));
    }

    let dispatch: Box<dyn Dispatch<SLOT>> = match config.engine {
        EngineMode::Queued => Box::new(QueuedDispatch::new(storage, backend.as_ref())?),
        EngineMode::Direct => Box::new(DirectDispatch::new(
            Arc::clone(&backend),
            config.idle_delay,
        )),
    };

    let params = config.thread_params();
    let worker = Arc::new(Worker {
        config,
        backend: Arc::clone(&backend),
        dispatch,
        state: AtomicU8::new(WorkerState::Uninitialized as u8),
        stats: WorkerStats::default(),
        consumer: Mutex::new(()),
        thread: Mutex::new(None),
    });

    let thread_worker = Arc::clone(&worker);
    let handle = backend
        .spawn(&params, Box::new(move || thread_fn(thread_worker)))
        .inspect_err(|e| error!(backend = backend.name(), "Failed to start worker thread: {}", e))?;

    *worker.thread.lock() = Some(handle);
    // The thread may already have marked the worker Running
    let _ = worker.state.compare_exchange(
        WorkerState::Uninitialized as u8,
        WorkerState::Bound as u8,
        Ordering::AcqRel,
        Ordering::Acquire,
    );

    info!(
        backend = backend.name(),
        capacity,
        slot_size = SLOT,
        priority = params.priority,
        stack_size = params.stack_size,
        "Worker created"
    );

    Ok(worker)
}

impl<const SLOT: usize> Worker<SLOT> {
    /// [`create_worker`] with the backend taken from `registry`
    ///
    /// Fails with [`WorkerError::Config`] if no backend is registered.
    pub fn create<F>(
        config: WorkerConfig,
        storage: JobStorage<SLOT>,
        registry: &BackendRegistry,
        thread_fn: F,
    ) -> Result<Arc<Self>>
    where
        F: FnOnce(Arc<Self>) + Send + 'static,
    {
        let backend = registry.get()?;
        create_worker(config, storage, backend, thread_fn)
    }

    /// Run at most one job, waiting up to `timeout` for one to arrive
    ///
    /// Must be called from the worker's own thread. Returns `true` if a job
    /// ran, `false` on timeout. Handlers must not call this on their own
    /// worker.
    ///
    /// On a [`TokioBackend`](crate::TokioBackend) a non-immediate timeout
    /// blocks through `Handle::block_on` and panics inside an async task.
    pub fn execute_task(&self, timeout: Timeout) -> bool {
        self.mark_running();

        let _consumer = self.consumer.lock();
        let Some(job) = self.dispatch.next(timeout) else {
            trace!(worker = %self.config.name, %timeout, "No job");
            return false;
        };

        let outcome = job.run();
        self.stats.record_outcome(outcome);
        if outcome.success {
            trace!(worker = %self.config.name, callbacks = outcome.callbacks, "Job done");
        } else {
            debug!(worker = %self.config.name, "Handler reported failure");
        }
        true
    }

    /// Submit a job to this worker
    ///
    /// `payload` is copied; the caller may reuse it as soon as this returns.
    /// Blocks up to `timeout` while the queue is full. Returns `false` if the
    /// job was not accepted.
    ///
    /// With [`Timeout::Forever`] a queue that never drains blocks the caller
    /// forever.
    ///
    /// On a [`TokioBackend`](crate::TokioBackend) a non-immediate timeout
    /// blocks through `Handle::block_on`, so it must not be called from
    /// inside an async task; use [`Timeout::Immediate`] or move the call
    /// onto `spawn_blocking` there.
    pub fn enqueue_task(
        &self,
        handler: &Handler,
        callback: Option<&Callback>,
        payload: &[u8],
        timeout: Timeout,
    ) -> bool {
        self.try_submit(handler, callback, payload, timeout).is_ok()
    }

    /// [`enqueue_task`](Self::enqueue_task) reporting why a job was refused
    pub fn try_submit(
        &self,
        handler: &Handler,
        callback: Option<&Callback>,
        payload: &[u8],
        timeout: Timeout,
    ) -> std::result::Result<(), SubmitError> {
        let job = Job::new(Arc::clone(handler), callback.cloned(), payload).inspect_err(|e| {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(worker = %self.config.name, "Rejected job: {}", e);
        })?;

        match self.dispatch.enqueue(job, timeout) {
            Ok(enqueued) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                if let Enqueued::Ran(outcome) = enqueued {
                    self.stats.record_outcome(outcome);
                }
                trace!(worker = %self.config.name, len = payload.len(), "Job accepted");
                Ok(())
            }
            Err(e) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(worker = %self.config.name, %timeout, "Queue full, job not accepted");
                Err(e)
            }
        }
    }

    /// Application-facing name for [`enqueue_task`](Self::enqueue_task)
    ///
    /// Same blocking rules apply, including the async-task restriction on
    /// the tokio backend.
    pub fn submit(
        &self,
        handler: &Handler,
        callback: Option<&Callback>,
        payload: &[u8],
        timeout: Timeout,
    ) -> bool {
        self.enqueue_task(handler, callback, payload, timeout)
    }

    /// Application-facing name for [`execute_task`](Self::execute_task)
    ///
    /// Same blocking rules apply, including the async-task restriction on
    /// the tokio backend.
    pub fn pump(&self, timeout: Timeout) -> bool {
        self.execute_task(timeout)
    }

    /// Execute jobs forever, waiting one idle period per iteration
    pub fn run_forever(&self) -> ! {
        let timeout = Timeout::from(self.config.idle_delay);
        debug!(worker = %self.config.name, %timeout, "Entering run loop");
        loop {
            self.execute_task(timeout);
        }
    }

    /// Suspend the calling thread through the worker's backend
    pub fn delay(&self, duration: Duration) {
        self.backend.delay(duration);
    }

    /// Suspend the calling thread for one idle period
    pub fn idle(&self) {
        self.backend.delay(self.config.idle_delay);
    }

    fn mark_running(&self) {
        let previous = self.state.swap(WorkerState::Running as u8, Ordering::AcqRel);
        if previous != WorkerState::Running as u8 {
            debug!(worker = %self.config.name, "Worker running");
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn priority(&self) -> u8 {
        self.config.priority
    }

    pub fn idle_delay(&self) -> Duration {
        self.config.idle_delay
    }

    pub fn stack_size(&self) -> usize {
        self.config.stack_size
    }

    pub fn engine(&self) -> EngineMode {
        self.dispatch.mode()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Jobs waiting in the queue
    pub fn pending(&self) -> usize {
        self.dispatch.pending()
    }

    /// Queue capacity in jobs (0 for inline dispatch)
    pub fn capacity(&self) -> usize {
        self.dispatch.capacity()
    }

    pub const fn slot_size(&self) -> usize {
        SLOT
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl<const SLOT: usize> std::fmt::Debug for Worker<SLOT> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("engine", &self.engine())
            .field("pending", &self.pending())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendDescriptor, StdBackend, StdSemaphore};
    use crate::job::{callback, handler};
    use std::time::Instant;

    fn std_backend() -> Backend {
        Arc::new(StdBackend::new())
    }

    /// Worker whose thread returns immediately, so the test drives execute_task
    fn idle_worker<const SLOT: usize>(capacity: usize) -> Arc<Worker<SLOT>> {
        create_worker(
            WorkerConfig::new("test"),
            JobStorage::<SLOT>::with_capacity(capacity),
            std_backend(),
            |_| {},
        )
        .unwrap()
    }

    #[test]
    fn test_zero_capacity_is_config_error() {
        let err = create_worker(
            WorkerConfig::new("empty"),
            JobStorage::<8>::with_capacity(0),
            std_backend(),
            |_| {},
        )
        .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = create_worker(
            WorkerConfig::new(" "),
            JobStorage::<8>::with_capacity(1),
            std_backend(),
            |_| {},
        )
        .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_unregistered_backend_is_config_error() {
        let registry = BackendRegistry::new();
        let err =
            Worker::create(WorkerConfig::new("w"), JobStorage::<8>::with_capacity(1), &registry, |_| {})
                .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_spawn_failure_is_resource_exhausted() {
        let backend = BackendDescriptor::new("broken")
            .with_spawn(|_, _| Err(WorkerError::resource("no threads left")))
            .with_delay(|_| {})
            .with_semaphore(|initial, max| Ok(Arc::new(StdSemaphore::new(initial, max))))
            .build()
            .unwrap();

        let err = create_worker(
            WorkerConfig::new("w"),
            JobStorage::<8>::with_capacity(1),
            Arc::new(backend),
            |_| {},
        )
        .unwrap_err();
        assert_eq!(err, WorkerError::resource("no threads left"));
    }

    #[test]
    fn test_state_transitions() {
        let worker = idle_worker::<8>(1);
        assert_eq!(worker.state(), WorkerState::Bound);

        assert!(!worker.execute_task(Timeout::Immediate));
        assert_eq!(worker.state(), WorkerState::Running);
    }

    #[test]
    fn test_execute_times_out_without_job() {
        let worker = idle_worker::<8>(1);
        let start = Instant::now();
        assert!(!worker.execute_task(Timeout::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_huge_timeout_waits_for_job() {
        let worker = idle_worker::<8>(1);
        let h = handler(|_, _| true);
        assert!(worker.submit(&h, None, &[1], Timeout::After(Duration::MAX)));
        assert!(worker.pump(Timeout::After(Duration::MAX)));

        let consumer = {
            let worker = Arc::clone(&worker);
            std::thread::spawn(move || worker.pump(Timeout::After(Duration::MAX)))
        };
        std::thread::sleep(Duration::from_millis(20));
        assert!(worker.submit(&h, None, &[2], Timeout::Immediate));
        assert!(consumer.join().unwrap());
        assert_eq!(worker.stats().executed, 2);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let worker = idle_worker::<4>(2);
        let h = handler(|_, _| true);

        assert_eq!(
            worker.try_submit(&h, None, &[0; 5], Timeout::Immediate),
            Err(SubmitError::PayloadTooLarge { len: 5, max: 4 })
        );
        assert_eq!(worker.pending(), 0);
        assert_eq!(worker.stats().rejected, 1);
    }

    #[test]
    fn test_stats_track_outcomes() {
        let worker = idle_worker::<8>(4);
        let report = callback(|_| {});
        let ok = handler(|_, done| done.complete(1, &[]));
        let failing = handler(|_, _| false);

        assert!(worker.submit(&ok, Some(&report), &[], Timeout::Immediate));
        assert!(worker.submit(&failing, None, &[], Timeout::Immediate));
        assert!(worker.pump(Timeout::Immediate));
        assert!(worker.pump(Timeout::Immediate));
        assert!(!worker.pump(Timeout::Immediate));

        assert_eq!(
            worker.stats(),
            StatsSnapshot {
                submitted: 2,
                rejected: 0,
                executed: 2,
                handler_failures: 1,
                callbacks: 1,
            }
        );
    }

    #[test]
    fn test_direct_engine_runs_on_submitter() {
        let worker: Arc<Worker<8>> = create_worker(
            WorkerConfig::new("direct").with_engine(EngineMode::Direct),
            JobStorage::with_capacity(1),
            std_backend(),
            |_| {},
        )
        .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let report = callback(move |event| {
            sink.lock()
                .push((event.code, event.data.to_vec(), std::thread::current().id()))
        });
        let echo = handler(|payload, done| done.complete(9, payload));

        assert!(worker.submit(&echo, Some(&report), b"hi", Timeout::Immediate));
        assert_eq!(
            *seen.lock(),
            vec![(9, b"hi".to_vec(), std::thread::current().id())]
        );
        assert_eq!(worker.engine(), EngineMode::Direct);
        assert_eq!(worker.capacity(), 0);
        assert!(!worker.pump(Timeout::Immediate));
        assert_eq!(worker.stats().executed, 1);
    }

    #[test]
    fn test_thread_fn_receives_worker() {
        let (tx, rx) = std::sync::mpsc::channel();
        let worker: Arc<Worker<8>> = create_worker(
            WorkerConfig::new("named").with_priority(5),
            JobStorage::with_capacity(1),
            std_backend(),
            move |worker| {
                tx.send((worker.name().to_string(), worker.priority())).unwrap();
            },
        )
        .unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            ("named".to_string(), 5)
        );
        assert_eq!(worker.slot_size(), 8);
    }
}
