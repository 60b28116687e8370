// Tokio backend
//
// Worker threads run on the runtime's blocking pool, so the engine's
// blocking waits never stall async tasks. Waits are driven through
// Handle::block_on, which is valid on blocking-pool threads and on threads
// outside the runtime, but panics inside an async task. The runtime must
// be built with the time driver enabled.
//
// spawn_blocking queues work when the pool is saturated or the runtime is
// gone, so spawn waits for the entry to actually start before reporting
// success.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::runtime::Handle;
use tracing::debug;

use super::{Semaphore, ThreadBackend, ThreadEntry, ThreadHandle, ThreadParams};
use crate::error::{Result, WorkerError};
use crate::timeout::Timeout;

/// How long a spawned thread has to start before spawn fails
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(1);

/// Backend hosting workers on a tokio runtime's blocking pool
#[derive(Debug, Clone)]
pub struct TokioBackend {
    handle: Handle,
    start_timeout: Duration,
}

impl TokioBackend {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            start_timeout: DEFAULT_START_TIMEOUT,
        }
    }

    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Backend for the runtime the caller is running in
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| WorkerError::config(format!("no tokio runtime available: {}", e)))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl ThreadBackend for TokioBackend {
    fn name(&self) -> &'static str {
        "tokio"
    }

    fn spawn(&self, params: &ThreadParams, entry: ThreadEntry) -> Result<ThreadHandle> {
        // Stack size is fixed per runtime (Builder::thread_stack_size)
        debug!(
            thread = %params.name,
            requested_stack = params.stack_size,
            priority = params.priority,
            "Spawning blocking task"
        );

        let gate = Arc::new(StartGate::default());
        let entry_gate = Arc::clone(&gate);
        let handle = self.handle.spawn_blocking(move || {
            if entry_gate.enter() {
                entry();
            }
        });

        if !gate.wait_started(self.start_timeout) {
            // Still queued; make sure it never runs
            handle.abort();
            return Err(WorkerError::resource(format!(
                "blocking pool did not start thread '{}' within {}ms",
                params.name,
                self.start_timeout.as_millis()
            )));
        }

        Ok(ThreadHandle::from_tokio(params.name.clone(), handle))
    }

    fn delay(&self, duration: Duration) {
        self.handle.block_on(tokio::time::sleep(duration));
    }

    fn semaphore(&self, initial: usize, max: usize) -> Result<Arc<dyn Semaphore>> {
        if max > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(WorkerError::resource(format!(
                "semaphore cap {} exceeds {}",
                max,
                tokio::sync::Semaphore::MAX_PERMITS
            )));
        }
        Ok(Arc::new(TokioSemaphore::new(
            self.handle.clone(),
            initial,
            max,
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartState {
    Pending,
    Started,
    Abandoned,
}

/// Start handshake between spawn and the blocking task
#[derive(Debug)]
struct StartGate {
    state: Mutex<StartState>,
    changed: Condvar,
}

impl Default for StartGate {
    fn default() -> Self {
        Self {
            state: Mutex::new(StartState::Pending),
            changed: Condvar::new(),
        }
    }
}

impl StartGate {
    /// Called on the new thread; `false` if spawn already gave up on it
    fn enter(&self) -> bool {
        let mut state = self.state.lock();
        if *state == StartState::Abandoned {
            return false;
        }
        *state = StartState::Started;
        self.changed.notify_all();
        true
    }

    fn wait_started(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        while *state == StartState::Pending {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.changed.wait(&mut state),
            }
        }

        if *state == StartState::Pending {
            *state = StartState::Abandoned;
            return false;
        }
        true
    }
}

/// Counting semaphore backed by `tokio::sync::Semaphore`
#[derive(Debug)]
pub struct TokioSemaphore {
    permits: tokio::sync::Semaphore,
    max: usize,
    handle: Handle,
    signal_lock: Mutex<()>,
}

impl TokioSemaphore {
    pub fn new(handle: Handle, initial: usize, max: usize) -> Self {
        Self {
            permits: tokio::sync::Semaphore::new(initial.min(max)),
            max,
            handle,
            signal_lock: Mutex::new(()),
        }
    }
}

impl Semaphore for TokioSemaphore {
    fn wait(&self, timeout: Timeout) -> bool {
        let acquired = match timeout {
            Timeout::Immediate => self.permits.try_acquire().ok(),
            Timeout::After(d) => self
                .handle
                .block_on(tokio::time::timeout(d, self.permits.acquire()))
                .ok()
                .and_then(|r| r.ok()),
            Timeout::Forever => self.handle.block_on(self.permits.acquire()).ok(),
        };

        match acquired {
            Some(permit) => {
                permit.forget();
                true
            }
            None => false,
        }
    }

    fn signal(&self) {
        let _guard = self.signal_lock.lock();
        if self.permits.available_permits() < self.max {
            self.permits.add_permits(1);
        }
    }

    fn count(&self) -> usize {
        self.permits.available_permits()
    }
}
