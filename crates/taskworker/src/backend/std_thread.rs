// OS thread backend
//
// Threads come from std::thread::Builder. Priorities have no portable std
// equivalent and are only recorded in logs. Stack budgets are raised to a
// floor that leaves room for tracing and formatting on hosted targets.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use super::{Semaphore, ThreadBackend, ThreadEntry, ThreadHandle, ThreadParams};
use crate::error::{Result, WorkerError};
use crate::timeout::Timeout;

/// Smallest stack handed to the OS, in bytes
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Backend running workers on native OS threads
#[derive(Debug, Clone)]
pub struct StdBackend {
    min_stack_size: usize,
}

impl Default for StdBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StdBackend {
    pub fn new() -> Self {
        Self {
            min_stack_size: MIN_STACK_SIZE,
        }
    }

    /// Override the stack floor
    pub fn with_min_stack_size(mut self, bytes: usize) -> Self {
        self.min_stack_size = bytes;
        self
    }

    fn effective_stack(&self, requested: usize) -> usize {
        requested.max(self.min_stack_size)
    }
}

impl ThreadBackend for StdBackend {
    fn name(&self) -> &'static str {
        "std"
    }

    fn spawn(&self, params: &ThreadParams, entry: ThreadEntry) -> Result<ThreadHandle> {
        let stack_size = self.effective_stack(params.stack_size);
        debug!(
            thread = %params.name,
            requested_stack = params.stack_size,
            stack_size,
            priority = params.priority,
            "Spawning OS thread"
        );

        std::thread::Builder::new()
            .name(params.name.clone())
            .stack_size(stack_size)
            .spawn(entry)
            .map(|handle| ThreadHandle::from_std(params.name.clone(), handle))
            .map_err(|e| {
                error!(thread = %params.name, "Failed to spawn thread: {}", e);
                WorkerError::resource(format!("failed to spawn thread '{}': {}", params.name, e))
            })
    }

    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn semaphore(&self, initial: usize, max: usize) -> Result<Arc<dyn Semaphore>> {
        Ok(Arc::new(StdSemaphore::new(initial, max)))
    }
}

/// Counting semaphore on a `parking_lot` mutex and condvar
#[derive(Debug)]
pub struct StdSemaphore {
    count: Mutex<usize>,
    max: usize,
    available: Condvar,
}

impl StdSemaphore {
    pub fn new(initial: usize, max: usize) -> Self {
        Self {
            count: Mutex::new(initial.min(max)),
            max,
            available: Condvar::new(),
        }
    }
}

impl Semaphore for StdSemaphore {
    fn wait(&self, timeout: Timeout) -> bool {
        let mut count = self.count.lock();

        match timeout.deadline() {
            None => {
                while *count == 0 {
                    self.available.wait(&mut count);
                }
            }
            Some(deadline) => {
                while *count == 0 {
                    if self.available.wait_until(&mut count, deadline).timed_out() && *count == 0
                    {
                        return false;
                    }
                }
            }
        }

        *count -= 1;
        true
    }

    fn signal(&self) {
        let mut count = self.count.lock();
        if *count < self.max {
            *count += 1;
            self.available.notify_one();
        }
    }

    fn count(&self) -> usize {
        *self.count.lock()
    }
}
