//! Closure-table backends
//!
//! Lets an embedding runtime plug in its own primitives without writing a
//! type. Every operation is required; [`BackendDescriptor::build`] rejects
//! incomplete tables.

use std::sync::Arc;
use std::time::Duration;

use super::{Semaphore, ThreadBackend, ThreadEntry, ThreadHandle, ThreadParams};
use crate::error::{Result, WorkerError};

type SpawnFn = Box<dyn Fn(&ThreadParams, ThreadEntry) -> Result<ThreadHandle> + Send + Sync>;
type DelayFn = Box<dyn Fn(Duration) + Send + Sync>;
type SemaphoreFn = Box<dyn Fn(usize, usize) -> Result<Arc<dyn Semaphore>> + Send + Sync>;

/// Builder for a [`FnBackend`]
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use taskworker::backend::{BackendDescriptor, StdBackend, ThreadBackend};
///
/// let std_backend = Arc::new(StdBackend::new());
/// let spawner = Arc::clone(&std_backend);
/// let sems = Arc::clone(&std_backend);
///
/// let backend = BackendDescriptor::new("custom")
///     .with_spawn(move |params, entry| spawner.spawn(params, entry))
///     .with_delay(std::thread::sleep)
///     .with_semaphore(move |initial, max| sems.semaphore(initial, max))
///     .build()
///     .unwrap();
///
/// assert_eq!(backend.name(), "custom");
/// ```
pub struct BackendDescriptor {
    name: &'static str,
    spawn: Option<SpawnFn>,
    delay: Option<DelayFn>,
    semaphore: Option<SemaphoreFn>,
}

impl BackendDescriptor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            spawn: None,
            delay: None,
            semaphore: None,
        }
    }

    pub fn with_spawn<F>(mut self, f: F) -> Self
    where
        F: Fn(&ThreadParams, ThreadEntry) -> Result<ThreadHandle> + Send + Sync + 'static,
    {
        self.spawn = Some(Box::new(f));
        self
    }

    pub fn with_delay<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.delay = Some(Box::new(f));
        self
    }

    pub fn with_semaphore<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) -> Result<Arc<dyn Semaphore>> + Send + Sync + 'static,
    {
        self.semaphore = Some(Box::new(f));
        self
    }

    /// Names of the operations still missing
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.spawn.is_none() {
            missing.push("spawn");
        }
        if self.delay.is_none() {
            missing.push("delay");
        }
        if self.semaphore.is_none() {
            missing.push("semaphore");
        }
        missing
    }

    /// Validate the table and produce a backend
    pub fn build(self) -> Result<FnBackend> {
        match (self.spawn, self.delay, self.semaphore) {
            (Some(spawn), Some(delay), Some(semaphore)) => Ok(FnBackend {
                name: self.name,
                spawn,
                delay,
                semaphore,
            }),
            (spawn, delay, semaphore) => {
                let missing: Vec<&str> = [
                    ("spawn", spawn.is_none()),
                    ("delay", delay.is_none()),
                    ("semaphore", semaphore.is_none()),
                ]
                .into_iter()
                .filter_map(|(op, absent)| absent.then_some(op))
                .collect();
                Err(WorkerError::config(format!(
                    "backend '{}' is missing operations: {}",
                    self.name,
                    missing.join(", ")
                )))
            }
        }
    }
}

impl std::fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name)
            .field("missing", &self.missing())
            .finish()
    }
}

/// Backend whose operations are plain closures
pub struct FnBackend {
    name: &'static str,
    spawn: SpawnFn,
    delay: DelayFn,
    semaphore: SemaphoreFn,
}

impl ThreadBackend for FnBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn spawn(&self, params: &ThreadParams, entry: ThreadEntry) -> Result<ThreadHandle> {
        (self.spawn)(params, entry)
    }

    fn delay(&self, duration: Duration) {
        (self.delay)(duration)
    }

    fn semaphore(&self, initial: usize, max: usize) -> Result<Arc<dyn Semaphore>> {
        (self.semaphore)(initial, max)
    }
}

impl std::fmt::Debug for FnBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnBackend").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StdSemaphore;

    #[test]
    fn test_incomplete_descriptor_rejected() {
        let err = BackendDescriptor::new("partial")
            .with_delay(|_| {})
            .build()
            .unwrap_err();

        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "configuration error: backend 'partial' is missing operations: spawn, semaphore"
        );
    }

    #[test]
    fn test_missing_lists_operations() {
        let descriptor = BackendDescriptor::new("empty");
        assert_eq!(descriptor.missing(), vec!["spawn", "delay", "semaphore"]);
    }

    #[test]
    fn test_complete_descriptor_dispatches() {
        let backend = BackendDescriptor::new("inline")
            .with_spawn(|params, entry| {
                entry();
                Ok(ThreadHandle::detached(params.name.clone(), "inline"))
            })
            .with_delay(|_| {})
            .with_semaphore(|initial, max| Ok(Arc::new(StdSemaphore::new(initial, max))))
            .build()
            .unwrap();

        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = std::sync::Arc::clone(&ran);
        let handle = backend
            .spawn(
                &ThreadParams::new("t", 0, 0),
                Box::new(move || flag.store(true, std::sync::atomic::Ordering::SeqCst)),
            )
            .unwrap();

        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(handle.is_finished(), None);
        assert_eq!(backend.semaphore(1, 1).unwrap().count(), 1);
    }
}
