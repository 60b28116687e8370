//! Write-once backend registration
//!
//! A [`BackendRegistry`] accepts exactly one backend. Workers receive the
//! backend from the registry at creation time and keep their own handle, so
//! nothing reads the registry after setup.

use std::sync::{Arc, OnceLock};

use tracing::{info, warn};

use super::{Backend, ThreadBackend};
use crate::error::{Result, WorkerError};

static GLOBAL: BackendRegistry = BackendRegistry::new();

/// Holder for the single active backend
#[derive(Default)]
pub struct BackendRegistry {
    slot: OnceLock<Backend>,
}

impl BackendRegistry {
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// Register `backend`; fails if one is already registered
    ///
    /// A rejected registration leaves the first backend in place.
    pub fn register(&self, backend: Backend) -> Result<()> {
        let name = backend.name();
        self.slot.set(backend).map_err(|_| {
            let existing = self.slot.get().map(|b| b.name()).unwrap_or("unknown");
            warn!(
                existing,
                rejected = name,
                "Thread backend already registered"
            );
            WorkerError::config(format!(
                "thread backend '{}' already registered, cannot register '{}'",
                existing, name
            ))
        })?;

        info!(backend = name, "Thread backend registered");
        Ok(())
    }

    /// The registered backend
    pub fn get(&self) -> Result<Backend> {
        self.slot
            .get()
            .cloned()
            .ok_or_else(|| WorkerError::config("no thread backend registered"))
    }

    pub fn is_registered(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backend", &self.slot.get().map(|b| b.name()))
            .finish()
    }
}

/// The process-wide registry
pub fn global() -> &'static BackendRegistry {
    &GLOBAL
}

/// Register the process-wide backend
pub fn register_backend<B>(backend: B) -> Result<()>
where
    B: ThreadBackend + 'static,
{
    GLOBAL.register(Arc::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendDescriptor, StdBackend};

    #[test]
    fn test_get_before_register_fails() {
        let registry = BackendRegistry::new();
        assert!(!registry.is_registered());
        assert!(registry.get().err().unwrap().is_config());
    }

    #[test]
    fn test_second_registration_rejected() {
        let registry = BackendRegistry::new();
        registry.register(Arc::new(StdBackend::new())).unwrap();

        let other = BackendDescriptor::new("other")
            .with_spawn(|_, _| Err(WorkerError::resource("never")))
            .with_delay(|_| {})
            .with_semaphore(|_, _| Err(WorkerError::resource("never")))
            .build()
            .unwrap();

        let err = registry.register(Arc::new(other)).unwrap_err();
        assert!(err.is_config());
        assert_eq!(registry.get().unwrap().name(), "std");
    }
}
