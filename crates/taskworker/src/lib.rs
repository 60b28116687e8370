//! # taskworker
//!
//! Worker threads with bounded job queues and callback-based result delivery.
//!
//! ## Features
//!
//! - **Workers**: one backend thread and one bounded FIFO job queue each
//! - **Copy-in payloads**: job payloads are copied into fixed-size slots at
//!   submission, so the caller's buffer is free immediately
//! - **Callbacks, not return values**: handlers report results through a
//!   continuation that runs on the worker thread
//! - **Backpressure**: submitting to a full queue blocks up to a timeout
//! - **Pluggable runtimes**: the engine only sees the [`ThreadBackend`] trait;
//!   std threads and tokio's blocking pool ship in-tree
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Application                           │
//! │      submit(worker, handler, callback, payload, timeout)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Worker / Dispatch                       │
//! │   (JobQueue: ring + free/filled semaphores, or inline)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ThreadBackend                          │
//! │           (spawn, delay, semaphore: std | tokio | fn)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod queue;
pub mod timeout;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::backend::{
        register_backend, Backend, BackendRegistry, StdBackend, ThreadBackend, TokioBackend,
    };
    pub use crate::config::{define_worker, EngineMode, WorkerConfig};
    pub use crate::error::{SubmitError, WorkerError};
    pub use crate::job::{callback, handler, Callback, Completion, Handler, JobEvent};
    pub use crate::queue::JobStorage;
    pub use crate::timeout::Timeout;
    pub use crate::worker::{create_worker, Worker, WorkerState};
}

// Re-export key types at crate root
pub use backend::{
    global as global_backend, register_backend, Backend, BackendDescriptor, BackendRegistry,
    Semaphore, StdBackend, ThreadBackend, ThreadHandle, ThreadParams, TokioBackend,
};
pub use config::{define_worker, EngineMode, WorkerConfig};
pub use error::{Result, SubmitError, WorkerError};
pub use job::{
    callback, handler, Callback, Completion, Handler, Job, JobEvent, JobOutcome, Payload,
    DEFAULT_SLOT_SIZE,
};
pub use queue::{JobQueue, JobStorage, RingBuffer};
pub use timeout::Timeout;
pub use worker::{create_worker, StatsSnapshot, Worker, WorkerState, WorkerStats};
