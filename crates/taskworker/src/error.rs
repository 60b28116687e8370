// Error types for the task worker engine

use thiserror::Error;

/// Result type alias for setup operations
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Errors raised while setting up backends and workers
///
/// Both variants are detected synchronously. Timeouts are not errors and
/// never appear here; they surface as `false` from `submit`/`execute_task`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// Malformed or missing setup (no backend, empty storage, duplicate registration)
    #[error("configuration error: {0}")]
    Config(String),

    /// A thread or synchronization primitive could not be allocated
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl WorkerError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        WorkerError::Config(msg.into())
    }

    /// Create a resource exhaustion error
    pub fn resource(msg: impl Into<String>) -> Self {
        WorkerError::ResourceExhausted(msg.into())
    }

    /// Whether this error stems from bad configuration
    pub fn is_config(&self) -> bool {
        matches!(self, WorkerError::Config(_))
    }
}

/// Reasons a job was not accepted by a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The queue stayed full for the whole timeout
    #[error("queue full, submission timed out")]
    Timeout,

    /// The payload does not fit in a job slot
    #[error("payload of {len} bytes exceeds slot size of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkerError::config("buffer capacity is zero");
        assert_eq!(err.to_string(), "configuration error: buffer capacity is zero");
        assert!(err.is_config());

        let err = WorkerError::resource("spawn failed");
        assert_eq!(err.to_string(), "resource exhausted: spawn failed");
        assert!(!err.is_config());
    }

    #[test]
    fn test_submit_error_display() {
        let err = SubmitError::PayloadTooLarge { len: 40, max: 32 };
        assert_eq!(
            err.to_string(),
            "payload of 40 bytes exceeds slot size of 32 bytes"
        );
    }
}
