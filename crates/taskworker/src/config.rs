//! Worker definitions
//!
//! A [`WorkerConfig`] is an inert worker descriptor: it names the worker and
//! fixes its scheduling parameters, but owns no thread and no queue until it
//! is passed to [`create_worker`](crate::create_worker).

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::ThreadParams;
use crate::error::{Result, WorkerError};

/// How submitted jobs reach their handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Jobs are queued and run on the worker's own thread
    #[default]
    Queued,

    /// Jobs run immediately on the submitting thread; the worker thread is a
    /// plain backend task that only idles
    ///
    /// Handlers and callbacks run on the submitter's thread, not the
    /// worker's, and the submit timeout is ignored since nothing is queued.
    Direct,
}

impl std::fmt::Display for EngineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

impl FromStr for EngineMode {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "queued" | "worker" => Ok(Self::Queued),
            "direct" | "raw" => Ok(Self::Direct),
            other => Err(WorkerError::config(format!("unknown engine mode '{}'", other))),
        }
    }
}

/// Worker definition
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use taskworker::WorkerConfig;
///
/// let config = WorkerConfig::new("sum")
///     .with_idle_delay(Duration::from_millis(10))
///     .with_priority(3)
///     .with_stack_size(8192);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker name, also used for its thread
    pub name: String,

    /// How long the worker waits for a job per loop iteration
    #[serde(with = "duration_millis")]
    pub idle_delay: Duration,

    /// Thread priority hint passed to the backend
    pub priority: u8,

    /// Thread stack budget in bytes
    pub stack_size: usize,

    /// Dispatch strategy
    #[serde(default)]
    pub engine: EngineMode,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "worker".to_string(),
            idle_delay: Duration::from_millis(10),
            priority: 1,
            stack_size: 4096,
            engine: EngineMode::Queued,
        }
    }
}

impl WorkerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn with_engine(mut self, engine: EngineMode) -> Self {
        self.engine = engine;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WorkerError::config("worker name must not be empty"));
        }
        if self.stack_size == 0 {
            return Err(WorkerError::config(format!(
                "worker '{}': stack size must be non-zero",
                self.name
            )));
        }
        Ok(())
    }

    /// Thread parameters for the backend
    pub fn thread_params(&self) -> ThreadParams {
        ThreadParams::new(self.name.clone(), self.stack_size, self.priority)
    }
}

/// Define an inert worker
pub fn define_worker(
    name: impl Into<String>,
    idle_delay: Duration,
    priority: u8,
    stack_size: usize,
) -> WorkerConfig {
    WorkerConfig::new(name)
        .with_idle_delay(idle_delay)
        .with_priority(priority)
        .with_stack_size(stack_size)
}

/// Define an inert worker from millisecond and byte literals
///
/// ```
/// let sum = taskworker::define_worker!("sum", idle_ms = 10, priority = 3, stack = 256);
/// assert_eq!(sum.idle_delay, std::time::Duration::from_millis(10));
///
/// let plain = taskworker::define_worker!("plain");
/// assert_eq!(plain.name, "plain");
/// ```
#[macro_export]
macro_rules! define_worker {
    ($name:expr, idle_ms = $idle:expr, priority = $prio:expr, stack = $stack:expr $(,)?) => {
        $crate::define_worker(
            $name,
            ::std::time::Duration::from_millis($idle),
            $prio,
            $stack,
        )
    };
    ($name:expr $(,)?) => {
        $crate::WorkerConfig::new($name)
    };
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
