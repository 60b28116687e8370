// Demo configuration
//
// Loaded from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use taskworker::EngineMode;

/// Which thread backend hosts the workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Std,
    Tokio,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "std" | "thread" => Ok(Self::Std),
            "tokio" => Ok(Self::Tokio),
            other => anyhow::bail!("unknown backend '{}', expected 'std' or 'tokio'", other),
        }
    }
}

/// Demo settings
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub backend: BackendKind,
    pub engine: EngineMode,
    /// Heartbeats before exiting; 0 runs forever
    pub iterations: u64,
    pub heartbeat: Duration,
    /// Period of the producer worker
    pub producer_period: Duration,
}

impl DemoConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `TASKWORKER_BACKEND`: `std` or `tokio` (default: std)
    /// - `TASKWORKER_ENGINE`: `queued` or `direct` (default: queued)
    /// - `DEMO_ITERATIONS`: heartbeats before exit, 0 = forever (default: 0)
    /// - `DEMO_HEARTBEAT_MS`: heartbeat period (default: 1000)
    /// - `DEMO_PRODUCER_PERIOD_MS`: producer period (default: 2000)
    pub fn from_env() -> Result<Self> {
        let backend = env::var("TASKWORKER_BACKEND")
            .unwrap_or_else(|_| "std".to_string())
            .parse::<BackendKind>()?;

        let engine = env::var("TASKWORKER_ENGINE")
            .unwrap_or_else(|_| "queued".to_string())
            .parse::<EngineMode>()
            .context("invalid TASKWORKER_ENGINE")?;

        let iterations = parse_u64("DEMO_ITERATIONS", 0)?;
        let heartbeat = Duration::from_millis(parse_u64("DEMO_HEARTBEAT_MS", 1000)?);
        let producer_period = Duration::from_millis(parse_u64("DEMO_PRODUCER_PERIOD_MS", 2000)?);

        Ok(Self {
            backend,
            engine,
            iterations,
            heartbeat,
            producer_period,
        })
    }
}

fn parse_u64(var: &str, default: u64) -> Result<u64> {
    match env::var(var) {
        Ok(v) => v
            .parse()
            .with_context(|| format!("{} must be an unsigned integer, got '{}'", var, v)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("std".parse::<BackendKind>().unwrap(), BackendKind::Std);
        assert_eq!("Tokio".parse::<BackendKind>().unwrap(), BackendKind::Tokio);
        assert!("freertos".parse::<BackendKind>().is_err());
    }
}
