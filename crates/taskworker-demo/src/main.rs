mod config;
mod tasks;

use std::sync::Arc;

use anyhow::{Context, Result};
use taskworker::{Backend, StdBackend, TokioBackend};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{BackendKind, DemoConfig};

/// Keeps the tokio runtime alive; worker threads never return, so the
/// runtime is released without waiting for them
struct RuntimeGuard(Option<tokio::runtime::Runtime>);

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskworker=debug,taskworker_demo=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("taskworker-demo starting...");

    let config = DemoConfig::from_env()?;
    tracing::info!(backend = ?config.backend, engine = %config.engine, "Demo configured");

    let mut runtime = RuntimeGuard(None);
    let backend: Backend = match config.backend {
        BackendKind::Std => Arc::new(StdBackend::new()),
        BackendKind::Tokio => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_time()
                .thread_name("taskworker-rt")
                .build()
                .context("Failed to build tokio runtime")?;
            let backend = TokioBackend::new(rt.handle().clone());
            runtime.0 = Some(rt);
            Arc::new(backend)
        }
    };

    taskworker::global_backend()
        .register(Arc::clone(&backend))
        .context("Failed to register thread backend")?;

    let sum_worker = tasks::spawn_sum_worker(Arc::clone(&backend), config.engine)?;
    let _producer = tasks::spawn_producer(
        Arc::clone(&backend),
        config.engine,
        config.producer_period,
        Arc::clone(&sum_worker),
    )?;

    let mut beats = 0u64;
    loop {
        backend.delay(config.heartbeat);
        beats += 1;
        tracing::debug!(beats, stats = ?sum_worker.stats(), "Hello world");

        if config.iterations != 0 && beats >= config.iterations {
            break;
        }
    }

    tracing::info!("Demo finished");
    drop(runtime);
    Ok(())
}
