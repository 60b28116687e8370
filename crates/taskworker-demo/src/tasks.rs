// Demo application tasks
//
// sum_worker: services sum requests, replying with SUM_EVENT
// producer: every period submits {a, b} to sum_worker and logs the reply

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use taskworker::{
    callback, create_worker, define_worker, handler, Backend, EngineMode, JobEvent, JobStorage,
    Timeout, Worker,
};
use tracing::{info, warn};

/// Event code for a completed sum
pub const SUM_EVENT: u32 = 1;

/// Slot size of the demo workers, two i32 operands
pub const SLOT: usize = 8;

const SUM_QUEUE_DEPTH: usize = 4;
const SUBMIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Encode a sum request
pub fn encode_request(a: i32, b: i32) -> [u8; SLOT] {
    let mut bytes = [0u8; SLOT];
    bytes[..4].copy_from_slice(&a.to_le_bytes());
    bytes[4..].copy_from_slice(&b.to_le_bytes());
    bytes
}

/// Decode a sum request; `None` if the payload is malformed
pub fn decode_request(payload: &[u8]) -> Option<(i32, i32)> {
    let a = i32::from_le_bytes(payload.get(..4)?.try_into().ok()?);
    let b = i32::from_le_bytes(payload.get(4..8)?.try_into().ok()?);
    Some((a, b))
}

/// Decode a sum reply
pub fn decode_reply(event: &JobEvent<'_>) -> Option<i32> {
    Some(i32::from_le_bytes(event.data.get(..4)?.try_into().ok()?))
}

/// Start the worker servicing sum requests
pub fn spawn_sum_worker(backend: Backend, engine: EngineMode) -> Result<Arc<Worker<SLOT>>> {
    create_worker(
        define_worker("sum-worker", Duration::from_millis(10), 3, 4096).with_engine(engine),
        JobStorage::with_capacity(SUM_QUEUE_DEPTH),
        backend,
        |worker| worker.run_forever(),
    )
    .context("failed to create sum worker")
}

/// Start the periodic producer submitting requests to `target`
pub fn spawn_producer(
    backend: Backend,
    engine: EngineMode,
    period: Duration,
    target: Arc<Worker<SLOT>>,
) -> Result<Arc<Worker<SLOT>>> {
    let sum = handler(|payload, done| match decode_request(payload) {
        Some((a, b)) => done.complete(SUM_EVENT, &a.wrapping_add(b).to_le_bytes()),
        None => false,
    });

    let on_result = callback(|event| match (event.code, decode_reply(&event)) {
        (SUM_EVENT, Some(value)) => info!(value, "Sum result"),
        (code, _) => warn!(code, "Unexpected event"),
    });

    let counter = AtomicI32::new(0);

    create_worker(
        define_worker("producer", period, 2, 4096).with_engine(engine),
        JobStorage::with_capacity(1),
        backend,
        move |worker| loop {
            let a = counter.fetch_add(1, Ordering::Relaxed);
            let b = a.wrapping_mul(2);
            let request = encode_request(a, b);
            if !target.submit(&sum, Some(&on_result), &request, Timeout::After(SUBMIT_TIMEOUT)) {
                warn!(worker = target.name(), "Sum worker busy, request dropped");
            }
            // Drain anything sent to the producer itself, then wait out the period
            while worker.execute_task(Timeout::Immediate) {}
            worker.idle();
        },
    )
    .context("failed to create producer")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_codec() {
        let bytes = encode_request(3, 4);
        assert_eq!(decode_request(&bytes), Some((3, 4)));
        assert_eq!(decode_request(&bytes[..6]), None);
    }

    #[test]
    fn test_reply_decode() {
        let data = 7i32.to_le_bytes();
        let event = JobEvent {
            code: SUM_EVENT,
            data: &data,
        };
        assert_eq!(decode_reply(&event), Some(7));
    }
}
