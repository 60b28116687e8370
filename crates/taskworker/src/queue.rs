//! Bounded job queues
//!
//! - [`RingBuffer`] - fixed-capacity FIFO over pre-allocated slots
//! - [`JobStorage`] - the slots a worker's queue lives in, supplied by the caller
//! - [`JobQueue`] - a ring shared between many producers and one consumer,
//!   with blocking push/pop built on two backend semaphores
//!
//! The free-slot semaphore makes producers wait while the ring is full; the
//! filled-slot semaphore makes the consumer wait while it is empty. The ring
//! itself is only touched under its mutex, so no side ever sees a half-written
//! slot.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::backend::{Semaphore, ThreadBackend};
use crate::error::{Result, WorkerError};
use crate::job::{Job, DEFAULT_SLOT_SIZE};
use crate::timeout::Timeout;

/// Fixed-capacity FIFO ring
pub struct RingBuffer<T> {
    buf: Box<[Option<T>]>,
    head: usize, // next to read
    tail: usize, // next to write
    len: usize,
}

impl<T> RingBuffer<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Append `item`, handing it back if the ring is full
    pub fn push(&mut self, item: T) -> std::result::Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.buf[self.tail] = Some(item);
        self.tail = (self.tail + 1) % self.buf.len();
        self.len += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.buf[self.head].take();
        self.head = (self.head + 1) % self.buf.len();
        self.len -= 1;
        item
    }

    /// Items in FIFO order
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.buf[(self.head + i) % self.buf.len()].as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Pre-allocated slots backing one worker's queue
///
/// `SLOT` is the largest payload, in bytes, a job may carry.
#[derive(Debug)]
pub struct JobStorage<const SLOT: usize = DEFAULT_SLOT_SIZE> {
    ring: RingBuffer<Job<SLOT>>,
}

impl<const SLOT: usize> JobStorage<SLOT> {
    /// Storage for `capacity` queued jobs
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub const fn slot_size(&self) -> usize {
        SLOT
    }
}

/// Multi-producer, single-consumer bounded job queue
pub struct JobQueue<const SLOT: usize> {
    ring: Mutex<RingBuffer<Job<SLOT>>>,
    free: Arc<dyn Semaphore>,
    filled: Arc<dyn Semaphore>,
}

impl<const SLOT: usize> JobQueue<SLOT> {
    /// Bind `storage`, allocating the wait primitives from `backend`
    pub fn new(storage: JobStorage<SLOT>, backend: &dyn ThreadBackend) -> Result<Self> {
        let capacity = storage.capacity();
        if capacity == 0 {
            return Err(WorkerError::config("job buffer capacity is zero"));
        }

        Ok(Self {
            ring: Mutex::new(storage.ring),
            free: backend.semaphore(capacity, capacity)?,
            filled: backend.semaphore(0, capacity)?,
        })
    }

    /// Enqueue `job`, waiting up to `timeout` for a free slot
    ///
    /// On timeout the job is handed back and the queued entries are untouched.
    pub fn push(&self, job: Job<SLOT>, timeout: Timeout) -> std::result::Result<(), Job<SLOT>> {
        if !self.free.wait(timeout) {
            trace!(%timeout, "No free slot");
            return Err(job);
        }

        let pushed = self.ring.lock().push(job);
        match pushed {
            Ok(()) => {
                self.filled.signal();
                Ok(())
            }
            Err(job) => {
                // Permit accounting and ring length disagree; give the permit back
                self.free.signal();
                Err(job)
            }
        }
    }

    /// Dequeue the oldest job, waiting up to `timeout` for one to arrive
    pub fn pop(&self, timeout: Timeout) -> Option<Job<SLOT>> {
        if !self.filled.wait(timeout) {
            return None;
        }

        let job = self.ring.lock().pop();
        if job.is_some() {
            self.free.signal();
        }
        job
    }

    /// Copies of the queued payloads in FIFO order
    #[cfg(test)]
    pub(crate) fn payloads(&self) -> Vec<Vec<u8>> {
        self.ring.lock().iter().map(|job| job.payload().to_vec()).collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }
}

impl<const SLOT: usize> std::fmt::Debug for JobQueue<SLOT> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("slot_size", &SLOT)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StdBackend;
    use crate::job::handler;
    use std::time::{Duration, Instant};

    fn job(bytes: &[u8]) -> Job<8> {
        Job::new(handler(|_, _| true), None, bytes).unwrap()
    }

    #[test]
    fn test_ring_fifo_and_wraparound() {
        let mut ring = RingBuffer::with_capacity(3);
        assert!(ring.push(1).is_ok());
        assert!(ring.push(2).is_ok());
        assert_eq!(ring.pop(), Some(1));
        assert!(ring.push(3).is_ok());
        assert!(ring.push(4).is_ok());
        assert!(ring.is_full());
        assert_eq!(ring.push(5), Err(5));

        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), Some(4));
        assert_eq!(ring.pop(), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_zero_capacity_ring_rejects() {
        let mut ring = RingBuffer::with_capacity(0);
        assert!(ring.is_full());
        assert_eq!(ring.push('x'), Err('x'));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_queue_rejects_zero_capacity() {
        let err = JobQueue::new(JobStorage::<8>::with_capacity(0), &StdBackend::new()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_queue_full_push_leaves_contents() {
        let queue = JobQueue::new(JobStorage::<8>::with_capacity(2), &StdBackend::new()).unwrap();
        assert!(queue.push(job(b"a"), Timeout::Immediate).is_ok());
        assert!(queue.push(job(b"b"), Timeout::Immediate).is_ok());

        let rejected = queue.push(job(b"c"), Timeout::Immediate).unwrap_err();
        assert_eq!(rejected.payload(), b"c");
        assert_eq!(queue.payloads(), vec![b"a".to_vec(), b"b".to_vec()]);

        let start = Instant::now();
        assert!(queue.push(job(b"d"), Timeout::from_millis(20)).is_err());
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_queue_pop_frees_slot() {
        let queue = JobQueue::new(JobStorage::<8>::with_capacity(1), &StdBackend::new()).unwrap();
        assert!(queue.pop(Timeout::Immediate).is_none());

        assert!(queue.push(job(b"x"), Timeout::Immediate).is_ok());
        assert!(queue.push(job(b"y"), Timeout::Immediate).is_err());

        let popped = queue.pop(Timeout::Immediate).unwrap();
        assert_eq!(popped.payload(), b"x");
        assert!(queue.is_empty());
        assert!(queue.push(job(b"y"), Timeout::Immediate).is_ok());
    }

    #[test]
    fn test_blocked_producer_resumes() {
        let queue = Arc::new(
            JobQueue::new(JobStorage::<8>::with_capacity(1), &StdBackend::new()).unwrap(),
        );
        assert!(queue.push(job(b"first"), Timeout::Immediate).is_ok());

        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.push(job(b"second"), Timeout::from_millis(2000)).is_ok())
        };

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.pop(Timeout::Immediate).unwrap().payload(), b"first");
        assert!(producer.join().unwrap());
        assert_eq!(queue.pop(Timeout::from_millis(100)).unwrap().payload(), b"second");
    }
}
