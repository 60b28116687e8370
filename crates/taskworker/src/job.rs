//! Job envelopes
//!
//! A [`Job`] carries a handler, an optional continuation and a copy of the
//! submitter's payload in a fixed-size slot. Results never flow back through
//! the handler's return value; the handler reports them through its
//! [`Completion`], which invokes the submitter's [`Callback`] on the worker
//! thread.

use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::SubmitError;

/// Default job slot size in bytes
pub const DEFAULT_SLOT_SIZE: usize = 32;

/// Result event delivered to a callback
///
/// `data` is only borrowed for the duration of the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobEvent<'a> {
    /// Application-defined event code
    pub code: u32,
    pub data: &'a [u8],
}

/// Continuation invoked with a job's result
pub type Callback = Arc<dyn Fn(JobEvent<'_>) + Send + Sync>;

/// Work function run on the worker thread
///
/// Receives the copied-out payload and the submitter's completion. The
/// returned flag is seen by the engine only.
pub type Handler = Arc<dyn Fn(&[u8], &Completion<'_>) -> bool + Send + Sync>;

/// Wrap a closure as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&[u8], &Completion<'_>) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`Callback`]
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(JobEvent<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A handler's channel back to the submitter
pub struct Completion<'a> {
    callback: Option<&'a Callback>,
    delivered: Cell<usize>,
}

impl<'a> Completion<'a> {
    pub fn new(callback: Option<&'a Callback>) -> Self {
        Self {
            callback,
            delivered: Cell::new(0),
        }
    }

    /// Completion for a fire-and-forget job
    pub fn none() -> Completion<'static> {
        Completion::new(None)
    }

    /// Deliver `(code, data)` to the submitter's callback
    ///
    /// Returns `false` when the job was submitted without a callback.
    pub fn complete(&self, code: u32, data: &[u8]) -> bool {
        match self.callback {
            Some(cb) => {
                cb(JobEvent { code, data });
                self.delivered.set(self.delivered.get() + 1);
                true
            }
            None => false,
        }
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Number of events delivered so far
    pub fn delivered(&self) -> usize {
        self.delivered.get()
    }
}

impl fmt::Debug for Completion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("has_callback", &self.has_callback())
            .field("delivered", &self.delivered())
            .finish()
    }
}

/// Payload bytes copied into a fixed-size slot
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Payload<const SLOT: usize> {
    bytes: [u8; SLOT],
    len: usize,
}

impl<const SLOT: usize> Payload<SLOT> {
    /// Copy `data` into a new slot
    pub fn copy_from(data: &[u8]) -> Result<Self, SubmitError> {
        if data.len() > SLOT {
            return Err(SubmitError::PayloadTooLarge {
                len: data.len(),
                max: SLOT,
            });
        }
        let mut bytes = [0u8; SLOT];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self {
            bytes,
            len: data.len(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub const fn slot_size(&self) -> usize {
        SLOT
    }
}

impl<const SLOT: usize> Deref for Payload<SLOT> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl<const SLOT: usize> fmt::Debug for Payload<SLOT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("len", &self.len)
            .field("bytes", &self.as_bytes())
            .finish()
    }
}

/// What running a job produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    /// Flag returned by the handler
    pub success: bool,
    /// Callback invocations made by the handler
    pub callbacks: usize,
}

/// One unit of work
pub struct Job<const SLOT: usize> {
    handler: Handler,
    callback: Option<Callback>,
    payload: Payload<SLOT>,
}

impl<const SLOT: usize> Job<SLOT> {
    /// Build a job, copying `payload` into the slot
    pub fn new(
        handler: Handler,
        callback: Option<Callback>,
        payload: &[u8],
    ) -> Result<Self, SubmitError> {
        Ok(Self {
            handler,
            callback,
            payload: Payload::copy_from(payload)?,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Run the handler; the job is dropped once it returns
    pub fn run(self) -> JobOutcome {
        let completion = Completion::new(self.callback.as_ref());
        let success = (self.handler)(&self.payload, &completion);
        JobOutcome {
            success,
            callbacks: completion.delivered(),
        }
    }
}

impl<const SLOT: usize> fmt::Debug for Job<SLOT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("payload", &self.payload)
            .field("has_callback", &self.has_callback())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_payload_copies_bytes() {
        let mut source = vec![1u8, 2, 3, 4];
        let payload = Payload::<8>::copy_from(&source).unwrap();

        source.fill(0);
        assert_eq!(payload.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(payload.len(), 4);
        assert_eq!(payload.slot_size(), 8);
    }

    #[test]
    fn test_payload_exact_fit_and_overflow() {
        assert!(Payload::<4>::copy_from(&[9; 4]).is_ok());
        assert_eq!(
            Payload::<4>::copy_from(&[9; 5]).unwrap_err(),
            SubmitError::PayloadTooLarge { len: 5, max: 4 }
        );
        assert!(Payload::<0>::copy_from(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_run_delivers_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb = callback(move |event| sink.lock().push((event.code, event.data.to_vec())));

        let double = handler(|payload, done| {
            let doubled: Vec<u8> = payload.iter().map(|b| b * 2).collect();
            done.complete(7, &doubled)
        });

        let job = Job::<16>::new(double, Some(cb), &[1, 2, 3]).unwrap();
        let outcome = job.run();

        assert_eq!(
            outcome,
            JobOutcome {
                success: true,
                callbacks: 1
            }
        );
        assert_eq!(*seen.lock(), vec![(7, vec![2, 4, 6])]);
    }

    #[test]
    fn test_fire_and_forget() {
        let h = handler(|_, done| {
            assert!(!done.has_callback());
            !done.complete(1, &[])
        });

        let job = Job::<4>::new(h, None, &[]).unwrap();
        assert!(!job.has_callback());
        assert_eq!(
            job.run(),
            JobOutcome {
                success: true,
                callbacks: 0
            }
        );
    }

    #[test]
    fn test_completion_none() {
        let done = Completion::none();
        assert!(!done.complete(3, b"ignored"));
        assert_eq!(done.delivered(), 0);
    }
}
