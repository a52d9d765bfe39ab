//! Bounded worker pool for CPU-bound batch runs.
//!
//! Connection threads hand the raw request body to the pool and block on a
//! oneshot reply. The queue is bounded: when it is full, submission fails
//! immediately and the HTTP layer answers 503 instead of queueing without
//! limit. Runs share no mutable state, so workers need no coordination
//! beyond the job channel itself.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use monxml_engine::{process_batch, BatchResult};

/// A simple oneshot channel for single-use replies.
/// Uses std::sync::mpsc under the hood.
pub mod oneshot {
    use std::sync::mpsc;

    pub struct Sender<T>(mpsc::SyncSender<T>);
    pub struct Receiver<T>(mpsc::Receiver<T>);

    impl<T> Sender<T> {
        pub fn send(self, value: T) -> Result<(), T> {
            self.0.send(value).map_err(|e| e.0)
        }
    }

    impl<T> Receiver<T> {
        pub fn blocking_recv(self) -> Result<T, RecvError> {
            self.0.recv().map_err(|_| RecvError)
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct RecvError;

    pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
        // Buffer of 1 for oneshot semantics
        let (tx, rx) = mpsc::sync_channel(1);
        (Sender(tx), Receiver(rx))
    }
}

/// Outcome of one batch run, as delivered to the waiting request thread.
pub type JobReply = Result<BatchResult, String>;

struct Job {
    input: Vec<u8>,
    reply: oneshot::Sender<JobReply>,
}

/// Errors from job submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The queue is full; the caller should reject the request.
    Saturated,
    /// The pool is shutting down.
    Closed,
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::Saturated => write!(f, "processing queue is full"),
            SubmitError::Closed => write!(f, "worker pool is shut down"),
        }
    }
}

impl std::error::Error for SubmitError {}

/// Fixed-size pool of worker threads draining a bounded job queue.
pub struct WorkerPool {
    tx: Option<mpsc::SyncSender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::sync_channel::<Job>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                thread::Builder::new()
                    .name(format!("batch-worker-{id}"))
                    .spawn(move || worker_loop(id, rx))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { tx: Some(tx), workers }
    }

    /// Submit one batch run. Returns the reply receiver to block on, or
    /// `Saturated` when the queue is full.
    pub fn submit(&self, input: Vec<u8>) -> Result<oneshot::Receiver<JobReply>, SubmitError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let tx = self.tx.as_ref().ok_or(SubmitError::Closed)?;
        match tx.try_send(Job { input, reply: reply_tx }) {
            Ok(()) => Ok(reply_rx),
            Err(mpsc::TrySendError::Full(_)) => Err(SubmitError::Saturated),
            Err(mpsc::TrySendError::Disconnected(_)) => Err(SubmitError::Closed),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets the workers drain and exit.
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(id: usize, rx: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        // Hold the lock only while waiting for the next job; processing
        // happens after it is released so workers run in parallel.
        let job = match rx.lock() {
            Ok(guard) => guard.recv(),
            Err(_) => return,
        };
        match job {
            Ok(Job { input, reply }) => {
                log::debug!("worker {id}: processing {} byte batch", input.len());
                let result = process_batch(&input);
                if reply.send(result).is_err() {
                    log::debug!("worker {id}: requester went away before the reply");
                }
            }
            // Channel closed: pool is shutting down.
            Err(_) => return,
        }
    }
}
