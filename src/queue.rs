use crate::runnable::Runnable;
use crate::PoolError;
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// The default number of jobs the queue holds before submitters block.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

pub type BoxedRunnable = Box<dyn Runnable>;

/// The consuming end of the queue, cloned into every worker.
pub type JobReceiver = Receiver<BoxedRunnable>;

/// The producing end of a bounded FIFO of jobs.
///
/// The queue is closed when every `JobQueue` clone is dropped; workers then
/// drain what is left and stop. Once every receiver is gone, pushes fail
/// with [`PoolError::ShutDown`] instead of blocking.
#[derive(Clone, Debug)]
pub struct JobQueue {
    sender: Sender<BoxedRunnable>,
    capacity: usize,
}

impl JobQueue {
    pub fn bounded(capacity: usize) -> (Self, JobReceiver) {
        let (sender, receiver) = bounded(capacity);

        (Self { sender, capacity }, receiver)
    }

    /// Blocks until there is room in the queue.
    pub fn push(&self, job: BoxedRunnable) -> Result<(), PoolError> {
        self.sender.send(job).map_err(|_| PoolError::ShutDown)
    }

    pub fn try_push(&self, job: BoxedRunnable) -> Result<(), PoolError> {
        match self.sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PoolError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(PoolError::ShutDown),
        }
    }

    /// Waits at most `timeout` for room in the queue, giving up early if
    /// `cancel` fires. A zero timeout makes a single non-blocking attempt.
    pub fn push_timeout(
        &self,
        job: BoxedRunnable,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), PoolError> {
        if cancel.is_cancelled() {
            return Err(PoolError::SubmissionCancelled);
        }

        select! {
            send(self.sender, job) -> result => result.map_err(|_| PoolError::ShutDown),
            recv(cancel.signal) -> _ => Err(PoolError::SubmissionCancelled),
            default(timeout) => Err(PoolError::SubmissionTimeout(timeout)),
        }
    }

    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A cloneable signal that aborts a pending timed submission.
///
/// Cancelling drops the shared trigger, which disconnects the signal channel
/// and wakes every submission waiting on it.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);

        Self {
            trigger: Arc::new(Mutex::new(Some(trigger))),
            signal,
        }
    }

    pub fn cancel(&self) {
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
