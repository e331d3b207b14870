use crate::queue::{BoxedRunnable, CancellationToken, JobQueue, JobReceiver, DEFAULT_QUEUE_CAPACITY};
use crate::runnable::Runnable;
use crate::sink::{EventSink, WorkerEvent, DEFAULT_LOG_TARGET};
use crate::worker::{default_sink, Worker, DEFAULT_BACKOFF_UNIT};
use crate::PoolError;
use crossbeam_channel::{bounded, Sender};
use log::error;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use typed_builder::TypedBuilder;

#[derive(Clone, TypedBuilder)]
pub struct PoolConfig {
    /// the number of workers of the WorkerPool.
    pub number_of_workers: usize,
    /// how many submitted jobs may wait in the queue before submitters block.
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
    /// the length of one backoff unit. Retry number `n` waits `n` units by default.
    #[builder(default = DEFAULT_BACKOFF_UNIT)]
    pub backoff_unit: Duration,
    /// prefix of the worker thread names.
    #[builder(default = "worker".to_string(), setter(into))]
    pub name: String,
    /// receives every worker and job event.
    #[builder(default = default_sink())]
    pub sink: Arc<dyn EventSink>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PoolState {
    /// The queue accepts jobs but no worker runs yet
    Created,
    Running,
    /// `shutdown` is waiting for the workers
    ShuttingDown,
    Stopped,
}

struct WorkerThread {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

struct PoolInner {
    state: PoolState,
    queue: Option<JobQueue>,
    receiver: Option<JobReceiver>,
    workers: Vec<WorkerThread>,
}

/// Decrements the live worker counter when its worker thread exits.
struct LiveWorker {
    live: Arc<AtomicUsize>,
}

impl LiveWorker {
    fn register(live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);

        Self { live }
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A fixed number of worker threads draining one bounded queue.
///
/// All methods take `&self`, so a pool can be shared between submitters
/// behind an `Arc`.
pub struct WorkerPool {
    config: PoolConfig,
    inner: Mutex<PoolInner>,
    live: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Allocates the queue. No worker is started until [`WorkerPool::start`].
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        if config.number_of_workers == 0 {
            return Err(PoolError::InvalidConfig(
                "number_of_workers must be at least 1".to_string(),
            ));
        }

        if config.queue_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }

        let (queue, receiver) = JobQueue::bounded(config.queue_capacity);

        Ok(Self {
            config,
            inner: Mutex::new(PoolInner {
                state: PoolState::Created,
                queue: Some(queue),
                receiver: Some(receiver),
                workers: Vec::new(),
            }),
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Starts the configured number of workers.
    /// This is necessary in order to execute jobs.
    pub fn start(&self) -> Result<(), PoolError> {
        let mut inner = self.inner.lock()?;

        match inner.state {
            PoolState::Created => {}
            PoolState::Running => return Err(PoolError::AlreadyStarted),
            PoolState::ShuttingDown | PoolState::Stopped => return Err(PoolError::ShutDown),
        }

        let receiver = inner.receiver.clone().ok_or(PoolError::ShutDown)?;

        self.config.sink.record(&WorkerEvent::PoolStarted {
            workers: self.config.number_of_workers,
        });

        let mut workers = Vec::with_capacity(self.config.number_of_workers);

        for id in 1..self.config.number_of_workers + 1 {
            match self.spawn_worker(id, receiver.clone()) {
                Ok(worker_thread) => workers.push(worker_thread),
                Err(error) => {
                    Self::stop_workers(workers);

                    return Err(error);
                }
            }
        }

        inner.workers = workers;
        inner.state = PoolState::Running;

        Ok(())
    }

    fn spawn_worker(&self, id: usize, queue: JobReceiver) -> Result<WorkerThread, PoolError> {
        let (stop, stop_receiver) = bounded(0);

        let worker = Worker::builder()
            .id(id)
            .queue(queue)
            .stop(stop_receiver)
            .backoff_unit(self.config.backoff_unit)
            .sink(self.config.sink.clone())
            .build();

        let live = LiveWorker::register(self.live.clone());

        let handle = thread::Builder::new()
            .name(format!("{}_{id}", self.config.name))
            .spawn(move || {
                let _live = live;

                worker.run_jobs();
            })?;

        Ok(WorkerThread { stop, handle })
    }

    /// Closing a stop channel is the stop signal. All signals go out before
    /// the first join so the workers wind down in parallel.
    fn stop_workers(workers: Vec<WorkerThread>) {
        let handles: Vec<JoinHandle<()>> = workers
            .into_iter()
            .map(|worker_thread| {
                drop(worker_thread.stop);
                worker_thread.handle
            })
            .collect();

        for handle in handles {
            let name = handle.thread().name().unwrap_or_default().to_string();

            if handle.join().is_err() {
                error!(target: DEFAULT_LOG_TARGET, "worker thread {} panicked", name);
            }
        }
    }

    fn queue(&self) -> Result<JobQueue, PoolError> {
        let inner = self.inner.lock()?;

        match (inner.state, &inner.queue) {
            (PoolState::Created | PoolState::Running, Some(queue)) => Ok(queue.clone()),
            _ => Err(PoolError::ShutDown),
        }
    }

    fn boxed<R: Runnable + 'static>(job: R) -> BoxedRunnable {
        Box::new(job)
    }

    /// Blocks until the queue has room for the job.
    pub fn submit<R: Runnable + 'static>(&self, job: R) -> Result<(), PoolError> {
        self.queue()?.push(Self::boxed(job))
    }

    /// Fails with [`PoolError::QueueFull`] instead of blocking.
    pub fn try_submit<R: Runnable + 'static>(&self, job: R) -> Result<(), PoolError> {
        self.queue()?.try_push(Self::boxed(job))
    }

    /// Either enqueues the job, or fails with [`PoolError::SubmissionTimeout`]
    /// or [`PoolError::SubmissionCancelled`]. The job is never dropped silently.
    pub fn submit_with_timeout<R: Runnable + 'static>(
        &self,
        job: R,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), PoolError> {
        self.queue()?.push_timeout(Self::boxed(job), timeout, cancel)
    }

    /// Stops accepting jobs, signals every worker and waits until all of them
    /// finished their current job. Running jobs are never interrupted.
    ///
    /// Jobs still queued once the last worker stopped are discarded and
    /// reported in [`WorkerEvent::PoolShutdown`].
    pub fn shutdown(&self) -> Result<(), PoolError> {
        let workers = {
            let mut inner = self.inner.lock()?;

            if let PoolState::ShuttingDown | PoolState::Stopped = inner.state {
                return Err(PoolError::ShutDown);
            }

            inner.state = PoolState::ShuttingDown;
            inner.queue = None;

            mem::take(&mut inner.workers)
        };

        Self::stop_workers(workers);

        let mut inner = self.inner.lock()?;
        let discarded = inner
            .receiver
            .take()
            .map_or(0, |receiver| receiver.len());
        inner.state = PoolState::Stopped;

        self.config
            .sink
            .record(&WorkerEvent::PoolShutdown { discarded });

        Ok(())
    }

    pub fn state(&self) -> Result<PoolState, PoolError> {
        Ok(self.inner.lock()?.state)
    }

    /// The number of worker threads that have not exited yet.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn queued_jobs(&self) -> Result<usize, PoolError> {
        let inner = self.inner.lock()?;

        Ok(inner.receiver.as_ref().map_or(0, |receiver| receiver.len()))
    }

    pub fn number_of_workers(&self) -> usize {
        self.config.number_of_workers
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let running = matches!(
            self.state(),
            Ok(PoolState::Created | PoolState::Running)
        );

        if running {
            if let Err(error) = self.shutdown() {
                error!(
                    target: DEFAULT_LOG_TARGET,
                    "Failed to shut down the worker pool on drop: {:?}", error
                );
            }
        }
    }
}
