use crate::JobError;
use log::{log, Level};
use std::time::Duration;

pub const DEFAULT_LOG_TARGET: &str = "jobpool";

/// Everything a pool reports while it runs.
///
/// Job events carry the worker id, the job name, the attempt number
/// (starting at 0) and the time elapsed since the job was picked up.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    PoolStarted {
        workers: usize,
    },
    PoolShutdown {
        discarded: usize,
    },
    WorkerStarted {
        worker_id: usize,
    },
    WorkerStopped {
        worker_id: usize,
    },
    JobStarted {
        worker_id: usize,
        job_name: String,
    },
    RetryScheduled {
        worker_id: usize,
        job_name: String,
        attempt: u32,
        max_retries: u32,
        backoff: Duration,
        elapsed: Duration,
        error: JobError,
    },
    Completed {
        worker_id: usize,
        job_name: String,
        attempt: u32,
        elapsed: Duration,
    },
    Failed {
        worker_id: usize,
        job_name: String,
        attempt: u32,
        elapsed: Duration,
        error: JobError,
    },
}

/// The observability handle a pool is constructed with.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &WorkerEvent);
}

/// Writes one line per event through the `log` facade.
#[derive(Clone, Debug)]
pub struct LogSink {
    target: String,
}

impl LogSink {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_TARGET)
    }
}

impl EventSink for LogSink {
    fn record(&self, event: &WorkerEvent) {
        let (level, line) = log_line(event);

        log!(target: self.target.as_str(), level, "{}", line);
    }
}

/// The level and text `LogSink` writes for an event.
fn log_line(event: &WorkerEvent) -> (Level, String) {
    match event {
        WorkerEvent::PoolStarted { workers } => (
            Level::Info,
            format!("starting worker pool with {workers} workers"),
        ),
        WorkerEvent::PoolShutdown { discarded: 0 } => {
            (Level::Info, "worker pool shutdown complete".to_string())
        }
        WorkerEvent::PoolShutdown { discarded } => (
            Level::Warn,
            format!("worker pool shutdown complete, {discarded} queued jobs discarded"),
        ),
        WorkerEvent::WorkerStarted { worker_id } => {
            (Level::Info, format!("worker={worker_id} started"))
        }
        WorkerEvent::WorkerStopped { worker_id } => {
            (Level::Info, format!("worker={worker_id} stopped"))
        }
        WorkerEvent::JobStarted {
            worker_id,
            job_name,
        } => (
            Level::Info,
            format!("worker={worker_id} job={job_name} processing"),
        ),
        WorkerEvent::RetryScheduled {
            worker_id,
            job_name,
            attempt,
            max_retries,
            backoff,
            elapsed,
            error,
        } => (
            Level::Warn,
            format!(
                "worker={} job={} attempt={} failed: {}, retrying {}/{} in {:?} elapsed={:?}",
                worker_id,
                job_name,
                attempt,
                error,
                attempt + 1,
                max_retries,
                backoff,
                elapsed
            ),
        ),
        WorkerEvent::Completed {
            worker_id,
            job_name,
            attempt,
            elapsed,
        } => (
            Level::Info,
            format!("worker={worker_id} job={job_name} attempt={attempt} completed elapsed={elapsed:?}"),
        ),
        WorkerEvent::Failed {
            worker_id,
            job_name,
            attempt,
            elapsed,
            error,
        } => (
            Level::Error,
            format!(
                "worker={worker_id} job={job_name} attempt={attempt} failed permanently: {error} elapsed={elapsed:?}"
            ),
        ),
    }
}
