use std::io::Error as IoError;
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

/// An error returned by a single attempt of a job.
///
/// Job failures never escape the worker: they are retried and, once the
/// retry budget is spent, reported to the event sink and dropped.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("{description}")]
pub struct JobError {
    /// A description of an error
    pub description: String,
}

impl JobError {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

impl From<String> for JobError {
    fn from(description: String) -> Self {
        Self { description }
    }
}

impl From<&str> for JobError {
    fn from(description: &str) -> Self {
        Self::new(description)
    }
}

/// Errors returned by [`WorkerPool`](crate::WorkerPool) operations.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
    #[error("the worker pool is already started")]
    AlreadyStarted,
    #[error("the worker pool is shut down")]
    ShutDown,
    #[error("the job queue is full")]
    QueueFull,
    #[error("job submission timed out after {0:?}")]
    SubmissionTimeout(Duration),
    #[error("job submission was cancelled")]
    SubmissionCancelled,
    #[error("The shared state of the worker pool became poisoned")]
    PoisonedLock,
    #[error("Failed to create worker thread")]
    WorkerSpawnFailed {
        #[from]
        source: IoError,
    },
}

impl<T> From<PoisonError<T>> for PoolError {
    fn from(_: PoisonError<T>) -> Self {
        Self::PoisonedLock
    }
}

#[cfg(test)]
mod error_tests {
    use super::JobError;
    use super::PoolError;
    use std::time::Duration;

    #[test]
    fn job_error_displays_description() {
        let error: JobError = "smtp connection refused".into();

        assert_eq!("smtp connection refused", error.to_string());
    }

    #[test]
    fn timeout_error_mentions_duration() {
        let error = PoolError::SubmissionTimeout(Duration::from_millis(250));

        assert_eq!("job submission timed out after 250ms", error.to_string());
    }
}
