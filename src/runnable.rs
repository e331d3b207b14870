use crate::JobError;
use std::fmt;

pub const DEFAULT_JOB_NAME: &str = "job";

/// Implement this trait to run your custom jobs.
///
/// A runnable describes a single attempt. Retry bookkeeping lives in the
/// worker, so `run` may be called several times for the same job and should
/// be idempotent if `max_retries` is greater than zero.
pub trait Runnable: Send + Sync {
    /// Execute the job. This method should define its logic
    fn run(&self) -> Result<(), JobError>;

    /// The name used for the job in log lines and events
    fn name(&self) -> String {
        DEFAULT_JOB_NAME.to_string()
    }

    /// Define the maximum number of retries after the first failed attempt.
    /// By default jobs are not retried.
    fn max_retries(&self) -> u32 {
        0
    }

    /// Define the backoff before retry number `attempt` (starting at 1),
    /// in units of the pool's backoff unit.
    /// By default, it is linear: 1, 2, 3, ...
    fn backoff(&self, attempt: u32) -> u32 {
        attempt
    }
}

/// Lets jobs that are already boxed be submitted as they are.
impl<R: Runnable + ?Sized> Runnable for Box<R> {
    fn run(&self) -> Result<(), JobError> {
        (**self).run()
    }

    fn name(&self) -> String {
        (**self).name()
    }

    fn max_retries(&self) -> u32 {
        (**self).max_retries()
    }

    fn backoff(&self, attempt: u32) -> u32 {
        (**self).backoff(attempt)
    }
}

type Action = Box<dyn Fn() -> Result<(), JobError> + Send + Sync>;

/// A generic job: a closure plus the metadata the worker needs.
pub struct Job {
    name: String,
    max_retries: u32,
    action: Action,
}

impl Job {
    pub fn new<F>(name: impl Into<String>, max_retries: u32, action: F) -> Self
    where
        F: Fn() -> Result<(), JobError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            max_retries,
            action: Box::new(action),
        }
    }
}

impl Runnable for Job {
    fn run(&self) -> Result<(), JobError> {
        (self.action)()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod runnable_tests {
    use super::Job;
    use super::Runnable;
    use crate::JobError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct PlainTask;

    impl Runnable for PlainTask {
        fn run(&self) -> Result<(), JobError> {
            Ok(())
        }
    }

    #[test]
    fn default_backoff_is_linear() {
        let task = PlainTask;

        let schedule: Vec<u32> = (1..=4).map(|attempt| task.backoff(attempt)).collect();

        assert_eq!(vec![1, 2, 3, 4], schedule);
        assert_eq!(0, task.max_retries());
        assert_eq!("job", task.name());
    }

    #[test]
    fn job_runs_its_action_on_every_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let job = Job::new("count", 2, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(JobError::new("nope"))
        });

        assert_eq!(Err(JobError::new("nope")), job.run());
        assert_eq!(Err(JobError::new("nope")), job.run());
        assert_eq!(2, calls.load(Ordering::SeqCst));
        assert_eq!("count", job.name());
        assert_eq!(2, job.max_retries());
    }

    struct SlowBackoff;

    impl Runnable for SlowBackoff {
        fn run(&self) -> Result<(), JobError> {
            Err(JobError::new("always"))
        }

        fn name(&self) -> String {
            "slow_backoff".to_string()
        }

        fn max_retries(&self) -> u32 {
            4
        }

        fn backoff(&self, attempt: u32) -> u32 {
            attempt * 10
        }
    }

    #[test]
    fn boxed_runnable_delegates_to_its_job() {
        let boxed: Box<dyn Runnable> = Box::new(SlowBackoff);

        assert_eq!(Err(JobError::new("always")), Runnable::run(&boxed));
        assert_eq!("slow_backoff", Runnable::name(&boxed));
        assert_eq!(4, Runnable::max_retries(&boxed));
        assert_eq!(30, Runnable::backoff(&boxed, 3));
    }
}
