use crate::queue::JobReceiver;
use crate::runnable::Runnable;
use crate::sink::{EventSink, LogSink, WorkerEvent};
use crate::JobError;
use crossbeam_channel::{select, Receiver};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use typed_builder::TypedBuilder;

/// The duration of one backoff unit unless the pool is told otherwise.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

pub(crate) fn default_sink() -> Arc<dyn EventSink> {
    Arc::new(LogSink::default())
}

/// Pulls jobs from the shared queue and runs them, retrying failed attempts.
///
/// A worker waits on the queue and on its private stop channel at the same
/// time. It only looks at the stop channel between jobs, so a job that has
/// started (including its backoff sleeps) always runs to its final outcome.
#[derive(TypedBuilder)]
pub struct Worker {
    pub id: usize,
    pub queue: JobReceiver,
    pub stop: Receiver<()>,
    #[builder(default = DEFAULT_BACKOFF_UNIT)]
    pub backoff_unit: Duration,
    #[builder(default = default_sink())]
    pub sink: Arc<dyn EventSink>,
}

impl Worker {
    /// Runs jobs until the stop channel fires or the queue is closed and
    /// drained.
    pub fn run_jobs(&self) {
        self.sink
            .record(&WorkerEvent::WorkerStarted { worker_id: self.id });

        loop {
            select! {
                recv(self.queue) -> job => match job {
                    Ok(job) => self.run(job.as_ref()),
                    Err(_) => break,
                },
                recv(self.stop) -> _ => break,
            }
        }

        self.sink
            .record(&WorkerEvent::WorkerStopped { worker_id: self.id });
    }

    /// Runs one job through its whole retry budget. The final outcome is
    /// a `Completed` or `Failed` event.
    fn run(&self, runnable: &dyn Runnable) {
        let started = Instant::now();
        let job_name = runnable.name();
        let max_retries = runnable.max_retries();

        self.sink.record(&WorkerEvent::JobStarted {
            worker_id: self.id,
            job_name: job_name.clone(),
        });

        let mut attempt = 0;

        loop {
            match Self::execute(runnable) {
                Ok(()) => {
                    self.sink.record(&WorkerEvent::Completed {
                        worker_id: self.id,
                        job_name,
                        attempt,
                        elapsed: started.elapsed(),
                    });

                    return;
                }
                Err(error) if attempt < max_retries => {
                    let backoff = self
                        .backoff_unit
                        .saturating_mul(runnable.backoff(attempt + 1));

                    self.sink.record(&WorkerEvent::RetryScheduled {
                        worker_id: self.id,
                        job_name: job_name.clone(),
                        attempt,
                        max_retries,
                        backoff,
                        elapsed: started.elapsed(),
                        error,
                    });

                    thread::sleep(backoff);
                    attempt += 1;
                }
                Err(error) => {
                    self.sink.record(&WorkerEvent::Failed {
                        worker_id: self.id,
                        job_name,
                        attempt,
                        elapsed: started.elapsed(),
                        error,
                    });

                    return;
                }
            }
        }
    }

    fn execute(runnable: &dyn Runnable) -> Result<(), JobError> {
        match panic::catch_unwind(AssertUnwindSafe(|| runnable.run())) {
            Ok(result) => result,
            Err(payload) => Err(JobError::new(format!(
                "job panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
