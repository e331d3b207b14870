//! A fixed-size pool of worker threads for background jobs.
//!
//! Jobs implement [`Runnable`] (or are built from a closure with [`Job`]),
//! are submitted to a [`WorkerPool`] and run on one of its workers. Failed
//! attempts are retried with a linear backoff. Every state change of a worker
//! is reported to the [`EventSink`] the pool was configured with.
//!
//! ```no_run
//! use jobpool::{Job, PoolConfig, WorkerPool};
//!
//! let pool = WorkerPool::new(PoolConfig::builder().number_of_workers(2).build())?;
//! pool.start()?;
//!
//! pool.submit(Job::new("hello", 2, || {
//!     println!("hello from a worker");
//!     Ok(())
//! }))?;
//!
//! pool.shutdown()?;
//! # Ok::<(), jobpool::PoolError>(())
//! ```

pub mod config;
pub mod email;
mod error;
pub mod queue;
pub mod runnable;
pub mod sink;
pub mod worker;
pub mod worker_pool;

pub use error::{JobError, PoolError};
pub use queue::CancellationToken;
pub use runnable::{Job, Runnable};
pub use sink::{EventSink, LogSink, WorkerEvent};
pub use worker::Worker;
pub use worker_pool::{PoolConfig, PoolState, WorkerPool};
