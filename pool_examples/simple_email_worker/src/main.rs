use dotenvy::dotenv;
use jobpool::config::PoolSettings;
use jobpool::email::{EmailSender, EmailTask, RateLimitedSender};
use jobpool::{CancellationToken, Job, JobError, PoolError, WorkerPool};
#[cfg(not(feature = "smtp"))]
use simple_email_worker::ConsoleSender;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "smtp")]
fn sender() -> Arc<dyn EmailSender> {
    let config = jobpool::config::SmtpConfig::from_env().expect("SMTP settings must be set");
    let smtp = jobpool::email::SmtpSender::new(&config).expect("SMTP transport must build");

    Arc::new(RateLimitedSender::new(smtp))
}

#[cfg(not(feature = "smtp"))]
fn sender() -> Arc<dyn EmailSender> {
    Arc::new(RateLimitedSender::new(ConsoleSender::new(3)))
}

fn main() -> Result<(), PoolError> {
    dotenv().ok();

    env_logger::init();

    let settings = PoolSettings::from_env().expect("invalid worker pool settings");
    let pool = WorkerPool::new(settings.pool_config())?;
    let sender = sender();

    pool.start()?;

    for (to, name) in [
        ("ana@example.com", "Ana"),
        ("ben@example.com", "Ben"),
        ("cy@example.com", "Cy"),
    ] {
        pool.submit(EmailTask::welcome(sender.clone(), to, name))?;
    }

    pool.submit(Job::new("always_fails", 1, || {
        Err(JobError::new("this job never succeeds"))
    }))?;

    let token = CancellationToken::new();

    if let Err(error) = pool.submit_with_timeout(
        EmailTask::new(sender, "dee@example.com", "Reminder", "<p>See you Sunday</p>"),
        Duration::from_millis(500),
        &token,
    ) {
        log::warn!("reminder was not queued: {}", error);
    }

    std::thread::sleep(Duration::from_secs(5));

    pool.shutdown()
}
