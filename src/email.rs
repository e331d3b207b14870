//! Email jobs and the senders they delegate to.

#[cfg(feature = "smtp")]
mod smtp;

#[cfg(feature = "smtp")]
pub use smtp::SmtpSender;

use crate::runnable::Runnable;
use crate::JobError;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_EMAIL_RETRIES: u32 = 3;
pub const WELCOME_SUBJECT: &str = "Welcome to Wisdom House Church!";

#[derive(Debug, Error, Eq, PartialEq)]
pub enum EmailError {
    #[error("rate limit exceeded for {0}")]
    RateLimited(String),
    #[error("invalid email address: {0}")]
    Address(String),
    #[error("failed to build message: {0}")]
    Message(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("send failed: {0}")]
    Send(String),
}

impl From<EmailError> for JobError {
    fn from(error: EmailError) -> Self {
        JobError::new(error.to_string())
    }
}

/// Delivers one HTML email. Transport concerns such as TLS and
/// authentication stay behind this trait.
pub trait EmailSender: Send + Sync {
    fn send_html(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError>;
}

impl<S: EmailSender + ?Sized> EmailSender for Arc<S> {
    fn send_html(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        (**self).send_html(to, subject, body)
    }
}

/// Sends one email, retried up to `retries` times by the worker.
pub struct EmailTask {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub retries: u32,
    name: String,
    sender: Arc<dyn EmailSender>,
}

impl EmailTask {
    pub fn new(
        sender: Arc<dyn EmailSender>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let to = to.into();
        let name = format!("email_task_{}_{}", to, Utc::now().timestamp());

        Self {
            to,
            subject: subject.into(),
            body: body.into(),
            retries: DEFAULT_EMAIL_RETRIES,
            name,
            sender,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// The greeting sent to new members.
    pub fn welcome(sender: Arc<dyn EmailSender>, to: impl Into<String>, name: &str) -> Self {
        let body = format!(
            r#"
    <!DOCTYPE html>
    <html>
    <body style="font-family: Arial, sans-serif; line-height: 1.6;">
        <h2>Welcome to Wisdom House Church, {}!</h2>
        <p>We're excited to have you join our spiritual community.</p>
        <p>Stay connected for updates on sermons, events, and community activities.</p>
        <br>
        <p>Blessings,<br>The Wisdom House Team</p>
    </body>
    </html>"#,
            escape_html(name)
        );

        Self::new(sender, to, WELCOME_SUBJECT, body)
    }
}

impl Runnable for EmailTask {
    fn run(&self) -> Result<(), JobError> {
        self.sender
            .send_html(&self.to, &self.subject, &self.body)
            .map_err(JobError::from)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn max_retries(&self) -> u32 {
        self.retries
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());

    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }

    out
}

pub const DEFAULT_RATE_LIMIT: u32 = 10;
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Allows at most `limit` sends per recipient within each fixed window.
pub struct RateLimitedSender<S> {
    inner: S,
    limit: u32,
    window: Duration,
    counters: Mutex<HashMap<String, (Instant, u32)>>,
}

impl<S: EmailSender> RateLimitedSender<S> {
    pub fn new(inner: S) -> Self {
        Self::with_limit(inner, DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW)
    }

    pub fn with_limit(inner: S, limit: u32, window: Duration) -> Self {
        Self {
            inner,
            limit,
            window,
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn acquire(&self, to: &str) -> Result<(), EmailError> {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        // expired windows start over, so their entries can go
        counters.retain(|_, (window_start, _)| now.duration_since(*window_start) < self.window);

        let (_, count) = counters.entry(to.to_string()).or_insert((now, 0));
        *count += 1;

        if *count > self.limit {
            Err(EmailError::RateLimited(to.to_string()))
        } else {
            Ok(())
        }
    }
}

impl<S: EmailSender> EmailSender for RateLimitedSender<S> {
    fn send_html(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        self.acquire(to)?;

        self.inner.send_html(to, subject, body)
    }
}

#[cfg(test)]
mod email_tests {
    use super::EmailError;
    use super::EmailSender;
    use super::EmailTask;
    use super::RateLimitedSender;
    use super::WELCOME_SUBJECT;
    use crate::sink::sink_tests::RecordingSink;
    use crate::sink::{EventSink, WorkerEvent};
    use crate::JobError;
    use crate::PoolConfig;
    use crate::Runnable;
    use crate::WorkerPool;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    /// Records every message and fails the first `failures` sends.
    #[derive(Default)]
    struct OutboxSender {
        failures: u32,
        attempts: AtomicU32,
        sent: Mutex<Vec<(String, String, String)>>,
    }

    impl EmailSender for OutboxSender {
        fn send_html(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

            if attempt <= self.failures {
                return Err(EmailError::Send("421 service not available".to_string()));
            }

            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));

            Ok(())
        }
    }

    #[test]
    fn email_task_delegates_to_sender() {
        let outbox = Arc::new(OutboxSender::default());
        let task = EmailTask::new(outbox.clone(), "ana@example.com", "Hi", "<p>Hello</p>");

        assert_eq!(Ok(()), task.run());
        assert_eq!(3, task.max_retries());
        assert!(task.name().starts_with("email_task_ana@example.com_"));
        assert_eq!(
            vec![(
                "ana@example.com".to_string(),
                "Hi".to_string(),
                "<p>Hello</p>".to_string()
            )],
            *outbox.sent.lock().unwrap()
        );
    }

    #[test]
    fn email_task_name_is_stable() {
        let task = EmailTask::new(Arc::new(OutboxSender::default()), "ana@example.com", "a", "b");

        let first = task.name();
        thread::sleep(Duration::from_millis(5));

        assert_eq!(first, task.name());
    }

    #[test]
    fn send_errors_become_job_errors() {
        let outbox = Arc::new(OutboxSender {
            failures: 1,
            ..Default::default()
        });
        let task = EmailTask::new(outbox, "ana@example.com", "Hi", "body").with_retries(0);

        assert_eq!(
            Err(JobError::new("send failed: 421 service not available")),
            task.run()
        );
        assert_eq!(0, task.max_retries());
    }

    #[test]
    fn welcome_email_greets_by_name() {
        let outbox = Arc::new(OutboxSender::default());
        let task = EmailTask::welcome(outbox, "ben@example.com", "Ben <3");

        assert_eq!(WELCOME_SUBJECT, task.subject);
        assert_eq!("ben@example.com", task.to);
        assert!(task
            .body
            .contains("Welcome to Wisdom House Church, Ben &lt;3!"));
    }

    #[test]
    fn rate_limit_applies_per_recipient() {
        let outbox = Arc::new(OutboxSender::default());
        let limited = RateLimitedSender::new(outbox.clone());

        for _ in 0..10 {
            limited.send_html("ana@example.com", "s", "b").unwrap();
        }

        assert_eq!(
            Err(EmailError::RateLimited("ana@example.com".to_string())),
            limited.send_html("ana@example.com", "s", "b")
        );
        assert!(limited.send_html("ben@example.com", "s", "b").is_ok());
        assert_eq!(11, outbox.sent.lock().unwrap().len());
    }

    #[test]
    fn rate_limit_window_resets() {
        let limited = RateLimitedSender::with_limit(
            Arc::new(OutboxSender::default()),
            1,
            Duration::from_millis(20),
        );

        limited.send_html("ana@example.com", "s", "b").unwrap();
        assert!(limited.send_html("ana@example.com", "s", "b").is_err());

        thread::sleep(Duration::from_millis(30));

        assert!(limited.send_html("ana@example.com", "s", "b").is_ok());
    }

    #[test]
    fn expired_recipients_are_forgotten() {
        let limited = RateLimitedSender::with_limit(
            Arc::new(OutboxSender::default()),
            1,
            Duration::from_millis(200),
        );

        for idx in 0..100 {
            limited
                .send_html(&format!("member_{idx}@example.com"), "s", "b")
                .unwrap();
        }
        assert_eq!(100, limited.counters.lock().unwrap().len());

        thread::sleep(Duration::from_millis(250));
        limited.send_html("ana@example.com", "s", "b").unwrap();

        let counters = limited.counters.lock().unwrap();
        assert_eq!(1, counters.len());
        assert!(counters.contains_key("ana@example.com"));
    }

    #[test]
    fn flaky_email_is_retried_by_the_pool() {
        let sink = Arc::new(RecordingSink::default());
        let pool = WorkerPool::new(
            PoolConfig::builder()
                .number_of_workers(2)
                .backoff_unit(Duration::from_millis(1))
                .sink(sink.clone() as Arc<dyn EventSink>)
                .build(),
        )
        .unwrap();
        pool.start().unwrap();

        let outbox = Arc::new(OutboxSender {
            failures: 2,
            ..Default::default()
        });

        pool.submit(EmailTask::welcome(outbox.clone(), "cy@example.com", "Cy"))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.count(|e| matches!(e, WorkerEvent::Completed { .. })) == 0
            && Instant::now() < deadline
        {
            thread::sleep(Duration::from_millis(1));
        }
        pool.shutdown().unwrap();

        assert_eq!(3, outbox.attempts.load(Ordering::SeqCst));
        assert_eq!(1, outbox.sent.lock().unwrap().len());
        assert_eq!(
            2,
            sink.count(|e| matches!(e, WorkerEvent::RetryScheduled { .. }))
        );
    }
}
