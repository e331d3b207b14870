use jobpool::email::{EmailError, EmailSender};
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

/// Pretends to deliver mail and fails every `fail_every`-th send.
pub struct ConsoleSender {
    pub fail_every: u32,
    sends: AtomicU32,
}

impl ConsoleSender {
    pub fn new(fail_every: u32) -> Self {
        Self {
            fail_every,
            sends: AtomicU32::new(0),
        }
    }
}

impl EmailSender for ConsoleSender {
    fn send_html(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        let send = self.sends.fetch_add(1, Ordering::SeqCst) + 1;

        thread::sleep(Duration::from_millis(200));

        if self.fail_every > 0 && send % self.fail_every == 0 {
            return Err(EmailError::Send(format!("simulated failure for {to}")));
        }

        log::info!(
            "delivered '{}' to {} ({} bytes), thread name {}",
            subject,
            to,
            body.len(),
            thread::current().name().unwrap_or("unnamed")
        );

        Ok(())
    }
}
