use super::{EmailError, EmailSender};
use crate::config::SmtpConfig;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::debug;

const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends HTML email over SMTP.
///
/// Port 465 uses implicit TLS, every other port upgrades with STARTTLS.
/// Credentials are only sent when both user and password are configured.
pub struct SmtpSender {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpSender {
    pub fn new(config: &SmtpConfig) -> Result<Self, EmailError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|error: lettre::address::AddressError| {
                EmailError::Address(format!("{}: {}", config.from, error))
            })?;

        let builder = if config.port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(&config.host)
        } else {
            SmtpTransport::starttls_relay(&config.host)
        }
        .map_err(|error| EmailError::Connection(error.to_string()))?
        .port(config.port);

        let builder = match (&config.user, &config.pass) {
            (Some(user), Some(pass)) => {
                builder.credentials(Credentials::new(user.clone(), pass.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

impl EmailSender for SmtpSender {
    fn send_html(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        let recipient: Mailbox = to
            .parse()
            .map_err(|error: lettre::address::AddressError| {
                EmailError::Address(format!("{to}: {error}"))
            })?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|error| EmailError::Message(error.to_string()))?;

        let response = self
            .transport
            .send(&message)
            .map_err(|error| EmailError::Send(error.to_string()))?;

        debug!("smtp accepted message to {}: {:?}", to, response.code());

        Ok(())
    }
}
